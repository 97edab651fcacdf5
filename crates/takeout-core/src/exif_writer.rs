//! Stage 5: write recovered timestamps and GPS positions back into media
//! files.
//!
//! JPEGs are patched in place at the segment level: the image stream is
//! never decoded, so file size and pixel bytes stay stable. Other writable
//! formats go through the `MetadataWriter` capability (an external
//! exiftool when one is on PATH); without one the write is skipped.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use std::process::Command;

use chrono::NaiveDateTime;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};

use crate::config::Config;
use crate::media::MediaEntity;

/// Formats the original toolchain could write EXIF into.
const WRITABLE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tga", "pvr", "ico",
];

const MAX_WRITE_SIZE: u64 = 64 * 1024 * 1024;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capability seam for an external metadata writer binary.
pub trait MetadataWriter: Send + Sync {
    /// Write the datetime tags if currently absent. Returns whether a
    /// write happened.
    fn write_datetime(&self, path: &Path, date: &NaiveDateTime) -> io::Result<bool>;
    /// Write the GPS tags if currently absent. Returns whether a write
    /// happened.
    fn write_gps(&self, path: &Path, latitude: f64, longitude: f64) -> io::Result<bool>;
}

/// `exiftool`-backed implementation of [`MetadataWriter`].
pub struct ExiftoolWriter;

impl ExiftoolWriter {
    /// Probe for exiftool on PATH.
    pub fn detect() -> Option<ExiftoolWriter> {
        let ok = Command::new("exiftool")
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        ok.then_some(ExiftoolWriter)
    }
}

impl MetadataWriter for ExiftoolWriter {
    fn write_datetime(&self, path: &Path, date: &NaiveDateTime) -> io::Result<bool> {
        let stamp = date.format(EXIF_DATETIME_FORMAT).to_string();
        let output = Command::new("exiftool")
            .arg("-overwrite_original")
            .arg("-if")
            .arg("not $DateTimeOriginal")
            .arg(format!("-DateTimeOriginal={stamp}"))
            .arg(format!("-CreateDate={stamp}"))
            .arg(format!("-ModifyDate={stamp}"))
            .arg(path)
            .output()?;
        // A failed -if condition exits nonzero; that is "already present",
        // not an error.
        Ok(output.status.success())
    }

    fn write_gps(&self, path: &Path, latitude: f64, longitude: f64) -> io::Result<bool> {
        let output = Command::new("exiftool")
            .arg("-overwrite_original")
            .arg("-if")
            .arg("not $GPSLatitude")
            .arg(format!("-GPSLatitude={}", latitude.abs()))
            .arg(format!(
                "-GPSLatitudeRef={}",
                if latitude < 0.0 { "S" } else { "N" }
            ))
            .arg(format!("-GPSLongitude={}", longitude.abs()))
            .arg(format!(
                "-GPSLongitudeRef={}",
                if longitude < 0.0 { "W" } else { "E" }
            ))
            .arg(path)
            .output()?;
        Ok(output.status.success())
    }
}

#[derive(Debug, Default)]
pub struct ExifWriteStats {
    pub datetimes_written: u64,
    pub coordinates_written: u64,
}

/// Write date and GPS metadata for every entity that has them. Per-file
/// failures are logged and contained.
pub fn write_metadata(
    media: &[MediaEntity],
    config: &Config,
    external: Option<&dyn MetadataWriter>,
) -> ExifWriteStats {
    let mut stats = ExifWriteStats::default();

    for entity in media {
        if entity.date_taken.is_none() && entity.coordinates.is_none() {
            continue;
        }
        let path = entity.canonical_path();
        let Some(ext) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
        else {
            continue;
        };
        if !WRITABLE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if config.limit_file_size && entity.size > MAX_WRITE_SIZE {
            log::debug!("skipping EXIF write for oversized {}", path.display());
            continue;
        }

        let (dt_written, gps_written) = if ext == "jpg" || ext == "jpeg" {
            match patch_jpeg(path, entity) {
                Ok(written) => written,
                Err(err) => {
                    log::error!("EXIF write failed for {}: {err}", path.display());
                    (false, false)
                }
            }
        } else if let Some(writer) = external {
            write_via_external(writer, path, entity)
        } else {
            log::debug!(
                "no metadata writer available for {}, skipping",
                path.display()
            );
            (false, false)
        };

        if dt_written {
            stats.datetimes_written += 1;
        }
        if gps_written {
            stats.coordinates_written += 1;
        }
    }

    log::info!(
        "wrote {} datetime(s), {} coordinate pair(s)",
        stats.datetimes_written,
        stats.coordinates_written
    );
    stats
}

fn write_via_external(
    writer: &dyn MetadataWriter,
    path: &Path,
    entity: &MediaEntity,
) -> (bool, bool) {
    let mut dt_written = false;
    let mut gps_written = false;
    if let Some(date) = &entity.date_taken {
        match writer.write_datetime(path, date) {
            Ok(wrote) => dt_written = wrote,
            Err(err) => log::error!("datetime write failed for {}: {err}", path.display()),
        }
    }
    if let Some((lat, lon)) = entity.coordinates {
        match writer.write_gps(path, lat, lon) {
            Ok(wrote) => gps_written = wrote,
            Err(err) => log::error!("GPS write failed for {}: {err}", path.display()),
        }
    }
    (dt_written, gps_written)
}

/// Patch a JPEG's APP1 segment in place. Existing fields are carried over;
/// only absent tags are added. Returns (datetime_written, gps_written).
fn patch_jpeg(path: &Path, entity: &MediaEntity) -> anyhow::Result<(bool, bool)> {
    let original = fs::read(path)?;

    // Existing fields survive the rewrite; a file with no EXIF at all
    // starts from an empty set.
    let mut fields: Vec<Field> = Vec::new();
    if let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(&original)) {
        for f in exif.fields() {
            if f.ifd_num == In::PRIMARY {
                fields.push(Field {
                    tag: f.tag,
                    ifd_num: f.ifd_num,
                    value: f.value.clone(),
                });
            }
        }
    }

    let has_tag = |tag: Tag, fields: &[Field]| fields.iter().any(|f| f.tag == tag);

    let mut dt_written = false;
    if let Some(date) = &entity.date_taken {
        if !has_tag(Tag::DateTime, &fields)
            && !has_tag(Tag::DateTimeOriginal, &fields)
            && !has_tag(Tag::DateTimeDigitized, &fields)
        {
            let stamp = date.format(EXIF_DATETIME_FORMAT).to_string().into_bytes();
            for tag in [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized] {
                fields.push(Field {
                    tag,
                    ifd_num: In::PRIMARY,
                    value: Value::Ascii(vec![stamp.clone()]),
                });
            }
            dt_written = true;
        }
    }

    let mut gps_written = false;
    if let Some((lat, lon)) = entity.coordinates {
        if !has_tag(Tag::GPSLatitude, &fields) {
            fields.extend(gps_fields(lat, lon));
            gps_written = true;
        }
    }

    if !dt_written && !gps_written {
        return Ok((false, false));
    }

    let mut payload = Cursor::new(Vec::new());
    {
        let mut writer = Writer::new();
        for f in &fields {
            writer.push_field(f);
        }
        writer.write(&mut payload, false)?;
    }

    let patched = splice_app1(&original, &payload.into_inner())
        .ok_or_else(|| anyhow::anyhow!("not a JPEG stream"))?;
    fs::write(path, patched)?;
    Ok((dt_written, gps_written))
}

fn gps_fields(latitude: f64, longitude: f64) -> Vec<Field> {
    let lat_ref = if latitude < 0.0 { b"S" } else { b"N" };
    let lon_ref = if longitude < 0.0 { b"W" } else { b"E" };
    vec![
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![lat_ref.to_vec()]),
        },
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(to_dms(latitude).to_vec()),
        },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![lon_ref.to_vec()]),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(to_dms(longitude).to_vec()),
        },
    ]
}

/// Decimal degrees to the degree/minute/second rationals EXIF expects.
/// Seconds carry two decimal places (denominator 100).
fn to_dms(value: f64) -> [Rational; 3] {
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs * 60.0).trunc() % 60.0;
    let seconds = (abs * 3600.0) % 60.0;
    [
        Rational::from((degrees as u32, 1)),
        Rational::from((minutes as u32, 1)),
        Rational::from(((seconds * 100.0).round() as u32, 100)),
    ]
}

/// Rebuild a JPEG byte stream with `exif_payload` as its APP1 segment.
/// The new segment lands after any APP0, replacing an existing Exif APP1;
/// everything from the scan data on is copied verbatim.
fn splice_app1(original: &[u8], exif_payload: &[u8]) -> Option<Vec<u8>> {
    if original.len() < 4 || original[0] != 0xFF || original[1] != 0xD8 {
        return None;
    }

    let mut app1 = Vec::with_capacity(exif_payload.len() + 10);
    app1.extend_from_slice(&[0xFF, 0xE1]);
    let seg_len = u16::try_from(exif_payload.len() + 8).ok()?;
    app1.extend_from_slice(&seg_len.to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(exif_payload);

    let mut out = Vec::with_capacity(original.len() + app1.len());
    out.extend_from_slice(&original[0..2]);

    let mut pos = 2usize;
    let mut inserted = false;
    while pos + 4 <= original.len() {
        if original[pos] != 0xFF {
            break;
        }
        let marker = original[pos + 1];
        // Start of scan: structure ends, entropy-coded data follows.
        if marker == 0xDA {
            break;
        }
        let len = u16::from_be_bytes([original[pos + 2], original[pos + 3]]) as usize;
        let seg_end = pos + 2 + len;
        if seg_end > original.len() {
            return None;
        }

        let is_exif_app1 =
            marker == 0xE1 && original[pos + 4..].starts_with(b"Exif\0\0");
        if is_exif_app1 {
            if !inserted {
                out.extend_from_slice(&app1);
                inserted = true;
            }
            // Old Exif segment replaced, not copied.
        } else {
            if marker != 0xE0 && !inserted {
                out.extend_from_slice(&app1);
                inserted = true;
            }
            out.extend_from_slice(&original[pos..seg_end]);
        }
        pos = seg_end;
    }

    if !inserted {
        out.extend_from_slice(&app1);
    }
    out.extend_from_slice(&original[pos..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AlbumKey, MediaEntity};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    /// Minimal JPEG: SOI, APP0 JFIF stub, SOS marker, fake scan, EOI.
    fn tiny_jpeg() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(b"JFIF\0");
        bytes.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        bytes.extend_from_slice(&[0x12, 0x34, 0x56]);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    fn entity_for(path: PathBuf) -> MediaEntity {
        let mut e = MediaEntity::new(AlbumKey::Canonical, path, 0);
        e.date_taken = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0);
        e.coordinates = Some((52.52, -13.405));
        e
    }

    #[test]
    fn dms_conversion() {
        let [d, m, s] = to_dms(52.52);
        assert_eq!((d.num, d.denom), (52, 1));
        assert_eq!((m.num, m.denom), (31, 1));
        assert_eq!((s.num, s.denom), (1200, 100));
    }

    #[test]
    fn patch_writes_datetime_and_gps() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, tiny_jpeg()).unwrap();

        let entity = entity_for(path.clone());
        let (dt, gps) = patch_jpeg(&path, &entity).unwrap();
        assert!(dt);
        assert!(gps);

        let bytes = fs::read(&path).unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(&bytes))
            .unwrap();
        let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY).unwrap();
        assert!(field.display_value().to_string().contains("2020"));
        assert!(exif.get_field(Tag::GPSLatitude, In::PRIMARY).is_some());
        let lat_ref = exif.get_field(Tag::GPSLatitudeRef, In::PRIMARY).unwrap();
        assert_eq!(lat_ref.display_value().to_string(), "N");

        // Scan bytes are untouched.
        assert!(bytes.windows(3).any(|w| w == [0x12, 0x34, 0x56]));
    }

    #[test]
    fn second_patch_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, tiny_jpeg()).unwrap();

        let entity = entity_for(path.clone());
        patch_jpeg(&path, &entity).unwrap();
        let after_first = fs::read(&path).unwrap();
        let (dt, gps) = patch_jpeg(&path, &entity).unwrap();
        assert!(!dt);
        assert!(!gps);
        assert_eq!(fs::read(&path).unwrap(), after_first);
    }

    #[test]
    fn non_jpeg_bytes_rejected() {
        assert!(splice_app1(b"not a jpeg", b"").is_none());
    }

    #[test]
    fn stats_skip_unsupported_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.mp4");
        fs::write(&path, b"data").unwrap();
        let entity = entity_for(path);

        let config = Config::new(PathBuf::from("/in"), PathBuf::from("/out"));
        let stats = write_metadata(&[entity], &config, None);
        assert_eq!(stats.datetimes_written, 0);
        assert_eq!(stats.coordinates_written, 0);
    }
}

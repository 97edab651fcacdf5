//! Stage 1: rename files whose extension disagrees with their content.
//!
//! Google's pipeline (and some cameras) emit HEIC bytes under `.jpg` names
//! and similar mismatches, which breaks both EXIF tooling and sidecar
//! pairing downstream. The fix appends the detected extension rather than
//! replacing the old one, so the sidecar matcher can still reverse the
//! rename.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::{Config, ExtensionFixMode};
use crate::discovery::is_media_file;
use crate::extras;
use crate::sidecar;

/// How much of the file header the sniffer reads.
const SNIFF_LEN: usize = 128;

/// Magic patterns checked in order; first hit wins.
struct Magic {
    mime: &'static str,
    offset: usize,
    bytes: &'static [u8],
}

const MAGIC_TABLE: &[Magic] = &[
    Magic { mime: "image/jpeg", offset: 0, bytes: &[0xFF, 0xD8, 0xFF] },
    Magic { mime: "image/png", offset: 0, bytes: &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] },
    Magic { mime: "image/gif", offset: 0, bytes: b"GIF87a" },
    Magic { mime: "image/gif", offset: 0, bytes: b"GIF89a" },
    Magic { mime: "image/tiff", offset: 0, bytes: &[0x49, 0x49, 0x2A, 0x00] },
    Magic { mime: "image/tiff", offset: 0, bytes: &[0x4D, 0x4D, 0x00, 0x2A] },
    Magic { mime: "image/bmp", offset: 0, bytes: b"BM" },
];

/// ISO-BMFF brands (bytes 8..12 after an `ftyp` box) to MIME.
const FTYP_BRANDS: &[(&str, &str)] = &[
    ("heic", "image/heic"),
    ("heix", "image/heic"),
    ("hevc", "image/heic"),
    ("heim", "image/heic"),
    ("mif1", "image/heif"),
    ("msf1", "image/heif"),
    ("avif", "image/avif"),
    ("qt  ", "video/quicktime"),
    ("isom", "video/mp4"),
    ("iso2", "video/mp4"),
    ("mp41", "video/mp4"),
    ("mp42", "video/mp4"),
    ("M4V ", "video/mp4"),
    ("M4A ", "video/mp4"),
];

/// Preferred extension for a detected MIME type.
const PREFERRED_EXT: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("image/avif", "avif"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
];

static SIDECAR_TAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<supp>\.supplemental-metadata)?(?:\((?P<num>\d+)\))?\.json$").unwrap()
});

/// Sniff a MIME type from header bytes. Returns `None` when no pattern
/// matches; the caller must treat that as "don't touch".
pub fn sniff_mime(header: &[u8]) -> Option<&'static str> {
    for magic in MAGIC_TABLE {
        let end = magic.offset + magic.bytes.len();
        if header.len() >= end && &header[magic.offset..end] == magic.bytes {
            return Some(magic.mime);
        }
    }

    // RIFF container: WEBP is the only one we care about.
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    // ISO-BMFF: size(4) + "ftyp" + major brand.
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        let brand = &header[8..12];
        for (name, mime) in FTYP_BRANDS {
            if brand == name.as_bytes() {
                return Some(mime);
            }
        }
        // Unknown brand inside an ftyp container is still some MP4 flavor.
        return Some("video/mp4");
    }

    None
}

pub fn preferred_extension(mime: &str) -> Option<&'static str> {
    PREFERRED_EXT
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

pub struct FixResult {
    pub renamed: u64,
}

/// Walk `dir` and fix every mismatched media extension. `skip_jpeg` is the
/// conservative mode: files whose content sniffs as JPEG are left alone
/// (JPEG-in-wrong-wrapper is the case most prone to false positives).
pub fn fix_extensions(dir: &Path, config: &Config, skip_jpeg: bool) -> FixResult {
    let mut renamed = 0u64;

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_media_file(p))
        .collect();

    for path in files {
        if config.transform_pixel_mp {
            if let Some(new_path) = transform_pixel_motion(&path) {
                renamed += 1;
                log::debug!(
                    "renamed Pixel motion photo {} -> {}",
                    path.display(),
                    new_path.display()
                );
                continue;
            }
        }
        if config.extension_fix == ExtensionFixMode::None {
            continue;
        }
        if extras::is_extra_path(&path) {
            continue;
        }

        let Some(detected) = sniff_path(&path) else {
            continue;
        };
        // Camera RAWs are TIFF containers; renaming them would be wrong
        // more often than right.
        if detected == "image/tiff" {
            continue;
        }
        if skip_jpeg && detected == "image/jpeg" {
            continue;
        }

        let declared = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string());
        if declared.as_deref() == Some(detected) {
            continue;
        }

        let Some(ext) = preferred_extension(detected) else {
            continue;
        };

        match rename_with_sidecar(&path, ext) {
            Ok(true) => renamed += 1,
            Ok(false) => {}
            Err(err) => {
                log::error!("extension fix failed for {}: {err}", path.display());
            }
        }
    }

    if renamed > 0 {
        log::info!("fixed {renamed} file extension(s)");
    }
    FixResult { renamed }
}

fn sniff_path(path: &Path) -> Option<&'static str> {
    let mut header = [0u8; SNIFF_LEN];
    let mut file = fs::File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    sniff_mime(&header[..n])
}

/// Rename `file.ext` to `file.ext.<new_ext>`, bring the sidecar along, and
/// verify the rename took.
fn rename_with_sidecar(path: &Path, new_ext: &str) -> std::io::Result<bool> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(false);
    };
    let new_path = path.with_file_name(format!("{name}.{new_ext}"));
    if new_path.exists() {
        log::warn!(
            "extension fix target already exists, skipping: {}",
            new_path.display()
        );
        return Ok(false);
    }

    fs::rename(path, &new_path)?;
    if !new_path.exists() {
        return Err(std::io::Error::other("renamed file missing"));
    }
    if path.exists() {
        // Case-folding filesystems can leave the old name behind.
        fs::remove_file(path)?;
    }
    log::debug!("renamed {} -> {}", path.display(), new_path.display());

    // The cascade reverses the rename we just made (drop-extension for the
    // plain case, extension-fix reverse for the jpg pairs), so looking up
    // against the new name finds the sidecar still carrying the old one.
    if let Some(old_sidecar) = sidecar::find_sidecar(&new_path, false) {
        if let Err(err) = rename_sidecar(&old_sidecar, &new_path) {
            log::error!(
                "sidecar rename failed for {}: {err}",
                old_sidecar.display()
            );
        }
    }

    Ok(true)
}

/// Rebuild the sidecar name against the renamed media file, preserving the
/// `.supplemental-metadata` marker and any `(N)` numbering.
fn rename_sidecar(old_sidecar: &Path, new_media: &Path) -> std::io::Result<()> {
    let Some(sidecar_name) = old_sidecar.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    let Some(media_name) = new_media.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };

    let caps = SIDECAR_TAIL_RE.captures(sidecar_name);
    let mut new_name = media_name.to_string();
    if let Some(caps) = &caps {
        if caps.name("supp").is_some() {
            new_name.push_str(".supplemental-metadata");
        }
        if let Some(num) = caps.name("num") {
            new_name.push_str(&format!("({})", num.as_str()));
        }
    }
    new_name.push_str(".json");

    let new_sidecar = old_sidecar.with_file_name(new_name);
    if new_sidecar != old_sidecar {
        fs::rename(old_sidecar, &new_sidecar)?;
    }
    Ok(())
}

/// Pixel motion photos export as `.MP`/`.MV` but are plain MP4 streams.
fn transform_pixel_motion(path: &Path) -> Option<PathBuf> {
    let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
    if ext != "mp" && ext != "mv" {
        return None;
    }
    let name = path.file_name().and_then(|n| n.to_str())?;
    let new_path = path.with_file_name(format!("{name}.mp4"));
    if new_path.exists() {
        return None;
    }
    let sidecar_path = sidecar::find_sidecar(path, false);
    fs::rename(path, &new_path).ok()?;
    if let Some(old_sidecar) = sidecar_path {
        if let Err(err) = rename_sidecar(&old_sidecar, &new_path) {
            log::error!("sidecar rename failed for {}: {err}", old_sidecar.display());
        }
    }
    Some(new_path)
}

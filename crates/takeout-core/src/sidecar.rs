//! Sidecar lookup: pair a media file with its Google Photos JSON sidecar.
//!
//! Google's export mangles sidecar names in several independent ways
//! (51-character truncation, `(N)` repositioning, extension fixing by
//! earlier runs, localized "-edited" suffixes). The matcher applies a
//! cascade of filename transforms in strict decreasing-reliability order
//! and probes the filesystem after each one; the first hit wins, so an
//! aggressive transform can never override a hit from a reliable one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;

use crate::extras;

static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d+\)\.").unwrap());
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d\)\.").unwrap());
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)\((\d+)\)$").unwrap());
static EXT_FIX_FWD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<stem>.+?)(?:\((?P<num>\d+)\))?\.(?P<light>jpe?g|png)\.(?P<heavy>heic|heif|tiff?|webp|avif|cr2|dng|arw|nef|raf|crw|cr3|nrw)$",
    )
    .unwrap()
});
static EXT_FIX_REV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<stem>.+?)(?:\((?P<num>\d+)\))?\.(?P<heavy>heic|heif|tiff?|webp|avif|cr2|dng|arw|nef|raf|crw|cr3|nrw)\.(?P<light>jpe?g|png)$",
    )
    .unwrap()
});

/// Longest sidecar filename Google will emit before the filesystem
/// truncates it; `.json` included.
const MAX_SIDECAR_NAME: usize = 51;

/// Find the JSON sidecar for `media_path`. Pure lookup; never mutates the
/// filesystem. `try_hard` enables the aggressive tail of the cascade.
pub fn find_sidecar(media_path: &Path, try_hard: bool) -> Option<PathBuf> {
    let dir = media_path.parent()?;
    let name = media_path.file_name()?.to_str()?;

    for candidate in transform_cascade(name, try_hard) {
        if let Some(hit) = probe(dir, &candidate) {
            log::debug!(
                "sidecar for {}: {}",
                media_path.display(),
                hit.display()
            );
            return Some(hit);
        }
    }
    None
}

/// All candidate basenames in strict cascade order. Duplicates are kept
/// cheap to skip by the probe; order is the safety contract.
fn transform_cascade(name: &str, try_hard: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: String| {
        if !out.contains(&s) {
            out.push(s);
        }
    };

    // 1. identity
    push(name.to_string());
    // 2. shortening (filesystem 51-char sidecar name limit)
    push(shorten_name(name));
    // 3. bracket swap: image(11).jpg -> image.jpg(11)
    push(bracket_swap(name));
    // 4. extension-fixing reverse: IMG(1).jpg.heic -> IMG.HEIC(1)
    if let Some(unfixed) = reverse_extension_fix(name) {
        push(unfixed);
    }
    // 5. drop extension
    push(no_extension(name));
    // 6. complete extra suffix removal
    push(extras::remove_extra(name));

    if try_hard {
        // 7. partial extra suffix
        if let Some(partial) = extras::remove_partial_extra(name) {
            push(partial.clone());
            // 8. partial + truncated extension restore
            for restored in extras::restore_truncated_extension(&partial) {
                push(restored);
            }
        }
        // 9. edge-case extra patterns
        if let Some(edge) = extras::remove_extra_regex(name) {
            push(edge);
        }
        // 10. digit removal: image(2).png -> image.png
        push(remove_digit(name));
    }

    out
}

/// Probe the five sidecar patterns for a transformed basename.
fn probe(dir: &Path, basename: &str) -> Option<PathBuf> {
    let direct = [
        format!("{basename}.supplemental-metadata.json"),
        format!("{basename}.json"),
    ];
    for candidate in &direct {
        let path = dir.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }

    // Numbered media: base(n).ext probes base.ext.supplemental-metadata(n).json
    if let Some(caps) = NUMBERED_RE.captures(basename) {
        let base = &caps[1];
        let n = &caps[2];
        for candidate in [
            format!("{base}.supplemental-metadata({n}).json"),
            format!("{base}({n}).json"),
        ] {
            let path = dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    // Case-insensitive directory scan, last resort for this transform.
    let targets: Vec<String> = direct.iter().map(|c| c.to_lowercase()).collect();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let entry_name = entry.file_name();
            let Some(entry_str) = entry_name.to_str() else {
                continue;
            };
            let lower = entry_str.to_lowercase();
            if targets.iter().any(|t| *t == lower) && entry.path().is_file() {
                return Some(entry.path());
            }
        }
    }

    None
}

fn shorten_name(name: &str) -> String {
    if name.len() + ".json".len() <= MAX_SIDECAR_NAME {
        return name.to_string();
    }
    let mut end = MAX_SIDECAR_NAME - ".json".len();
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

fn bracket_swap(name: &str) -> String {
    if let Some(m) = BRACKET_RE.find_iter(name).last() {
        let bracket = m.as_str().trim_end_matches('.').to_string();
        if let Some(pos) = name.rfind(&bracket) {
            let mut result = String::with_capacity(name.len());
            result.push_str(&name[..pos]);
            result.push_str(&name[pos + bracket.len()..]);
            result.push_str(&bracket);
            return result;
        }
    }
    name.to_string()
}

/// Undo a stage-1 style extension fix. `IMG_2367(1).jpg.heic` (either order
/// of the two extensions) came from an original `IMG_2367.HEIC` whose
/// sidecar still carries the pre-fix name with the `(N)` after the
/// extension: `IMG_2367.HEIC(1)`.
fn reverse_extension_fix(name: &str) -> Option<String> {
    let caps = EXT_FIX_FWD_RE
        .captures(name)
        .or_else(|| EXT_FIX_REV_RE.captures(name))?;
    let stem = caps.name("stem")?.as_str();
    let heavy = caps.name("heavy")?.as_str().to_uppercase();
    let mut result = format!("{stem}.{heavy}");
    if let Some(num) = caps.name("num") {
        result.push_str(&format!("({})", num.as_str()));
    }
    Some(result)
}

fn no_extension(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

fn remove_digit(name: &str) -> String {
    DIGIT_RE.replace_all(name, ".").to_string()
}

/// Parsed sidecar content. Every field is optional; a sidecar that fails
/// to parse at all is treated the same as an absent one.
#[derive(Debug, Clone, Default)]
pub struct SidecarData {
    pub date_taken: Option<NaiveDateTime>,
    pub coordinates: Option<(f64, f64)>,
    pub is_partner_shared: bool,
}

#[derive(Deserialize)]
struct RawSidecar {
    #[serde(rename = "photoTakenTime")]
    photo_taken_time: Option<RawTime>,
    #[serde(rename = "geoData")]
    geo_data: Option<RawGeo>,
    #[serde(rename = "googlePhotosOrigin")]
    origin: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTime {
    timestamp: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawGeo {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl SidecarData {
    /// Read and parse a sidecar file. Malformed JSON and missing fields are
    /// absence, not errors.
    pub fn load(path: &Path) -> SidecarData {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                log::debug!("sidecar read failed for {}: {err}", path.display());
                return SidecarData::default();
            }
        };
        match serde_json::from_slice::<RawSidecar>(&bytes) {
            Ok(raw) => SidecarData::from_raw(raw),
            Err(err) => {
                log::debug!("sidecar parse failed for {}: {err}", path.display());
                SidecarData::default()
            }
        }
    }

    fn from_raw(raw: RawSidecar) -> SidecarData {
        let date_taken = raw
            .photo_taken_time
            .and_then(|t| t.timestamp)
            .and_then(parse_epoch)
            .and_then(|epoch| chrono::DateTime::from_timestamp(epoch, 0))
            .map(|utc| utc.with_timezone(&chrono::Local).naive_local());

        let coordinates = raw.geo_data.and_then(|geo| {
            let lat = geo.latitude?;
            let lon = geo.longitude?;
            // Google writes 0.0/0.0 when no location was recorded.
            if lat == 0.0 && lon == 0.0 {
                None
            } else {
                Some((lat, lon))
            }
        });

        let is_partner_shared = raw
            .origin
            .as_ref()
            .and_then(|o| o.get("fromPartnerSharing"))
            .is_some();

        SidecarData {
            date_taken,
            coordinates,
            is_partner_shared,
        }
    }
}

/// Google writes the epoch as a string, but older exports used a bare
/// integer.
fn parse_epoch(value: serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

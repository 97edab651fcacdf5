use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Localized "edited" suffixes (lowercase). Some filesystems deliver NFD
/// names, so callers normalize to NFC before comparing.
const EXTRA_FORMATS: &[&str] = &[
    "-edited",      // EN
    "-effects",     // EN
    "-smile",       // EN
    "-mix",         // EN
    "-edytowane",   // PL
    "-bearbeitet",  // DE
    "-bewerkt",     // NL
    "-編集済み",     // JA
    "-modificato",  // IT
    "-modifié",     // FR
    "-ha editado",  // ES
    "-editat",      // CA
];

/// Extensions a truncated sidecar name may have lost; used by the try-hard
/// restore step.
const RESTORE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "mp4", "mov", "avi", "webp",
];

static EXTRA_WITH_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<extra>-[A-Za-zÀ-ÖØ-öø-ÿ]+(\(\d\))?)\.\w+$").unwrap());
static TRAILING_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d+\)$").unwrap());

/// Check if a filename (without extension) is an edited derivative.
pub fn is_extra(filename_without_ext: &str) -> bool {
    let name: String = filename_without_ext.to_lowercase().nfc().collect();
    EXTRA_FORMATS.iter().any(|extra| {
        name.ends_with(extra)
            || strip_trailing_digit(&name)
                .map(|s| s.ends_with(extra))
                .unwrap_or(false)
    })
}

pub fn is_extra_path(path: &Path) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    is_extra(stem)
}

/// Remove a complete extra suffix (with an optional trailing `(N)`) from a
/// filename, NFC-normalizing first.
pub fn remove_extra(filename: &str) -> String {
    let normalized: String = filename.nfc().collect();
    let lower = normalized.to_lowercase();
    for extra in EXTRA_FORMATS {
        if let Some(pos) = lower.rfind(extra) {
            let mut result = normalized.clone();
            let end = pos + extra.len();
            if result.is_char_boundary(pos) && result.is_char_boundary(end) {
                result.replace_range(pos..end, "");
                return result;
            }
        }
    }
    normalized
}

/// Try-hard variant: strip any >= 2-character prefix of a known extra marker
/// from the end of the stem. Catches names where the filesystem truncated the
/// marker itself ("IMG-edi" from "IMG-edited").
pub fn remove_partial_extra(filename: &str) -> Option<String> {
    let normalized: String = filename.nfc().collect();
    let (stem, ext) = split_name(&normalized);
    let stem_lower = stem.to_lowercase();
    for extra in EXTRA_FORMATS {
        let chars: Vec<char> = extra.chars().collect();
        for take in (2..=chars.len()).rev() {
            let prefix: String = chars[..take].iter().collect();
            if stem_lower.ends_with(&prefix) {
                let cut = stem.len() - prefix.len();
                if !stem.is_char_boundary(cut) {
                    continue;
                }
                let mut out = stem[..cut].to_string();
                if !ext.is_empty() {
                    out.push('.');
                    out.push_str(ext);
                }
                return Some(out);
            }
        }
    }
    None
}

/// After a partial-extra strip, the original extension may itself have been
/// truncated. Produce candidates with each plausible full extension
/// substituted for the stub.
pub fn restore_truncated_extension(filename: &str) -> Vec<String> {
    let (stem, ext) = split_name(filename);
    if ext.is_empty() || ext.len() >= 4 {
        return Vec::new();
    }
    let ext_lower = ext.to_lowercase();
    RESTORE_EXTENSIONS
        .iter()
        .filter(|full| full.starts_with(&ext_lower) && full.len() > ext_lower.len())
        .map(|full| format!("{stem}.{full}"))
        .collect()
}

/// Heuristic catch-all for truncations the fixed tables miss: a single
/// `-word` (optionally `(N)`) suffix right before the extension.
pub fn remove_extra_regex(filename: &str) -> Option<String> {
    let matches: Vec<_> = EXTRA_WITH_DIGIT_RE.find_iter(filename).collect();
    if matches.len() != 1 {
        return None;
    }
    let caps = EXTRA_WITH_DIGIT_RE.captures(filename)?;
    let extra = caps.name("extra")?;
    let mut result = filename.to_string();
    result.replace_range(extra.start()..extra.end(), "");
    Some(result)
}

fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos + 1..]),
        _ => (filename, ""),
    }
}

fn strip_trailing_digit(name: &str) -> Option<String> {
    if TRAILING_DIGIT_RE.is_match(name) {
        Some(TRAILING_DIGIT_RE.replace(name, "").into_owned())
    } else {
        None
    }
}

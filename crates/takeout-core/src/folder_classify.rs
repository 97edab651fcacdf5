use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Localized prefixes: "<prefix>YYYY"
const YEAR_FOLDER_PREFIXES: &[&str] = &[
    "Photos from ",      // EN
    "Fotos von ",        // DE
    "Fotos aus ",        // DE (alternate)
    "Photos de ",        // FR
    "Fotos de ",         // ES, PT, CA
    "Foto's uit ",       // NL
    "Foto dal ",         // IT
    "Foto del ",         // IT (alternate)
    "Zdjęcia z ",        // PL
    "Фото за ",          // RU
    "Фотографии за ",    // RU (alternate)
    "Fotky z ",          // CS
    "Fotografii din ",   // RO
    "Foton från ",       // SV
    "Bilder fra ",       // NO
    "Billeder fra ",     // DA
    "Valokuvat ",        // FI
    "Fényképek - ",      // HU
    "Fotoğraflar ",      // TR
];

/// Localized suffixes: "YYYY<suffix>"
const YEAR_FOLDER_SUFFIXES: &[&str] = &[
    " 年の写真",   // JA
    "年のフォト",   // JA (alternate)
    "년의 사진",    // KO
    "年的照片",     // ZH-CN
    "年的相片",     // ZH-TW
];

/// Google-generated folders that are content-bearing but not albums.
const SPECIAL_FOLDERS: &[&str] = &["Archive", "Trash", "Screenshots", "Camera"];

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(20|19|18)\d{2}$").unwrap());
static YEAR_ANYWHERE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Photos\s+from\s+(\d{4})").unwrap());

/// What a directory means to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderKind {
    Year(u16),
    Special,
    /// Any other directory that directly contains media. `ALL_PHOTOS` in
    /// input is not reserved; it classifies as a regular album.
    Album(String),
    Other,
}

/// Extract the year from a Google Takeout year folder name, if it is one.
pub fn year_folder_year(name: &str) -> Option<u16> {
    for prefix in YEAR_FOLDER_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            if YEAR_RE.is_match(rest) {
                return rest.parse().ok();
            }
        }
    }
    for suffix in YEAR_FOLDER_SUFFIXES {
        if let Some(rest) = name.strip_suffix(suffix) {
            if YEAR_RE.is_match(rest) {
                return rest.parse().ok();
            }
        }
    }
    None
}

pub fn is_year_folder(name: &str) -> bool {
    year_folder_year(name).is_some()
}

pub fn is_special_folder(name: &str) -> bool {
    SPECIAL_FOLDERS.contains(&name)
}

/// Classify a directory. `has_media` is whether the directory directly
/// contains at least one photo/video file.
pub fn classify(name: &str, has_media: bool) -> FolderKind {
    if let Some(year) = year_folder_year(name) {
        return FolderKind::Year(year);
    }
    if is_special_folder(name) {
        return FolderKind::Special;
    }
    if has_media {
        return FolderKind::Album(name.to_string());
    }
    FolderKind::Other
}

/// Loose year match for the folder-year date extractor: any ancestor
/// directory of `path` named like "Photos from YYYY" (case-insensitive,
/// whitespace tolerant) yields its year.
pub fn ancestor_year(path: &Path) -> Option<u16> {
    for comp in path.ancestors().skip(1) {
        let name = comp.file_name().and_then(|n| n.to_str())?;
        if let Some(caps) = YEAR_ANYWHERE_RE.captures(name) {
            if let Ok(year) = caps[1].parse::<u16>() {
                return Some(year);
            }
        }
        if let Some(year) = year_folder_year(name) {
            return Some(year);
        }
    }
    None
}

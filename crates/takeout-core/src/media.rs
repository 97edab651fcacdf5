use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Key into a media entity's file map. `Canonical` is the album-independent
/// entry (the year-folder file); each album the media belongs to gets its
/// own `Album` entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlbumKey {
    Canonical,
    Album(String),
}

impl AlbumKey {
    pub fn album_name(&self) -> Option<&str> {
        match self {
            AlbumKey::Canonical => None,
            AlbumKey::Album(name) => Some(name),
        }
    }
}

/// Rank of the source that produced `date_taken`. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DateAccuracy {
    Json,
    Exif,
    GuessName,
    JsonTryHard,
    FolderYear,
    #[default]
    Unknown,
}

impl DateAccuracy {
    pub fn tier(&self) -> u8 {
        match self {
            DateAccuracy::Json => 0,
            DateAccuracy::Exif => 1,
            DateAccuracy::GuessName => 2,
            DateAccuracy::JsonTryHard => 3,
            DateAccuracy::FolderYear => 4,
            DateAccuracy::Unknown => u8::MAX,
        }
    }
}

/// One logical photo or video. All paths in `files` refer to byte-identical
/// content; the map never shrinks, it only gains entries as duplicates and
/// album copies are merged in.
#[derive(Debug, Clone)]
pub struct MediaEntity {
    pub files: BTreeMap<AlbumKey, PathBuf>,
    pub date_taken: Option<NaiveDateTime>,
    pub accuracy: DateAccuracy,
    /// (latitude, longitude) in decimal degrees; absent when the sidecar
    /// carried 0.0/0.0 or nothing.
    pub coordinates: Option<(f64, f64)>,
    pub is_partner_shared: bool,
    /// SHA-256 hex of the canonical file's bytes; computed lazily by dedup.
    pub hash: Option<String>,
    pub size: u64,
}

impl MediaEntity {
    pub fn new(key: AlbumKey, path: PathBuf, size: u64) -> Self {
        let mut files = BTreeMap::new();
        files.insert(key, path);
        Self {
            files,
            date_taken: None,
            accuracy: DateAccuracy::Unknown,
            coordinates: None,
            is_partner_shared: false,
            hash: None,
            size,
        }
    }

    /// The album-independent file when present, else the first album entry.
    pub fn canonical_path(&self) -> &Path {
        self.files
            .get(&AlbumKey::Canonical)
            .unwrap_or_else(|| self.files.values().next().expect("entity with no files"))
    }

    pub fn filename(&self) -> &str {
        self.canonical_path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn album_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().filter_map(|k| k.album_name())
    }

    pub fn has_canonical(&self) -> bool {
        self.files.contains_key(&AlbumKey::Canonical)
    }

    /// Merge another entity's file map into this one. Existing entries win;
    /// the loser's paths stay on disk so no byte stream is orphaned before
    /// the mover runs.
    pub fn merge_from(&mut self, other: MediaEntity) {
        for (key, path) in other.files {
            self.files.entry(key).or_insert(path);
        }
        if other.accuracy < self.accuracy {
            self.date_taken = other.date_taken;
            self.accuracy = other.accuracy;
        }
        if self.coordinates.is_none() {
            self.coordinates = other.coordinates;
        }
        self.is_partner_shared |= other.is_partner_shared;
    }
}

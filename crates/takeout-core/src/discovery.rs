//! Stage 2: walk the input tree and build the initial media collection.

use std::path::Path;

use walkdir::WalkDir;

use crate::config::Config;
use crate::extras;
use crate::folder_classify::{self, FolderKind};
use crate::media::{AlbumKey, MediaEntity};

/// Extensions that `mime_guess` has no useful mapping for but Google
/// exports anyway.
const EXTRA_MEDIA_EXTENSIONS: &[&str] = &["mp", "mv", "dng", "cr2"];

pub struct DiscoveryResult {
    pub media: Vec<MediaEntity>,
    pub extras_skipped: u64,
}

/// A file is media iff its MIME type is image/* or video/*, its lowercased
/// extension is one of the Google-specific set, or it is an AVCHD clip
/// (model/vnd.mts).
pub fn is_media_file(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if EXTRA_MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return true;
        }
    }
    match mime_guess::from_path(path).first() {
        Some(mime) => {
            mime.type_() == mime_guess::mime::IMAGE
                || mime.type_() == mime_guess::mime::VIDEO
                || mime.essence_str() == "model/vnd.mts"
        }
        None => false,
    }
}

/// Walk the input tree, classify each media file by its parent directory,
/// and build one entity per file. Year-folder and root files become
/// canonical entries; special and album folders become album entries (the
/// `nothing` behavior later decides whether special folders survive).
pub fn discover(config: &Config) -> DiscoveryResult {
    let mut media = Vec::new();
    let mut extras_skipped = 0u64;

    for entry in WalkDir::new(&config.input)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_media_file(path) {
            continue;
        }

        if config.skip_extras && extras::is_extra_path(path) {
            extras_skipped += 1;
            log::debug!("skipping edited variant {}", path.display());
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let key = classify_parent(path, &config.input);
        media.push(MediaEntity::new(key, path.to_path_buf(), size));
    }

    log::info!(
        "discovered {} media files ({} extras skipped)",
        media.len(),
        extras_skipped
    );
    DiscoveryResult {
        media,
        extras_skipped,
    }
}

fn classify_parent(path: &Path, input_root: &Path) -> AlbumKey {
    let Some(parent) = path.parent() else {
        return AlbumKey::Canonical;
    };
    if parent == input_root {
        return AlbumKey::Canonical;
    }
    let name = parent.file_name().and_then(|n| n.to_str()).unwrap_or("");
    match folder_classify::classify(name, true) {
        FolderKind::Year(_) => AlbumKey::Canonical,
        // Special folders ride as albums named after themselves; the album
        // stage and the `nothing` behavior decide what happens to them.
        FolderKind::Special => AlbumKey::Album(name.to_string()),
        FolderKind::Album(album) => AlbumKey::Album(album),
        FolderKind::Other => AlbumKey::Canonical,
    }
}

//! Stage 6: merge entities that are the same media seen from different
//! album folders, and resolve the `nothing` behavior's conflict rule.

use std::collections::HashMap;

use crate::config::{AlbumBehavior, Config};
use crate::media::{AlbumKey, MediaEntity};

/// Dedup already consolidated byte-identical copies. This pass catches the
/// rest: album copies that hash differently (post-processed on export) but
/// are the same logical media, matched by (filename, size).
pub fn merge_albums(media: &mut Vec<MediaEntity>, config: &Config) -> usize {
    let mut index: HashMap<(String, u64), usize> = HashMap::with_capacity(media.len());
    let mut to_remove: Vec<usize> = Vec::new();

    // Canonical entities register first so album-only entities merge into
    // them rather than the other way around.
    for (i, m) in media.iter().enumerate() {
        if m.has_canonical() {
            index.entry((m.filename().to_string(), m.size)).or_insert(i);
        }
    }

    for (i, m) in media.iter().enumerate() {
        if m.has_canonical() {
            continue;
        }
        let key = (m.filename().to_string(), m.size);
        match index.get(&key) {
            Some(&target) if target != i => {
                to_remove.push(i);
            }
            _ => {
                index.insert(key, i);
            }
        }
    }

    // Replay the merges with valid indices, then drop merged entities.
    for &i in &to_remove {
        let key = (media[i].filename().to_string(), media[i].size);
        if let Some(&target) = index.get(&key) {
            let entity = media[i].clone();
            media[target].merge_from(entity);
        }
    }
    let merged = to_remove.len();
    to_remove.sort_unstable();
    for &idx in to_remove.iter().rev() {
        media.remove(idx);
    }

    if config.album_behavior == AlbumBehavior::Nothing {
        warn_about_dropped_content(media);
        // Under `nothing` an entity never carries both the canonical entry
        // and album labels; only the canonical file is placed.
        for m in media.iter_mut() {
            if m.has_canonical() {
                m.files.retain(|k, _| *k == AlbumKey::Canonical);
            }
        }
    }

    if merged > 0 {
        log::info!("merged {merged} album copies into existing entities");
    }
    merged
}

/// `nothing` drops album-only entities, including Archive and Trash
/// content that exists nowhere else. That is documented data loss; make it
/// loud before the mover runs.
fn warn_about_dropped_content(media: &[MediaEntity]) {
    let dropped: Vec<&MediaEntity> = media.iter().filter(|m| !m.has_canonical()).collect();
    if dropped.is_empty() {
        return;
    }
    let special = dropped
        .iter()
        .filter(|m| {
            m.album_names()
                .any(|name| name == "Archive" || name == "Trash")
        })
        .count();
    log::warn!(
        "album behavior 'nothing' will drop {} file(s) that exist only in album folders{}",
        dropped.len(),
        if special > 0 {
            format!(" ({special} of them under Archive/Trash)")
        } else {
            String::new()
        }
    );
}

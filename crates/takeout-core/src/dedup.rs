//! Stage 3: content-hash deduplication with album-membership merging.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::media::MediaEntity;

/// Files above this size are treated as unique when `limit_file_size` is
/// set; hashing them would dominate the run.
const MAX_HASH_SIZE: u64 = 64 * 1024 * 1024;

/// SHA-256 over the full byte stream, streamed rather than buffered.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Group media by content hash, keep one canonical entity per group, and
/// merge the losers' album entries into the survivor. Loser files stay on
/// disk untouched; the mover consolidates them, so a crash here loses
/// nothing. Returns the number of entities removed.
pub fn deduplicate(media: &mut Vec<MediaEntity>, config: &Config) -> usize {
    // Only hash files that share a size with at least one other file.
    let mut size_groups: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, m) in media.iter().enumerate() {
        size_groups.entry(m.size).or_default().push(i);
    }

    let needs_hash: Vec<usize> = size_groups
        .values()
        .filter(|indices| indices.len() > 1)
        .flatten()
        .copied()
        .filter(|&i| media[i].hash.is_none())
        .filter(|&i| !config.limit_file_size || media[i].size <= MAX_HASH_SIZE)
        .collect();

    if !needs_hash.is_empty() {
        let pb = ProgressBar::new(needs_hash.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40}] {pos}/{len} hashing duplicates")
                .unwrap(),
        );

        let hashes: Vec<(usize, Option<String>)> = needs_hash
            .par_iter()
            .map(|&idx| {
                let hash = match hash_file(media[idx].canonical_path()) {
                    Ok(h) => Some(h),
                    Err(err) => {
                        log::error!(
                            "hashing failed for {}: {err}",
                            media[idx].canonical_path().display()
                        );
                        None
                    }
                };
                pb.inc(1);
                (idx, hash)
            })
            .collect();
        pb.finish_and_clear();

        for (idx, hash) in hashes {
            media[idx].hash = hash;
        }
    }

    // Group by (size, hash); unhashed entities are unique by definition.
    let mut hash_groups: HashMap<(u64, String), Vec<usize>> = HashMap::new();
    for (i, m) in media.iter().enumerate() {
        if let Some(hash) = &m.hash {
            hash_groups
                .entry((m.size, hash.clone()))
                .or_default()
                .push(i);
        }
    }

    // Merge album maps into survivors while all indices are still valid,
    // then drop the losers back-to-front.
    let mut to_remove: Vec<usize> = Vec::new();
    for indices in hash_groups.values() {
        if indices.len() <= 1 {
            continue;
        }
        let mut sorted = indices.clone();
        sorted.sort_by(|&a, &b| {
            // Longer filenames tend to preserve Google's original naming.
            media[b]
                .filename()
                .len()
                .cmp(&media[a].filename().len())
                .then_with(|| media[a].accuracy.cmp(&media[b].accuracy))
                .then_with(|| media[a].canonical_path().cmp(media[b].canonical_path()))
        });
        let survivor = sorted[0];
        for &loser in &sorted[1..] {
            let loser_entity = media[loser].clone();
            media[survivor].merge_from(loser_entity);
            to_remove.push(loser);
        }
    }

    let removed = to_remove.len();
    to_remove.sort_unstable();
    for &idx in to_remove.iter().rev() {
        media.remove(idx);
    }

    if removed > 0 {
        log::info!("removed {removed} duplicate entities");
    }
    removed
}

//! Media reconciliation pipeline for extracted Google Photos Takeout trees.
//!
//! Eight strictly sequential stages share an immutable [`Config`] and a
//! mutable media collection: extension correction, discovery, dedup, date
//! extraction, metadata write-back, album merge, moving, creation-time
//! sync. Per-file failures are contained and counted; only configuration
//! problems and stage-fatal conditions abort the run.

pub mod albums;
pub mod config;
pub mod creation_time;
pub mod date;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod exif_writer;
pub mod extension_fix;
pub mod extras;
pub mod folder_classify;
pub mod media;
pub mod moving;
pub mod sidecar;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

pub use config::{AlbumBehavior, Config, DateDivision, ExtensionFixMode};
pub use error::{exit_code, PipelineError};
pub use exif_writer::{ExiftoolWriter, MetadataWriter};
pub use media::{AlbumKey, DateAccuracy, MediaEntity};

/// Cooperative cancellation flag, checked at stage boundaries and between
/// mover batches. In-flight file operations always run to completion so a
/// cancel never leaves a half-renamed pair.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Aggregated counts and timings for one pipeline run. Every number
/// reflects actual effects, not attempts.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub total_media: u64,
    pub extensions_fixed: u64,
    pub extras_skipped: u64,
    pub duplicates_removed: u64,
    pub albums_merged: u64,
    pub datetimes_written: u64,
    pub coordinates_written: u64,
    pub creation_times_updated: u64,
    pub moved: u64,
    pub move_failures: u64,
    pub dropped: u64,
    pub errors: Vec<String>,
    /// Entities per date-accuracy tier, indexed by [`DateAccuracy::tier`]
    /// order: json, exif, guess, json-tryhard, folder-year, none.
    pub extraction_tiers: [u64; 6],
    pub stage_timings: Vec<(&'static str, Duration)>,
}

impl PipelineSummary {
    /// Up to five errors, then a count of the rest.
    pub fn error_preview(&self) -> Vec<String> {
        let mut preview: Vec<String> = self.errors.iter().take(5).cloned().collect();
        if self.errors.len() > 5 {
            preview.push(format!("... and {} more", self.errors.len() - 5));
        }
        preview
    }
}

fn tier_slot(accuracy: DateAccuracy) -> usize {
    match accuracy {
        DateAccuracy::Json => 0,
        DateAccuracy::Exif => 1,
        DateAccuracy::GuessName => 2,
        DateAccuracy::JsonTryHard => 3,
        DateAccuracy::FolderYear => 4,
        DateAccuracy::Unknown => 5,
    }
}

/// Run all eight stages. A `Err` return means the pipeline aborted; partial
/// output may exist but the error says why.
pub fn run_pipeline(
    config: &Config,
    cancel: Option<&CancellationToken>,
) -> Result<PipelineSummary, PipelineError> {
    config.validate()?;
    if !config.input.exists() {
        return Err(PipelineError::InputMissing(config.input.clone()));
    }

    let mut summary = PipelineSummary::default();
    let check = || -> Result<(), PipelineError> {
        match cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    };

    // Stage 1: extension correction.
    if config.extension_fix != ExtensionFixMode::None || config.transform_pixel_mp {
        let t = Instant::now();
        let skip_jpeg = config.extension_fix == ExtensionFixMode::Conservative;
        let result = extension_fix::fix_extensions(&config.input, config, skip_jpeg);
        summary.extensions_fixed = result.renamed;
        summary.stage_timings.push(("fix-extensions", t.elapsed()));
        if config.extension_fix == ExtensionFixMode::Solo {
            log::info!("solo extension fix done, skipping remaining stages");
            return Ok(summary);
        }
    }
    check()?;

    // Stage 2: discovery.
    let t = Instant::now();
    let discovered = discovery::discover(config);
    let mut media = discovered.media;
    summary.extras_skipped = discovered.extras_skipped;
    summary.total_media = media.len() as u64;
    summary.stage_timings.push(("discover", t.elapsed()));
    if media.is_empty() {
        return Err(PipelineError::NoMedia(config.input.clone()));
    }
    check()?;

    // Stage 3: deduplication.
    let t = Instant::now();
    summary.duplicates_removed = dedup::deduplicate(&mut media, config) as u64;
    summary.stage_timings.push(("dedup", t.elapsed()));
    check()?;

    // Stage 4: date extraction. Each task owns its entity; no shared state.
    let t = Instant::now();
    let pb = ProgressBar::new(media.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} extracting dates")
            .unwrap(),
    );
    media.par_iter_mut().for_each(|entity| {
        let extraction = date::extract(entity.canonical_path(), config);
        entity.date_taken = extraction.date;
        entity.accuracy = extraction.accuracy;
        if let Some(sidecar) = extraction.sidecar {
            entity.coordinates = sidecar.coordinates;
            entity.is_partner_shared = sidecar.is_partner_shared;
        }
        pb.inc(1);
    });
    pb.finish_and_clear();
    for entity in &media {
        summary.extraction_tiers[tier_slot(entity.accuracy)] += 1;
    }
    summary.stage_timings.push(("extract-dates", t.elapsed()));
    check()?;

    // Stage 5: metadata write-back.
    if config.write_exif {
        let t = Instant::now();
        let external = ExiftoolWriter::detect();
        if external.is_none() {
            log::debug!("exiftool not found; only JPEGs get in-process writes");
        }
        let stats = exif_writer::write_metadata(
            &media,
            config,
            external.as_ref().map(|w| w as &dyn MetadataWriter),
        );
        summary.datetimes_written = stats.datetimes_written;
        summary.coordinates_written = stats.coordinates_written;
        summary.stage_timings.push(("write-exif", t.elapsed()));
    }
    check()?;

    // Stage 6: album detection.
    let t = Instant::now();
    summary.albums_merged = albums::merge_albums(&mut media, config) as u64;
    summary.stage_timings.push(("merge-albums", t.elapsed()));
    check()?;

    // Stage 7: moving.
    let t = Instant::now();
    let outcome = moving::move_collection(&media, config, cancel)?;
    summary.moved = outcome.moved;
    summary.move_failures = outcome.failed;
    summary.dropped = outcome.dropped;
    summary.errors = outcome.errors;
    summary.stage_timings.push(("move", t.elapsed()));
    check()?;

    // Stage 8: creation-time sync.
    if config.update_creation_time {
        let t = Instant::now();
        summary.creation_times_updated = creation_time::sync_creation_times(&outcome.placed);
        summary
            .stage_timings
            .push(("sync-creation-time", t.elapsed()));
    }

    Ok(summary)
}

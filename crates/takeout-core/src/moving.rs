//! Stage 7: materialize the output tree.
//!
//! Name generation is sequential (the output directory is the only shared
//! resource), execution is batched across a bounded pool of workers. Each
//! entity's operations run in order inside one task, so a copy that reads
//! the just-moved primary file never races it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::{AlbumBehavior, Config, DateDivision};
use crate::media::MediaEntity;
use crate::CancellationToken;

const ALL_PHOTOS_DIR: &str = "ALL_PHOTOS";
const ALBUMS_DIR: &str = "ALBUMS";
const PARTNER_SHARED_DIR: &str = "PARTNER_SHARED";

/// Worker width and batch size bound open file handles.
const MOVE_CONCURRENCY: usize = 10;
const MOVE_BATCH: usize = 100;

#[derive(Debug)]
enum FileOp {
    Move { src: PathBuf, dest: PathBuf },
    Copy { src: PathBuf, dest: PathBuf },
    Link { target: PathBuf, link: PathBuf },
}

struct EntityPlan {
    ops: Vec<FileOp>,
    date: Option<NaiveDateTime>,
}

#[derive(Debug, Default)]
pub struct MoveOutcome {
    /// Entities fully materialized.
    pub moved: u64,
    /// Entities with at least one failed operation.
    pub failed: u64,
    /// Album-only entities dropped by the `nothing` behavior.
    pub dropped: u64,
    pub errors: Vec<String>,
    /// Primary destination and recovered date of every planned entity, for
    /// the creation-time stage.
    pub placed: Vec<(PathBuf, Option<NaiveDateTime>)>,
}

#[derive(Serialize)]
struct IndexRecord {
    path: String,
    albums: Vec<String>,
    date_taken: Option<String>,
    coordinates: Option<(f64, f64)>,
    is_partner_shared: bool,
}

/// Move the collection into the output tree per the configured strategy.
pub fn move_collection(
    media: &[MediaEntity],
    config: &Config,
    cancel: Option<&CancellationToken>,
) -> anyhow::Result<MoveOutcome> {
    fs::create_dir_all(&config.output)?;

    let mut outcome = MoveOutcome::default();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut plans: Vec<EntityPlan> = Vec::with_capacity(media.len());
    let mut index_records: Vec<IndexRecord> = Vec::new();

    // Phase 1: sequential destination assignment and directory creation.
    for entity in media {
        if config.album_behavior == AlbumBehavior::Nothing && !entity.has_canonical() {
            outcome.dropped += 1;
            log::debug!(
                "dropping album-only entity {} (album behavior 'nothing')",
                entity.canonical_path().display()
            );
            continue;
        }
        let plan = plan_entity(entity, config, &mut used_paths)?;
        if config.album_behavior == AlbumBehavior::Json {
            index_records.push(index_record(entity, &plan, config));
        }
        if let Some(FileOp::Move { dest, .. }) = plan.ops.first() {
            outcome.placed.push((dest.clone(), plan.date));
        }
        plans.push(plan);
    }

    // Phase 2: batched parallel execution.
    let total = plans.len() as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} moving files")
            .unwrap(),
    );

    let moved = AtomicU64::new(0);
    let errors: Mutex<Vec<String>> = Mutex::new(Vec::new());

    for batch in plans.chunks(MOVE_BATCH) {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                break;
            }
        }
        let chunk_size = batch.len().div_ceil(MOVE_CONCURRENCY);
        let chunks: Vec<&[EntityPlan]> = batch.chunks(chunk_size).collect();

        std::thread::scope(|s| {
            for chunk in chunks {
                let moved = &moved;
                let errors = &errors;
                let pb = &pb;
                s.spawn(move || {
                    for plan in chunk {
                        match execute_plan(plan) {
                            Ok(()) => {
                                moved.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                log::error!("{err}");
                                errors.lock().unwrap().push(err.to_string());
                            }
                        }
                        pb.inc(1);
                    }
                });
            }
        });
    }
    pb.finish_and_clear();

    outcome.moved = moved.load(Ordering::Relaxed);
    outcome.errors = errors.into_inner().unwrap();
    outcome.failed = outcome.errors.len() as u64;

    // The index observes every prior write.
    if config.album_behavior == AlbumBehavior::Json {
        write_index(&config.output, &index_records)?;
    }

    Ok(outcome)
}

fn plan_entity(
    entity: &MediaEntity,
    config: &Config,
    used_paths: &mut HashSet<PathBuf>,
) -> anyhow::Result<EntityPlan> {
    let mut ops: Vec<FileOp> = Vec::new();
    let filename = entity.filename().to_string();
    let labels: Vec<String> = entity.album_names().map(str::to_string).collect();

    let root = if entity.is_partner_shared && config.divide_partner_shared {
        PARTNER_SHARED_DIR
    } else {
        ALL_PHOTOS_DIR
    };
    let dated_dir = config
        .output
        .join(root)
        .join(date_path(entity.date_taken.as_ref(), config.date_division));

    // Reverse shortcut anchors the physical file in its first album.
    let primary_dir = match config.album_behavior {
        AlbumBehavior::ReverseShortcut if !labels.is_empty() => {
            config.output.join(ALBUMS_DIR).join(&labels[0])
        }
        _ => dated_dir.clone(),
    };
    fs::create_dir_all(&primary_dir)?;
    let primary_dest = unique_path(&primary_dir, &filename, used_paths);
    ops.push(FileOp::Move {
        src: entity.canonical_path().to_path_buf(),
        dest: primary_dest.clone(),
    });

    match config.album_behavior {
        AlbumBehavior::Shortcut => {
            for label in &labels {
                let album_dir = config.output.join(ALBUMS_DIR).join(label);
                fs::create_dir_all(&album_dir)?;
                let link = unique_path(&album_dir, &filename, used_paths);
                ops.push(FileOp::Link {
                    target: primary_dest.clone(),
                    link,
                });
            }
        }
        AlbumBehavior::ReverseShortcut => {
            // Remaining albums get physical duplicates, ALL_PHOTOS links back.
            for label in labels.iter().skip(1) {
                let album_dir = config.output.join(ALBUMS_DIR).join(label);
                fs::create_dir_all(&album_dir)?;
                let dest = unique_path(&album_dir, &filename, used_paths);
                ops.push(FileOp::Copy {
                    src: primary_dest.clone(),
                    dest,
                });
            }
            if !labels.is_empty() {
                fs::create_dir_all(&dated_dir)?;
                let link = unique_path(&dated_dir, &filename, used_paths);
                ops.push(FileOp::Link {
                    target: primary_dest.clone(),
                    link,
                });
            }
        }
        AlbumBehavior::DuplicateCopy => {
            for label in &labels {
                let album_dir = config.output.join(ALBUMS_DIR).join(label);
                fs::create_dir_all(&album_dir)?;
                let dest = unique_path(&album_dir, &filename, used_paths);
                // Copies come from the placed primary so every duplicate
                // carries the stage-5 metadata; the album folder's own
                // input file stays behind untouched.
                ops.push(FileOp::Copy {
                    src: primary_dest.clone(),
                    dest,
                });
            }
        }
        AlbumBehavior::Json | AlbumBehavior::Nothing => {}
    }

    Ok(EntityPlan {
        ops,
        date: entity.date_taken,
    })
}

fn execute_plan(plan: &EntityPlan) -> anyhow::Result<()> {
    for op in &plan.ops {
        match op {
            FileOp::Move { src, dest } => {
                move_file(src, dest)?;
                restore_mtime(dest, plan.date.as_ref());
            }
            FileOp::Copy { src, dest } => {
                fs::copy(src, dest).map_err(|e| {
                    anyhow::anyhow!("copy {} -> {}: {e}", src.display(), dest.display())
                })?;
                restore_mtime(dest, plan.date.as_ref());
            }
            FileOp::Link { target, link } => {
                make_relative_symlink(target, link)?;
            }
        }
    }
    Ok(())
}

/// Rename when possible, copy-and-remove across filesystems.
fn move_file(src: &Path, dest: &Path) -> anyhow::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    fs::copy(src, dest)
        .map_err(|e| anyhow::anyhow!("move {} -> {}: {e}", src.display(), dest.display()))?;
    fs::remove_file(src)
        .map_err(|e| anyhow::anyhow!("remove {} after copy: {e}", src.display()))?;
    Ok(())
}

fn restore_mtime(dest: &Path, date: Option<&NaiveDateTime>) {
    if let Some(dt) = date {
        if let Some(local) = dt.and_local_timezone(chrono::Local).single() {
            let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
            filetime::set_file_mtime(dest, ft).ok();
        }
    }
}

/// Relative link with POSIX separators where the platform allows it.
fn make_relative_symlink(target: &Path, link: &Path) -> anyhow::Result<()> {
    let rel = link
        .parent()
        .and_then(|parent| pathdiff::diff_paths(target, parent))
        .unwrap_or_else(|| target.to_path_buf());

    #[cfg(unix)]
    std::os::unix::fs::symlink(&rel, link)
        .map_err(|e| anyhow::anyhow!("link {} -> {}: {e}", link.display(), rel.display()))?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_file(&rel, link)
        .map_err(|e| anyhow::anyhow!("link {} -> {}: {e}", link.display(), rel.display()))?;

    Ok(())
}

/// Date-derived subdirectory, with UNKNOWN placeholders at the matching
/// depth when no date was recovered.
fn date_path(date: Option<&NaiveDateTime>, division: DateDivision) -> PathBuf {
    match (division, date) {
        (DateDivision::None, _) => PathBuf::new(),
        (DateDivision::Year, Some(dt)) => PathBuf::from(dt.format("%Y").to_string()),
        (DateDivision::Month, Some(dt)) => {
            PathBuf::from(dt.format("%Y").to_string()).join(dt.format("%m").to_string())
        }
        (DateDivision::Day, Some(dt)) => PathBuf::from(dt.format("%Y").to_string())
            .join(dt.format("%m").to_string())
            .join(dt.format("%d").to_string()),
        (DateDivision::Year, None) => PathBuf::from("UNKNOWN_DATE"),
        (DateDivision::Month, None) => PathBuf::from("UNKNOWN_DATE").join("UNKNOWN_MONTH"),
        (DateDivision::Day, None) => PathBuf::from("UNKNOWN_DATE")
            .join("UNKNOWN_MONTH")
            .join("UNKNOWN_DAY"),
    }
}

/// First free name in `dir`, appending ` (1)`, ` (2)`, … before the final
/// extension on collision.
fn unique_path(dir: &Path, filename: &str, used: &mut HashSet<PathBuf>) -> PathBuf {
    let mut dest = dir.join(filename);
    if !used.contains(&dest) && !dest.exists() {
        used.insert(dest.clone());
        return dest;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };
    let mut counter = 1u32;
    loop {
        let candidate = format!("{stem} ({counter}){ext}");
        dest = dir.join(&candidate);
        if !used.contains(&dest) && !dest.exists() {
            used.insert(dest.clone());
            return dest;
        }
        counter += 1;
    }
}

fn index_record(entity: &MediaEntity, plan: &EntityPlan, config: &Config) -> IndexRecord {
    let primary = plan
        .ops
        .first()
        .map(|op| match op {
            FileOp::Move { dest, .. } | FileOp::Copy { dest, .. } => dest.clone(),
            FileOp::Link { link, .. } => link.clone(),
        })
        .unwrap_or_default();
    let relative = primary
        .strip_prefix(&config.output)
        .unwrap_or(&primary)
        .to_string_lossy()
        .replace('\\', "/");

    IndexRecord {
        path: relative,
        albums: entity.album_names().map(str::to_string).collect(),
        date_taken: entity
            .date_taken
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        coordinates: entity.coordinates,
        is_partner_shared: entity.is_partner_shared,
    }
}

fn write_index(output: &Path, records: &[IndexRecord]) -> anyhow::Result<()> {
    let file = fs::File::create(output.join("metadata.json"))?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AlbumKey;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn config_with(behavior: AlbumBehavior, division: DateDivision, out: &Path) -> Config {
        let mut c = Config::new(PathBuf::from("/in"), out.to_path_buf());
        c.album_behavior = behavior;
        c.date_division = division;
        c
    }

    fn entity(key: AlbumKey, path: PathBuf) -> MediaEntity {
        MediaEntity::new(key, path, 0)
    }

    #[test]
    fn date_paths() {
        let dt = date(2020, 1, 2);
        assert_eq!(date_path(Some(&dt), DateDivision::None), PathBuf::new());
        assert_eq!(
            date_path(Some(&dt), DateDivision::Year),
            PathBuf::from("2020")
        );
        assert_eq!(
            date_path(Some(&dt), DateDivision::Month),
            PathBuf::from("2020/01")
        );
        assert_eq!(
            date_path(Some(&dt), DateDivision::Day),
            PathBuf::from("2020/01/02")
        );
        assert_eq!(
            date_path(None, DateDivision::Month),
            PathBuf::from("UNKNOWN_DATE/UNKNOWN_MONTH")
        );
    }

    #[test]
    fn collision_suffix_before_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let mut used = HashSet::new();
        let first = unique_path(tmp.path(), "a.jpg", &mut used);
        let second = unique_path(tmp.path(), "a.jpg", &mut used);
        let third = unique_path(tmp.path(), "a.jpg", &mut used);
        assert_eq!(first.file_name().unwrap(), "a.jpg");
        assert_eq!(second.file_name().unwrap(), "a (1).jpg");
        assert_eq!(third.file_name().unwrap(), "a (2).jpg");
    }

    #[test]
    fn shortcut_moves_canonical_and_links_albums() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        let year = input.join("Photos from 2020");
        fs::create_dir_all(&year).unwrap();
        fs::write(year.join("a.jpg"), b"bytes").unwrap();

        let mut e = entity(AlbumKey::Canonical, year.join("a.jpg"));
        e.date_taken = Some(date(2020, 1, 2));
        e.files
            .insert(AlbumKey::Album("Trip".into()), year.join("a.jpg"));

        let config = config_with(AlbumBehavior::Shortcut, DateDivision::Year, &output);
        let outcome = move_collection(&[e], &config, None).unwrap();
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.failed, 0);

        let placed = output.join("ALL_PHOTOS/2020/a.jpg");
        assert!(placed.is_file());
        assert!(!year.join("a.jpg").exists());

        let link = output.join("ALBUMS/Trip/a.jpg");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&link).unwrap(), b"bytes");
    }

    #[test]
    fn duplicate_copy_fans_out_byte_copies() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        for dir in ["Vacation", "Trip"] {
            fs::create_dir_all(input.join(dir)).unwrap();
            fs::write(input.join(dir).join("a.jpg"), b"same").unwrap();
        }

        let mut e = entity(
            AlbumKey::Album("Vacation".into()),
            input.join("Vacation/a.jpg"),
        );
        e.files
            .insert(AlbumKey::Album("Trip".into()), input.join("Trip/a.jpg"));

        let config = config_with(AlbumBehavior::DuplicateCopy, DateDivision::None, &output);
        let outcome = move_collection(&[e], &config, None).unwrap();
        assert_eq!(outcome.moved, 1);

        assert!(output.join("ALL_PHOTOS/a.jpg").is_file());
        assert!(output.join("ALBUMS/Vacation/a.jpg").is_file());
        assert!(output.join("ALBUMS/Trip/a.jpg").is_file());
        // Independent byte copies, not links.
        for album in ["Vacation", "Trip"] {
            let p = output.join("ALBUMS").join(album).join("a.jpg");
            assert!(!p.symlink_metadata().unwrap().file_type().is_symlink());
            assert_eq!(fs::read(&p).unwrap(), b"same");
        }
    }

    #[test]
    fn nothing_drops_album_only_entities() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(input.join("Archive")).unwrap();
        fs::create_dir_all(input.join("Photos from 2020")).unwrap();
        fs::write(input.join("Archive/c.jpg"), b"archived").unwrap();
        fs::write(input.join("Photos from 2020/a.jpg"), b"kept").unwrap();

        let canonical = entity(AlbumKey::Canonical, input.join("Photos from 2020/a.jpg"));
        let album_only = entity(AlbumKey::Album("Archive".into()), input.join("Archive/c.jpg"));

        let config = config_with(AlbumBehavior::Nothing, DateDivision::None, &output);
        let outcome = move_collection(&[canonical, album_only], &config, None).unwrap();
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.dropped, 1);
        assert!(output.join("ALL_PHOTOS/a.jpg").is_file());
        assert!(!output.join("ALBUMS").exists());
        // The dropped file was never consumed from input.
        assert!(input.join("Archive/c.jpg").exists());
    }

    #[test]
    fn json_behavior_writes_index() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(input.join("Trip")).unwrap();
        fs::write(input.join("Trip/a.jpg"), b"bytes").unwrap();

        let mut e = entity(AlbumKey::Album("Trip".into()), input.join("Trip/a.jpg"));
        e.date_taken = Some(date(2021, 6, 5));
        e.coordinates = Some((1.5, 2.5));

        let config = config_with(AlbumBehavior::Json, DateDivision::Year, &output);
        move_collection(&[e], &config, None).unwrap();

        let index: serde_json::Value =
            serde_json::from_reader(fs::File::open(output.join("metadata.json")).unwrap())
                .unwrap();
        let records = index.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["path"], "ALL_PHOTOS/2021/a.jpg");
        assert_eq!(records[0]["albums"][0], "Trip");
        assert_eq!(records[0]["date_taken"], "2021-06-05 00:00:00");
    }

    #[test]
    fn partner_shared_gets_its_own_root() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.jpg"), b"mine").unwrap();
        fs::write(input.join("b.jpg"), b"partners").unwrap();

        let own = entity(AlbumKey::Canonical, input.join("a.jpg"));
        let mut shared = entity(AlbumKey::Canonical, input.join("b.jpg"));
        shared.is_partner_shared = true;

        let mut config = config_with(AlbumBehavior::Shortcut, DateDivision::None, &output);
        config.divide_partner_shared = true;
        let outcome = move_collection(&[own, shared], &config, None).unwrap();
        assert_eq!(outcome.moved, 2);
        assert!(output.join("ALL_PHOTOS/a.jpg").is_file());
        assert!(output.join("PARTNER_SHARED/b.jpg").is_file());
    }

    #[test]
    fn reverse_shortcut_anchors_in_album() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(input.join("Trip")).unwrap();
        fs::write(input.join("Trip/a.jpg"), b"bytes").unwrap();

        let e = entity(AlbumKey::Album("Trip".into()), input.join("Trip/a.jpg"));

        let config = config_with(AlbumBehavior::ReverseShortcut, DateDivision::None, &output);
        let outcome = move_collection(&[e], &config, None).unwrap();
        assert_eq!(outcome.moved, 1);

        let anchored = output.join("ALBUMS/Trip/a.jpg");
        assert!(anchored.is_file());
        assert!(!anchored
            .symlink_metadata()
            .unwrap()
            .file_type()
            .is_symlink());

        let link = output.join("ALL_PHOTOS/a.jpg");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&link).unwrap(), b"bytes");
    }
}

//! End-to-end pipeline scenarios on temp-dir takeout trees.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use takeout_core::{run_pipeline, AlbumBehavior, Config, DateDivision};

/// Minimal JPEG: SOI, APP0 JFIF stub, SOS marker, fake scan, EOI. Enough
/// structure for the EXIF patcher and reader to operate on.
fn tiny_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
    bytes.extend_from_slice(&[0x12, 0x34, 0x56]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

fn heic_header() -> Vec<u8> {
    let mut h = vec![0x00, 0x00, 0x00, 0x18];
    h.extend_from_slice(b"ftyp");
    h.extend_from_slice(b"heic");
    h.extend_from_slice(&[0u8; 16]);
    h
}

fn write_sidecar(dir: &Path, name: &str, timestamp: i64) {
    fs::write(
        dir.join(name),
        format!(r#"{{"photoTakenTime": {{"timestamp": "{timestamp}"}}}}"#),
    )
    .unwrap();
}

fn base_config(input: PathBuf, output: PathBuf) -> Config {
    Config::new(input, output)
}

#[test]
fn year_folder_photo_lands_dated_with_exif() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2020");
    fs::create_dir_all(&year).unwrap();
    fs::write(year.join("a.jpg"), tiny_jpeg()).unwrap();
    // 2020-01-02 00:00:00 UTC
    write_sidecar(&year, "a.jpg.json", 1577923200);

    let mut config = base_config(input, output.clone());
    config.album_behavior = AlbumBehavior::Shortcut;
    config.date_division = DateDivision::Year;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.total_media, 1);
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.extraction_tiers[0], 1, "sidecar date, tier json");

    let placed = output.join("ALL_PHOTOS/2020/a.jpg");
    assert!(placed.is_file());

    assert_eq!(summary.datetimes_written, 1);
    let bytes = fs::read(&placed).unwrap();
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(&bytes))
        .unwrap();
    let field = exif
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .unwrap();
    // Sidecar epochs convert to local time, so only pin the date part.
    assert!(field.display_value().to_string().contains("2020-01-0")
        || field.display_value().to_string().contains("2020:01:0"));
}

#[test]
fn duplicate_albums_collapse_then_fan_out_as_copies() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    for album in ["Vacation", "Trip"] {
        let dir = input.join(album);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.jpg"), tiny_jpeg()).unwrap();
        write_sidecar(&dir, "a.jpg.json", 1577923200);
    }

    let mut config = base_config(input, output.clone());
    config.album_behavior = AlbumBehavior::DuplicateCopy;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.total_media, 2);
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.moved, 1);

    let canonical = output.join("ALL_PHOTOS/a.jpg");
    let vacation = output.join("ALBUMS/Vacation/a.jpg");
    let trip = output.join("ALBUMS/Trip/a.jpg");
    assert!(canonical.is_file());
    assert!(vacation.is_file());
    assert!(trip.is_file());
    // Independent byte copies.
    for p in [&vacation, &trip] {
        assert!(!p.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read(p).unwrap(), fs::read(&canonical).unwrap());
    }
}

#[test]
fn heic_disguised_as_jpg_is_fixed_and_paired() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2019");
    fs::create_dir_all(&year).unwrap();
    fs::write(year.join("IMG.jpg"), heic_header()).unwrap();
    // 2019-06-01 00:00:00 UTC; away from year boundaries so any host
    // timezone still lands in 2019.
    write_sidecar(&year, "IMG.HEIC.supplemental-metadata.json", 1559347200);

    let mut config = base_config(input.clone(), output.clone());
    config.date_division = DateDivision::Year;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.extensions_fixed, 1);
    assert!(!year.join("IMG.jpg").exists());
    // Renamed sidecar pairs with the renamed media via identity.
    assert!(year
        .join("IMG.jpg.heic.supplemental-metadata.json")
        .exists());
    assert_eq!(summary.extraction_tiers[0], 1);
    assert!(output.join("ALL_PHOTOS/2019/IMG.jpg.heic").is_file());
}

#[test]
fn folder_year_is_the_last_resort() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2023");
    fs::create_dir_all(&year).unwrap();
    // No sidecar, no EXIF, no date in the name.
    fs::write(year.join("b.jpg"), b"not really a jpeg").unwrap();

    let mut config = base_config(input, output.clone());
    config.date_division = DateDivision::Year;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.extraction_tiers[4], 1, "folder-year tier");
    assert!(output.join("ALL_PHOTOS/2023/b.jpg").is_file());
}

#[test]
fn nothing_behavior_drops_archive_and_trash() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    for special in ["Archive", "Trash"] {
        let dir = input.join(special);
        fs::create_dir_all(&dir).unwrap();
    }
    fs::write(input.join("Archive/c.jpg"), b"archived bytes").unwrap();
    fs::write(input.join("Trash/d.jpg"), b"trashed bytes").unwrap();

    let mut config = base_config(input.clone(), output.clone());
    config.album_behavior = AlbumBehavior::Nothing;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.total_media, 2);
    assert_eq!(summary.moved, 0);
    assert_eq!(summary.dropped, 2);
    assert!(!output.join("ALL_PHOTOS/c.jpg").exists());
    assert!(!output.join("ALL_PHOTOS/d.jpg").exists());
    // Documented data loss is output-side only; input is untouched.
    assert!(input.join("Archive/c.jpg").exists());
    assert!(input.join("Trash/d.jpg").exists());
}

#[test]
fn oversized_files_skip_hash_but_still_move() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2021");
    fs::create_dir_all(&year).unwrap();

    // Two sparse 70 MiB files with identical sizes: without the limit they
    // would be hashed; with it they stay unique.
    for name in ["big1.mp4", "big2.mp4"] {
        let f = fs::File::create(year.join(name)).unwrap();
        f.set_len(70 * 1024 * 1024).unwrap();
    }

    let mut config = base_config(input, output.clone());
    config.limit_file_size = true;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.duplicates_removed, 0);
    assert_eq!(summary.moved, 2);
    assert!(output.join("ALL_PHOTOS/big1.mp4").is_file());
    assert!(output.join("ALL_PHOTOS/big2.mp4").is_file());
}

#[test]
fn json_behavior_emits_index_of_all_files() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2020");
    let album = input.join("Holiday");
    fs::create_dir_all(&year).unwrap();
    fs::create_dir_all(&album).unwrap();
    fs::write(year.join("a.jpg"), tiny_jpeg()).unwrap();
    fs::write(album.join("a.jpg"), tiny_jpeg()).unwrap();
    write_sidecar(&year, "a.jpg.json", 1577923200);

    let mut config = base_config(input, output.clone());
    config.album_behavior = AlbumBehavior::Json;

    let summary = run_pipeline(&config, None).unwrap();
    assert_eq!(summary.duplicates_removed, 1);

    let index: serde_json::Value =
        serde_json::from_reader(fs::File::open(output.join("metadata.json")).unwrap()).unwrap();
    let records = index.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["albums"][0], "Holiday");
    assert!(records[0]["path"]
        .as_str()
        .unwrap()
        .starts_with("ALL_PHOTOS/"));
}

#[test]
fn missing_input_and_empty_tree_fail_with_their_codes() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("out");

    let config = base_config(tmp.path().join("does-not-exist"), output.clone());
    let err = run_pipeline(&config, None).unwrap_err();
    assert_eq!(err.exit_code(), takeout_core::exit_code::INPUT_MISSING);

    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let config = base_config(empty, output);
    let err = run_pipeline(&config, None).unwrap_err();
    assert_eq!(err.exit_code(), takeout_core::exit_code::NO_MEDIA);
}

#[test]
fn no_input_bytes_are_lost_under_shortcut() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    let year = input.join("Photos from 2020");
    let album = input.join("Favs");
    fs::create_dir_all(&year).unwrap();
    fs::create_dir_all(&album).unwrap();

    let payloads: Vec<(PathBuf, Vec<u8>)> = vec![
        (year.join("one.jpg"), b"payload one".to_vec()),
        (year.join("two.jpg"), b"payload two".to_vec()),
        (album.join("two.jpg"), b"payload two".to_vec()),
        (album.join("three.jpg"), b"payload three".to_vec()),
    ];
    for (path, bytes) in &payloads {
        fs::write(path, bytes).unwrap();
    }

    let config = base_config(input.clone(), output.clone());
    run_pipeline(&config, None).unwrap();

    // Every distinct byte stream must still exist somewhere.
    for (_, bytes) in &payloads {
        let in_output = walk_files(&output).any(|p| fs::read(&p).ok().as_ref() == Some(bytes));
        let in_input = walk_files(&input).any(|p| fs::read(&p).ok().as_ref() == Some(bytes));
        assert!(in_output || in_input, "byte stream lost: {bytes:?}");
    }
}

fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
}

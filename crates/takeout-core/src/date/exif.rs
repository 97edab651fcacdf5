use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag};

/// Extract a date from the file's EXIF block. EXIF datetimes carry no
/// timezone; they are local time as-is.
pub fn extract_exif_date(path: &Path) -> Option<NaiveDateTime> {
    let mime = mime_guess::from_path(path).first()?;
    if mime.type_() != mime_guess::mime::IMAGE {
        return None;
    }

    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    let tags = [Tag::DateTimeOriginal, Tag::DateTime, Tag::DateTimeDigitized];
    for tag in &tags {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let val = field.display_value().to_string();
            if let Some(dt) = parse_exif_datetime(&val) {
                return Some(dt);
            }
        }
    }

    None
}

/// Cameras disagree on separators (`:`, `-`, `/`, `.`), so don't pattern
/// on them at all: take the digit runs in order and let chrono decide
/// whether they form a date. A value with no usable time part falls back
/// to midnight, matching how date-only fields are treated.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let mut runs = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty());

    let year: i32 = runs.next()?.parse().ok()?;
    let month: u32 = runs.next()?.parse().ok()?;
    let day: u32 = runs.next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    if let (Some(h), Some(m), Some(sec)) = (runs.next(), runs.next(), runs.next()) {
        let time = (h.parse().ok(), m.parse().ok(), sec.parse().ok());
        if let (Some(h), Some(m), Some(sec)) = time {
            if let Some(dt) = date.and_hms_opt(h, m, sec) {
                return Some(dt);
            }
        }
    }
    date.and_hms_opt(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_and_messy_separators() {
        let expected = "2020-01-02 03:04:05";
        for raw in [
            "2020:01:02 03:04:05",
            "2020-01-02 03:04:05",
            "2020/01/02 03.04.05",
        ] {
            let dt = parse_exif_datetime(raw).unwrap();
            assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), expected);
        }
    }

    #[test]
    fn date_only_values_get_midnight() {
        let dt = parse_exif_datetime("2020/01/02").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn broken_time_part_degrades_to_midnight() {
        let dt = parse_exif_datetime("2020:01:02 99:99:99").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2020-01-02 00:00:00");
    }

    #[test]
    fn unset_and_garbage_values_rejected() {
        assert!(parse_exif_datetime("not a date").is_none());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("").is_none());
    }

    #[test]
    fn non_image_yields_none() {
        assert!(extract_exif_date(Path::new("/nope/video.mp4")).is_none());
    }
}

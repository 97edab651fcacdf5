use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::folder_classify;

/// Last-resort extractor: January 1 of the enclosing year folder.
pub fn extract_folder_year(path: &Path) -> Option<NaiveDateTime> {
    let year = folder_classify::ancestor_year(path)?;
    let current = chrono::Local::now().year() as u16;
    if !(1900..=current + 1).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(i32::from(year), 1, 1)?.and_hms_opt(0, 0, 0)
}

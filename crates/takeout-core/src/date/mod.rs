//! Canonical timestamp recovery. Extractors run in strict priority order;
//! the first one that yields a value wins and its rank is recorded as the
//! entity's accuracy tier.

pub mod exif;
pub mod folder_year;
pub mod guess;
pub mod json;

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::config::Config;
use crate::media::DateAccuracy;
use crate::sidecar::SidecarData;

/// Outcome of running the chain for one file. The sidecar (when one was
/// found at any tier) rides along so coordinates and the partner-shared
/// flag don't require a second lookup.
#[derive(Debug, Default)]
pub struct Extraction {
    pub date: Option<NaiveDateTime>,
    pub accuracy: DateAccuracy,
    pub sidecar: Option<SidecarData>,
}

/// Run the extractor chain for `path`.
pub fn extract(path: &Path, config: &Config) -> Extraction {
    let mut out = Extraction::default();

    // 1. JSON sidecar, reliable transforms only.
    if let Some(sidecar) = json::lookup(path, false) {
        let date = sidecar.date_taken.filter(|d| in_range(d));
        out.sidecar = Some(sidecar);
        if let Some(date) = date {
            out.date = Some(date);
            out.accuracy = DateAccuracy::Json;
            return out;
        }
    }

    // 2. EXIF from the media bytes.
    if let Some(date) = exif::extract_exif_date(path).filter(in_range_ref) {
        out.date = Some(date);
        out.accuracy = DateAccuracy::Exif;
        return out;
    }

    // 3. Filename guess, config-gated.
    if config.guess_from_name {
        if let Some(date) = guess::guess_date_from_filename(path).filter(in_range_ref) {
            out.date = Some(date);
            out.accuracy = DateAccuracy::GuessName;
            return out;
        }
    }

    // 4. JSON sidecar again, aggressive transforms enabled. The cascade is
    // monotonic, so this re-finds any basic-transform hit too.
    if let Some(sidecar) = json::lookup(path, true) {
        let date = sidecar.date_taken.filter(|d| in_range(d));
        if out.sidecar.is_none() || date.is_some() {
            out.sidecar = Some(sidecar);
        }
        if let Some(date) = date {
            out.date = Some(date);
            out.accuracy = DateAccuracy::JsonTryHard;
            return out;
        }
    }

    // 5. Year folder.
    if let Some(date) = folder_year::extract_folder_year(path).filter(in_range_ref) {
        out.date = Some(date);
        out.accuracy = DateAccuracy::FolderYear;
    }

    out
}

/// Plausibility window for any recovered timestamp.
fn in_range(date: &NaiveDateTime) -> bool {
    let floor = NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let ceiling = chrono::Local::now().naive_local() + Duration::hours(24);
    *date >= floor && *date <= ceiling
}

fn in_range_ref(date: &NaiveDateTime) -> bool {
    in_range(date)
}

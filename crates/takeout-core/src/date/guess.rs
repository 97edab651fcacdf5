use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// One flexible pattern covers the common camera and app naming schemes
/// (`IMG_20190509_154733`, `Screenshot_20190919-053857`,
/// `signal-2020-10-26-163832`, `2016_01_30_11_49_15`): six constrained
/// digit groups, each pair optionally separated by `-` or `_`.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<y>(?:18|19|20)\d\d) [-_]?
        (?P<mo>0[1-9]|1[0-2])   [-_]?
        (?P<d>[0-3]\d)          [-_]?
        (?P<h>[0-2]\d)          [-_]?
        (?P<mi>[0-5]\d)         [-_]?
        (?P<s>[0-5]\d)",
    )
    .unwrap()
});

/// Guess a timestamp from date-like digit groups embedded in the filename.
/// The first candidate that forms a real calendar date wins; impossible
/// dates (Feb 31) fall through to the next match.
pub fn guess_date_from_filename(path: &Path) -> Option<NaiveDateTime> {
    let basename = path.file_name().and_then(|n| n.to_str())?;
    TIMESTAMP_RE
        .captures_iter(basename)
        .find_map(|caps| assemble(&caps))
}

fn assemble(caps: &regex::Captures) -> Option<NaiveDateTime> {
    let group = |name: &str| caps.name(name)?.as_str().parse::<u32>().ok();
    NaiveDate::from_ymd_opt(group("y")? as i32, group("mo")?, group("d")?)?
        .and_hms_opt(group("h")?, group("mi")?, group("s")?)
}

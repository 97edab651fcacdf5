use std::path::Path;

use crate::sidecar::{self, SidecarData};

/// Locate and parse the sidecar for a media file. Returns `None` when no
/// sidecar exists; a sidecar that exists but parses empty still returns
/// `Some` so the caller doesn't retry the lookup.
pub fn lookup(media_path: &Path, try_hard: bool) -> Option<SidecarData> {
    let sidecar_path = sidecar::find_sidecar(media_path, try_hard)?;
    Some(SidecarData::load(&sidecar_path))
}

//! Stage 8: set filesystem creation time to the recovered date. Windows is
//! the only platform that exposes this; everywhere else the stage no-ops.

use std::path::PathBuf;

use chrono::NaiveDateTime;

/// Set each placed file's creation time to its recovered date. Returns the
/// number of files updated.
#[cfg(windows)]
pub fn sync_creation_times(placed: &[(PathBuf, Option<NaiveDateTime>)]) -> u64 {
    use std::os::windows::io::AsRawHandle;

    use windows_sys::Win32::Foundation::FILETIME;
    use windows_sys::Win32::Storage::FileSystem::SetFileTime;

    let mut updated = 0u64;
    for (path, date) in placed {
        let Some(date) = date else {
            continue;
        };
        let Some(local) = date.and_local_timezone(chrono::Local).single() else {
            continue;
        };
        // Windows FILETIME: 100ns ticks since 1601-01-01 UTC.
        let ticks = (local.timestamp() + 11_644_473_600) as u64 * 10_000_000;
        let ft = FILETIME {
            dwLowDateTime: (ticks & 0xFFFF_FFFF) as u32,
            dwHighDateTime: (ticks >> 32) as u32,
        };

        let Ok(file) = std::fs::OpenOptions::new().write(true).open(path) else {
            log::error!("creation time update failed to open {}", path.display());
            continue;
        };
        let ok = unsafe {
            SetFileTime(
                file.as_raw_handle() as _,
                &ft,
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        if ok != 0 {
            updated += 1;
        } else {
            log::error!("creation time update failed for {}", path.display());
        }
    }
    updated
}

#[cfg(not(windows))]
pub fn sync_creation_times(placed: &[(PathBuf, Option<NaiveDateTime>)]) -> u64 {
    let _ = placed;
    log::info!("creation time sync is not supported on this platform, skipping");
    0
}

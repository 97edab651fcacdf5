use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// How album membership is materialized in the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlbumBehavior {
    /// Canonical file under `ALL_PHOTOS`, relative symlinks under `ALBUMS/<name>/`.
    Shortcut,
    /// Canonical file under `ALBUMS/<name>/`, symlinks back from `ALL_PHOTOS`.
    ReverseShortcut,
    /// Physical byte copy in every destination.
    DuplicateCopy,
    /// Flat `ALL_PHOTOS` placement plus a `metadata.json` index at output root.
    Json,
    /// Only year-folder files are placed; album-only files are dropped.
    Nothing,
}

impl AlbumBehavior {
    pub const ALL: &'static [AlbumBehavior] = &[
        AlbumBehavior::Shortcut,
        AlbumBehavior::ReverseShortcut,
        AlbumBehavior::DuplicateCopy,
        AlbumBehavior::Json,
        AlbumBehavior::Nothing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumBehavior::Shortcut => "shortcut",
            AlbumBehavior::ReverseShortcut => "reverse-shortcut",
            AlbumBehavior::DuplicateCopy => "duplicate-copy",
            AlbumBehavior::Json => "json",
            AlbumBehavior::Nothing => "nothing",
        }
    }
}

impl FromStr for AlbumBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlbumBehavior::ALL
            .iter()
            .find(|b| b.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown album behavior: {s}"))
    }
}

impl fmt::Display for AlbumBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of the date-derived directory tree under `ALL_PHOTOS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DateDivision {
    None,
    Year,
    Month,
    Day,
}

impl DateDivision {
    pub fn from_level(level: u8) -> Result<Self, String> {
        match level {
            0 => Ok(DateDivision::None),
            1 => Ok(DateDivision::Year),
            2 => Ok(DateDivision::Month),
            3 => Ok(DateDivision::Day),
            other => Err(format!("date division level out of range: {other}")),
        }
    }
}

/// Which files stage 1 is allowed to rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionFixMode {
    /// Stage 1 disabled.
    None,
    /// Fix every mismatched extension.
    Standard,
    /// Leave files whose content sniffs as JPEG alone; fix the rest.
    Conservative,
    /// Run stage 1, then terminate the pipeline with success.
    Solo,
}

impl FromStr for ExtensionFixMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ExtensionFixMode::None),
            "standard" => Ok(ExtensionFixMode::Standard),
            "conservative" => Ok(ExtensionFixMode::Conservative),
            "solo" => Ok(ExtensionFixMode::Solo),
            other => Err(format!("unknown extension fix mode: {other}")),
        }
    }
}

impl fmt::Display for ExtensionFixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionFixMode::None => "none",
            ExtensionFixMode::Standard => "standard",
            ExtensionFixMode::Conservative => "conservative",
            ExtensionFixMode::Solo => "solo",
        };
        f.write_str(s)
    }
}

/// Immutable pipeline configuration. Built by the CLI, validated once,
/// then shared read-only by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub album_behavior: AlbumBehavior,
    pub date_division: DateDivision,
    pub extension_fix: ExtensionFixMode,
    pub write_exif: bool,
    pub skip_extras: bool,
    pub guess_from_name: bool,
    pub transform_pixel_mp: bool,
    pub update_creation_time: bool,
    pub limit_file_size: bool,
    pub divide_partner_shared: bool,
    pub verbose: bool,
}

impl Config {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            album_behavior: AlbumBehavior::Shortcut,
            date_division: DateDivision::None,
            extension_fix: ExtensionFixMode::Standard,
            write_exif: true,
            skip_extras: false,
            guess_from_name: true,
            transform_pixel_mp: false,
            update_creation_time: false,
            limit_file_size: false,
            divide_partner_shared: false,
            verbose: false,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input.as_os_str().is_empty() {
            return Err(PipelineError::Config("input path is empty".into()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(PipelineError::Config("output path is empty".into()));
        }
        Ok(())
    }
}

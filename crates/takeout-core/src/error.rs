use std::path::PathBuf;

use thiserror::Error;

/// Process exit codes used by the CLI.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CLI_PARSE: i32 = 2;
    pub const MISSING_ARG: i32 = 10;
    pub const INPUT_MISSING: i32 = 11;
    pub const NO_MEDIA: i32 = 13;
    pub const INTERRUPTED: i32 = 130;
}

/// Pipeline error taxonomy. Per-file failures (decode, sidecar, io) are
/// contained to the file that raised them and never surface as this type;
/// only configuration problems and stage-fatal conditions do.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input path does not exist: {0}")]
    InputMissing(PathBuf),

    #[error("no media files found under {0}")]
    NoMedia(PathBuf),

    #[error("interrupted")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stage(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => exit_code::MISSING_ARG,
            PipelineError::InputMissing(_) => exit_code::INPUT_MISSING,
            PipelineError::NoMedia(_) => exit_code::NO_MEDIA,
            PipelineError::Cancelled => exit_code::INTERRUPTED,
            PipelineError::Io(_) | PipelineError::Stage(_) => exit_code::FAILURE,
        }
    }
}

//! Error types for the preprocessing pipeline.

use shared::VideoState;
use std::path::PathBuf;

/// The transcoder could not read a file's metadata.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffprobe failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    #[error("ffprobe reported no container duration")]
    MissingDuration,

    #[error("ffprobe did not finish within {seconds}s")]
    TimedOut { seconds: u64 },
}

/// The transcoder failed while extracting frames.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg did not finish within {seconds}s")]
    TimedOut { seconds: u64 },
}

/// Errors surfaced by the catalog, preprocessing and label operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("video {0} not found")]
    NotFound(i64),

    #[error("video {id} is stored as '{stored}', not '{requested}'")]
    Mismatch {
        id: i64,
        stored: String,
        requested: String,
    },

    #[error("video {0} is already being preprocessed")]
    Busy(i64),

    #[error("video {id} has no extracted frames (state {state})")]
    NotPreprocessed { id: i64, state: VideoState },

    #[error("invalid coarse frame index {0}")]
    InvalidFrameIndex(u32),

    #[error("label content must be a JSON object")]
    InvalidContent,

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn fs(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Filesystem { path, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! File path utilities for the workbench directories.
//!
//! Source videos live in one directory; everything derived from them
//! (coarse frames, extra frames, label files) lives under the output
//! directory:
//!
//! ```text
//! <output>/<file>/<n>.jpg            coarse frames
//! <output>/<file>/<index>/<n>.jpg    extra frames for coarse index <index>
//! <output>/jsonlist/<file>.json      label file
//! ```

use std::path::{Path, PathBuf};

/// Name of the label file directory under the output directory
pub const LABELS_DIR: &str = "jsonlist";

/// Path manager for source and output files
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    source: PathBuf,
    output: PathBuf,
}

impl WorkspacePaths {
    /// Create a new WorkspacePaths from the source and output directories
    pub fn new(source: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Get the source video directory
    pub fn source_dir(&self) -> &Path {
        &self.source
    }

    /// Get the output root directory
    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Get the source video file
    pub fn video_file(&self, file: &str) -> PathBuf {
        self.source.join(file)
    }

    /// Get the coarse frame directory for a video
    pub fn frames_dir(&self, file: &str) -> PathBuf {
        self.output.join(file)
    }

    /// Get the extra frame directory for one coarse index
    pub fn extras_dir(&self, file: &str, index: u32) -> PathBuf {
        self.frames_dir(file).join(index.to_string())
    }

    /// Get the label file directory
    pub fn labels_dir(&self) -> PathBuf {
        self.output.join(LABELS_DIR)
    }

    /// Get the label file for a video
    pub fn label_file(&self, file: &str) -> PathBuf {
        self.labels_dir().join(format!("{}.json", file))
    }

    /// Create the source and output directories
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.source, &self.output] {
            std::fs::create_dir_all(dir)?;
        }

        Ok(())
    }
}

//! Data models for the workbench.
//!
//! This module defines the persisted video record, its preprocessing state,
//! and the frame views derived from extracted images on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Preprocessing state of a video.
///
/// Serialized as its numeric code, which is also the value stored in the
/// `videos.state` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum VideoState {
    New,
    PreProcessing,
    PreProcessDone,
    PreProcessFail,
    Processed,
    /// Synthesized on read when the source file is gone; never stored
    Removed,
}

impl VideoState {
    pub const ALL: [VideoState; 6] = [
        VideoState::New,
        VideoState::PreProcessing,
        VideoState::PreProcessDone,
        VideoState::PreProcessFail,
        VideoState::Processed,
        VideoState::Removed,
    ];

    /// Numeric code shared with the database and the browser UI
    pub fn code(self) -> u8 {
        match self {
            VideoState::New => 0,
            VideoState::PreProcessing => 1,
            VideoState::PreProcessDone => 2,
            VideoState::PreProcessFail => 3,
            VideoState::Processed => 4,
            VideoState::Removed => 5,
        }
    }

    /// Whether this state may be written to storage
    pub fn is_persistable(self) -> bool {
        self != VideoState::Removed
    }

    /// Whether extracted coarse frames are expected on disk
    pub fn has_frames(self) -> bool {
        matches!(self, VideoState::PreProcessDone | VideoState::Processed)
    }
}

impl From<VideoState> for u8 {
    fn from(state: VideoState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for VideoState {
    type Error = anyhow::Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        VideoState::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or_else(|| anyhow::anyhow!("Invalid video state code: {}", code))
    }
}

impl std::fmt::Display for VideoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoState::New => write!(f, "new"),
            VideoState::PreProcessing => write!(f, "preprocessing"),
            VideoState::PreProcessDone => write!(f, "preprocess_done"),
            VideoState::PreProcessFail => write!(f, "preprocess_fail"),
            VideoState::Processed => write!(f, "processed"),
            VideoState::Removed => write!(f, "removed"),
        }
    }
}

impl std::str::FromStr for VideoState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(VideoState::New),
            "preprocessing" => Ok(VideoState::PreProcessing),
            "preprocess_done" => Ok(VideoState::PreProcessDone),
            "preprocess_fail" => Ok(VideoState::PreProcessFail),
            "processed" => Ok(VideoState::Processed),
            "removed" => Ok(VideoState::Removed),
            _ => Err(anyhow::anyhow!("Invalid video state: {}", s)),
        }
    }
}

/// A video known to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub file: String,
    /// Container duration in seconds
    pub duration: f64,
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
    pub state: VideoState,
    /// Coarse frames, present only on detailed reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<Frame>>,
}

/// Video to be inserted after its first discovery
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub file: String,
    pub duration: f64,
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
}

/// One coarse sample, derived from `<output>/<file>/<index>.jpg`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u32,
    /// Center of the sampling interval, in seconds
    pub timestamp: f64,
    /// Image path relative to the video's output directory
    pub image: String,
}

/// One frame inside a single coarse interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraFrame {
    /// Coarse index this frame belongs to
    pub index: u32,
    /// Position within the coarse interval
    pub fine_index: u32,
    pub timestamp: f64,
    /// Image path relative to the video's output directory, `<index>/<n>.jpg`
    pub image: String,
}

/// Durable marker for a preprocessing run that has not finished
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessJob {
    pub video_id: i64,
    pub file: String,
    pub started_at: DateTime<Utc>,
}

/// Label names offered to the editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    pub video: Vec<Label>,
    pub clip: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

impl LabelSet {
    pub fn from_names(video: &[String], clip: &[String]) -> Self {
        let labels = |names: &[String]| {
            names
                .iter()
                .map(|name| Label { name: name.clone() })
                .collect()
        };
        Self {
            video: labels(video),
            clip: labels(clip),
        }
    }
}

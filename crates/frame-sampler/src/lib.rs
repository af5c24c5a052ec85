//! Video preprocessing and frame sampling.
//!
//! This crate owns the video lifecycle behind the annotation workbench:
//! - Sampling interval selection from a duration-range table
//! - Probing and frame extraction through an external transcoder
//! - Reconciling source files with stored videos
//! - The preprocessing state machine and its startup recovery
//! - On-demand extra frames around a coarse sample
//! - Label files

pub mod catalog;
pub mod error;
pub mod extras;
pub mod ffmpeg;
pub mod frames;
pub mod labels;
pub mod preprocess;
pub mod sample_rate;

#[cfg(test)]
mod testing;

pub use catalog::VideoCatalog;
pub use error::{Error, ExtractionError, ProbeError, Result};
pub use extras::ExtraFrameCache;
pub use ffmpeg::{Ffmpeg, Transcoder, VideoMetadata};
pub use labels::{ConsolidationReport, LabelWriter};
pub use preprocess::{PreprocessRun, Preprocessor, RecoveryReport};
pub use sample_rate::{select_interval, SampleRateTable};

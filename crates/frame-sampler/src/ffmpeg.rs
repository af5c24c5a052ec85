//! FFmpeg/FFprobe invocation.
//!
//! The pipeline talks to the external transcoder through the [`Transcoder`]
//! trait so the state machine can be driven by a fake in tests. [`Ffmpeg`]
//! is the production implementation and shells out to `ffprobe`/`ffmpeg`.

use crate::error::{ExtractionError, ProbeError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Metadata read from a video file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub duration: f64,
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
}

/// External transcoder used for probing and frame extraction.
///
/// Both extraction calls write `<out_dir>/<n>.jpg` files.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Read container duration and first-video-stream properties
    async fn probe(&self, video: &Path) -> Result<VideoMetadata, ProbeError>;

    /// Extract one frame every `1 / fps` seconds across the whole video,
    /// numbered from 1
    async fn extract_samples(
        &self,
        video: &Path,
        out_dir: &Path,
        fps: f64,
    ) -> Result<(), ExtractionError>;

    /// Extract every frame in `[start, start + duration)` at the native
    /// rate, numbered from 0
    async fn extract_window(
        &self,
        video: &Path,
        out_dir: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), ExtractionError>;
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: Option<FfprobeFormat>,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

impl FfprobeOutput {
    /// Reduce probe output to the fields the catalog stores.
    ///
    /// Only the first video stream is consulted; without one, frame rate and
    /// dimensions are zero while the duration still comes from the container.
    pub fn into_metadata(self) -> Result<VideoMetadata, ProbeError> {
        let duration = self
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .ok_or(ProbeError::MissingDuration)?;

        let metadata = match self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
        {
            Some(stream) => VideoMetadata {
                duration,
                framerate: stream
                    .r_frame_rate
                    .as_deref()
                    .map(parse_frame_rate)
                    .unwrap_or(0.0),
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
            },
            None => VideoMetadata {
                duration,
                framerate: 0.0,
                width: 0,
                height: 0,
            },
        };

        Ok(metadata)
    }
}

/// Parse an ffprobe rational like `"30000/1001"` into frames per second
pub fn parse_frame_rate(rate: &str) -> f64 {
    let parsed = match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().unwrap_or(0.0);
            let den = den.trim().parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.trim().parse::<f64>().unwrap_or(0.0),
    };

    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Production transcoder
// ---------------------------------------------------------------------------

/// Transcoder backed by the `ffprobe` and `ffmpeg` binaries
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    /// Bound on a single ffprobe or ffmpeg run; `None` waits forever
    timeout: Option<Duration>,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: None,
        }
    }
}

impl Ffmpeg {
    /// Create a transcoder using the binaries on `PATH`.
    ///
    /// `timeout_secs == 0` leaves probing and extraction unbounded.
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            ..Self::default()
        }
    }

    /// Use explicit binary locations
    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// Run a command to completion, killing the child once the timeout
    /// elapses. `Err` carries the timeout in seconds.
    async fn bounded_output(&self, mut cmd: Command) -> Result<std::io::Result<Output>, u64> {
        cmd.kill_on_drop(true);
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        debug!(command = ?cmd.as_std(), "Running transcoder");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    warn!(program = %program, seconds = limit.as_secs(), "Transcoder timed out, killing it");
                    limit.as_secs()
                }),
            None => Ok(cmd.output().await),
        }
    }

    async fn run_extraction(&self, cmd: Command) -> Result<(), ExtractionError> {
        let output = self
            .bounded_output(cmd)
            .await
            .map_err(|seconds| ExtractionError::TimedOut { seconds })?
            .map_err(ExtractionError::Spawn)?;

        check_status(&output).map_err(|(exit_code, stderr)| ExtractionError::ExecutionFailed {
            exit_code,
            stderr,
        })
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn probe(&self, video: &Path) -> Result<VideoMetadata, ProbeError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(video);

        let output = self
            .bounded_output(cmd)
            .await
            .map_err(|seconds| ProbeError::TimedOut { seconds })?
            .map_err(ProbeError::Spawn)?;

        check_status(&output)
            .map_err(|(exit_code, stderr)| ProbeError::ExecutionFailed { exit_code, stderr })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| ProbeError::Parse(format!("{e}: {stdout}")))?
            .into_metadata()
    }

    async fn extract_samples(
        &self,
        video: &Path,
        out_dir: &Path,
        fps: f64,
    ) -> Result<(), ExtractionError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(video)
            .args(["-f", "image2", "-vf", &format!("fps={fps}"), "-y"])
            .arg(out_dir.join("%d.jpg"));

        self.run_extraction(cmd).await
    }

    async fn extract_window(
        &self,
        video: &Path,
        out_dir: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), ExtractionError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(video)
            .args([
                "-ss",
                &format!("{start:.3}"),
                "-t",
                &format!("{duration:.3}"),
                "-f",
                "image2",
                "-start_number",
                "0",
                "-y",
            ])
            .arg(out_dir.join("%d.jpg"));

        self.run_extraction(cmd).await
    }
}

fn check_status(output: &Output) -> Result<(), (Option<i32>, String)> {
    if output.status.success() {
        Ok(())
    } else {
        Err((
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

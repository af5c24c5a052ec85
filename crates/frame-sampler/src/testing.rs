//! Test doubles shared by the unit tests in this crate.

use crate::catalog::VideoCatalog;
use crate::error::{ExtractionError, ProbeError};
use crate::ffmpeg::{Transcoder, VideoMetadata};
use crate::sample_rate::SampleRateTable;
use async_trait::async_trait;
use shared::{Database, SharedStore, SpfRule, VideoState, VideoStore, WorkspacePaths};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Transcoder that writes empty numbered images instead of decoding video
#[derive(Default)]
pub struct FakeTranscoder {
    metadata: Mutex<HashMap<String, VideoMetadata>>,
    pub sample_count: AtomicUsize,
    pub window_count: AtomicUsize,
    pub fail_samples: AtomicBool,
    pub fail_window: AtomicBool,
    pub sample_calls: AtomicUsize,
    pub window_calls: AtomicUsize,
    /// When set, coarse extraction waits for a notification before writing
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeTranscoder {
    pub fn new(sample_count: usize, window_count: usize) -> Self {
        Self {
            sample_count: AtomicUsize::new(sample_count),
            window_count: AtomicUsize::new(window_count),
            ..Self::default()
        }
    }

    pub fn set_metadata(&self, file: &str, duration: f64) {
        self.metadata.lock().unwrap().insert(
            file.to_string(),
            VideoMetadata {
                duration,
                framerate: 25.0,
                width: 640,
                height: 360,
            },
        );
    }

    pub fn hold_extraction(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }
}

/// Executable that never finishes, standing in for a hung ffmpeg or ffprobe
#[cfg(unix)]
pub fn stuck_binary(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("stuck-transcoder");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_images(dir: &Path, numbers: impl Iterator<Item = usize>) {
    for n in numbers {
        std::fs::write(dir.join(format!("{n}.jpg")), b"jpeg").unwrap();
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe(&self, video: &Path) -> Result<VideoMetadata, ProbeError> {
        let name = video.file_name().unwrap().to_string_lossy().into_owned();
        self.metadata
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(ProbeError::ExecutionFailed {
                exit_code: Some(1),
                stderr: format!("{name}: Invalid data found when processing input"),
            })
    }

    async fn extract_samples(
        &self,
        _video: &Path,
        out_dir: &Path,
        _fps: f64,
    ) -> Result<(), ExtractionError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_samples.load(Ordering::SeqCst) {
            return Err(ExtractionError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "decode error".to_string(),
            });
        }
        write_images(out_dir, 1..=self.sample_count.load(Ordering::SeqCst));
        Ok(())
    }

    async fn extract_window(
        &self,
        _video: &Path,
        out_dir: &Path,
        _start: f64,
        _duration: f64,
    ) -> Result<(), ExtractionError> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_window.load(Ordering::SeqCst) {
            return Err(ExtractionError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "seek error".to_string(),
            });
        }
        write_images(out_dir, 0..self.window_count.load(Ordering::SeqCst));
        Ok(())
    }
}

/// Temporary workspace with a catalog over an in-memory database
pub struct Fixture {
    pub dir: TempDir,
    pub paths: WorkspacePaths,
    pub store: SharedStore,
    pub transcoder: Arc<FakeTranscoder>,
    pub catalog: VideoCatalog,
}

impl Fixture {
    /// Sampling: videos up to 10 minutes use 2 seconds per frame, longer ones 5
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let paths = WorkspacePaths::new(dir.path().join("videos"), dir.path().join("output"));
        paths.create_dirs().unwrap();

        let store = SharedStore::new(VideoStore::new(Database::open_in_memory().unwrap()));
        let transcoder = Arc::new(FakeTranscoder::new(5, 4));
        let sampling =
            SampleRateTable::from_rules(&[SpfRule::new("0~10", 2), SpfRule::new("10~", 5)]);
        let catalog = VideoCatalog::new(
            store.clone(),
            paths.clone(),
            sampling,
            transcoder.clone(),
            vec!["mp4".to_string(), "webm".to_string(), "ogg".to_string()],
        );

        Self {
            dir,
            paths,
            store,
            transcoder,
            catalog,
        }
    }

    /// Drop a readable video into the source directory
    pub fn add_video(&self, file: &str, duration: f64) {
        std::fs::write(self.paths.video_file(file), b"video").unwrap();
        self.transcoder.set_metadata(file, duration);
    }

    /// Add a video and register it, returning its id
    pub async fn registered(&self, file: &str, duration: f64) -> i64 {
        self.add_video(file, duration);
        self.catalog
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|v| v.file == file)
            .unwrap()
            .id
    }

    pub fn set_state(&self, id: i64, state: VideoState) {
        self.store.with(|s| s.update_state(id, state)).unwrap();
    }

    pub fn stored_state(&self, id: i64) -> VideoState {
        self.store
            .with(|s| s.find_by_id(id))
            .unwrap()
            .unwrap()
            .state
    }
}

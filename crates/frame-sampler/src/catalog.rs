//! Video catalog.
//!
//! Reconciles the video files present in the source directory with the
//! persisted rows, registering newly seen files via the transcoder probe,
//! and serves single-video reads with frames derived from disk.

use crate::error::{Error, Result};
use crate::ffmpeg::Transcoder;
use crate::frames::{coarse_frames, list_images};
use crate::sample_rate::SampleRateTable;
use shared::{NewVideo, SharedStore, Video, VideoState, WorkspacePaths};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catalog of videos on disk and in the store
#[derive(Clone)]
pub struct VideoCatalog {
    store: SharedStore,
    paths: WorkspacePaths,
    sampling: Arc<SampleRateTable>,
    transcoder: Arc<dyn Transcoder>,
    extensions: Arc<Vec<String>>,
}

impl VideoCatalog {
    pub fn new(
        store: SharedStore,
        paths: WorkspacePaths,
        sampling: SampleRateTable,
        transcoder: Arc<dyn Transcoder>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            store,
            paths,
            sampling: Arc::new(sampling),
            transcoder,
            extensions: Arc::new(extensions),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Sampling interval for a video, in seconds per coarse frame
    pub fn spf(&self, video: &Video) -> u32 {
        self.sampling.select(video.duration)
    }

    /// List every video currently on disk, registering unknown files.
    ///
    /// Files the transcoder cannot read are logged and left out; the rest of
    /// the listing is unaffected. Rows whose file has disappeared are
    /// omitted. The result is ordered by id.
    pub async fn list_all(&self) -> Result<Vec<Video>> {
        let files = self.video_files().await?;
        let mut known: HashMap<String, Video> = self
            .store
            .with(|s| s.find_all())?
            .into_iter()
            .map(|video| (video.file.clone(), video))
            .collect();

        let mut videos = Vec::with_capacity(files.len());
        let mut unreadable = 0usize;

        for file in files {
            if let Some(video) = known.remove(&file) {
                videos.push(video);
                continue;
            }

            match self.register(&file).await {
                Ok(video) => videos.push(video),
                Err(e) => {
                    unreadable += 1;
                    warn!(file = %file, error = %e, "Skipping video that could not be registered");
                }
            }
        }

        videos.sort_by_key(|video| video.id);
        debug!(count = videos.len(), unreadable, "Listed videos");

        Ok(videos)
    }

    /// Read one video.
    ///
    /// A video whose source file is gone reads as [`VideoState::Removed`];
    /// the stored row is left alone. With `details`, coarse frames are
    /// listed from disk when the state says they exist. If they cannot be
    /// listed the video reads as [`VideoState::New`] with no frames, again
    /// without touching storage.
    pub async fn find_one(&self, id: i64, details: bool) -> Result<Video> {
        let mut video = self.find_stored(id)?;

        let source = self.paths.video_file(&video.file);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            debug!(video_id = id, file = %video.file, "Source file missing, reporting removed");
            video.state = VideoState::Removed;
            return Ok(video);
        }

        if details {
            let mut frames = Vec::new();
            if video.state.has_frames() {
                let dir = self.paths.frames_dir(&video.file);
                match list_images(&dir).await {
                    Ok(images) => frames = coarse_frames(&images, self.spf(&video)),
                    Err(e) => {
                        warn!(
                            video_id = id,
                            dir = %dir.display(),
                            error = %e,
                            "Frames missing for preprocessed video, reporting as new"
                        );
                        video.state = VideoState::New;
                    }
                }
            }
            video.frames = Some(frames);
        }

        Ok(video)
    }

    /// Read the stored row for a video without consulting the filesystem
    pub fn find_stored(&self, id: i64) -> Result<Video> {
        self.store
            .with(|s| s.find_by_id(id))?
            .ok_or(Error::NotFound(id))
    }

    /// Read the stored row and check the caller refers to the same file
    pub fn find_matching(&self, id: i64, file: &str) -> Result<Video> {
        let video = self.find_stored(id)?;
        if video.file != file {
            return Err(Error::Mismatch {
                id,
                stored: video.file,
                requested: file.to_string(),
            });
        }
        Ok(video)
    }

    /// File names in the source directory with a known video extension, sorted
    async fn video_files(&self) -> Result<Vec<String>> {
        let dir = self.paths.source_dir();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(Error::fs(dir))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::fs(dir))? {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|known| known == ext));
            if known {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Probe a newly seen file and insert it in state `New`
    async fn register(&self, file: &str) -> Result<Video> {
        let metadata = self.transcoder.probe(&self.paths.video_file(file)).await?;
        let new = NewVideo {
            file: file.to_string(),
            duration: metadata.duration,
            framerate: metadata.framerate,
            width: metadata.width,
            height: metadata.height,
        };

        // Another listing may have registered the file while we were probing
        let video = self.store.with(|s| {
            if let Some(existing) = s.find_by_file(file)? {
                return Ok(existing);
            }
            let id = s.insert(&new)?;
            Ok(Video {
                id,
                file: new.file.clone(),
                duration: new.duration,
                framerate: new.framerate,
                width: new.width,
                height: new.height,
                state: VideoState::New,
                frames: None,
            })
        })?;

        info!(video_id = video.id, file = %file, "Registered video");
        Ok(video)
    }
}

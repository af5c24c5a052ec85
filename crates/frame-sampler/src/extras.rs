//! Fine-grained frames around one coarse sample.
//!
//! When an operator zooms into coarse frame `k`, every frame of the window
//! `[spf * (k - 1), spf * k)` is extracted into `<output>/<file>/<k>/` and the
//! listing is kept in memory. Entries are grouped per video in an LRU so a
//! long-running server holds at most a bounded number of videos.

use crate::catalog::VideoCatalog;
use crate::error::{Error, Result};
use crate::frames::{extra_frames, list_images, window_start};
use lru_time_cache::LruCache;
use shared::{ExtraFrame, Video, VideoState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type VideoExtras = HashMap<u32, Vec<ExtraFrame>>;

/// Per-video, per-coarse-index cache of extra frame listings
#[derive(Clone)]
pub struct ExtraFrameCache {
    catalog: VideoCatalog,
    entries: Arc<Mutex<LruCache<i64, VideoExtras>>>,
}

impl ExtraFrameCache {
    /// Create a cache holding the extras of at most `capacity` videos
    pub fn new(catalog: VideoCatalog, capacity: usize) -> Self {
        Self {
            catalog,
            entries: Arc::new(Mutex::new(LruCache::with_capacity(capacity.max(1)))),
        }
    }

    /// Extra frames for coarse index `index` of a video.
    ///
    /// A cached listing is returned as is, without looking at the disk.
    /// Otherwise the window is extracted if its directory does not exist
    /// yet, then listed and cached. Extraction failures leave the video's
    /// state untouched.
    pub async fn extras(&self, video_id: i64, index: u32) -> Result<Vec<ExtraFrame>> {
        if index == 0 {
            return Err(Error::InvalidFrameIndex(index));
        }

        if let Some(frames) = self.cached(video_id, index)? {
            debug!(video_id, index, "Extra frames served from cache");
            return Ok(frames);
        }

        let video = self.catalog.find_stored(video_id)?;
        ensure_settled(&video)?;
        let spf = self.catalog.spf(&video);
        let paths = self.catalog.paths();
        let dir = paths.extras_dir(&video.file, index);

        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(Error::fs(&dir))?;

            let start = window_start(index, spf);
            info!(video_id, index, start, spf, "Extracting extra frames");

            let extracted = self
                .catalog
                .transcoder()
                .extract_window(&paths.video_file(&video.file), &dir, start, f64::from(spf))
                .await;

            if let Err(e) = extracted {
                // Leave no partial directory behind so a retry extracts again
                if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                    warn!(dir = %dir.display(), error = %cleanup, "Failed to remove partial extra frames");
                }
                return Err(e.into());
            }
        }

        let images = list_images(&dir).await.map_err(Error::fs(&dir))?;

        // A run started during extraction deletes this directory
        ensure_settled(&self.catalog.find_stored(video_id)?)?;

        let frames = extra_frames(index, spf, &images);
        self.insert(video_id, index, frames.clone())?;

        Ok(frames)
    }

    /// Drop every cached listing of a video
    pub fn evict(&self, video_id: i64) -> Result<()> {
        if self.lock()?.remove(&video_id).is_some() {
            debug!(video_id, "Evicted extra frames");
        }
        Ok(())
    }

    /// Number of videos with cached listings
    pub fn cached_videos(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn cached(&self, video_id: i64, index: u32) -> Result<Option<Vec<ExtraFrame>>> {
        Ok(self
            .lock()?
            .get(&video_id)
            .and_then(|extras| extras.get(&index))
            .cloned())
    }

    fn insert(&self, video_id: i64, index: u32, frames: Vec<ExtraFrame>) -> Result<()> {
        let mut entries = self.lock()?;
        if let Some(extras) = entries.get_mut(&video_id) {
            extras.insert(index, frames);
        } else {
            entries.insert(video_id, HashMap::from([(index, frames)]));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<i64, VideoExtras>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store(anyhow::anyhow!("Extra frame cache lock poisoned")))
    }
}

fn ensure_settled(video: &Video) -> Result<()> {
    if video.state == VideoState::PreProcessing {
        debug!(video_id = video.id, "Extra frames requested during preprocessing");
        return Err(Error::NotPreprocessed {
            id: video.id,
            state: video.state,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_extracts_window_and_caches() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.registered("a.mp4", 300.0).await;
        let cache = ExtraFrameCache::new(fx.catalog.clone(), 8);

        let frames = cache.extras(id, 3).await?;
        assert_eq!(frames.len(), 4);
        // spf = 2, window [4, 6) split across 4 frames
        let timestamps: Vec<_> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![4.0, 4.5, 5.0, 5.5]);
        assert_eq!(frames[0].image, "3/0.jpg");
        assert!(fx.paths.extras_dir("a.mp4", 3).is_dir());

        // Cache hit skips the disk even if the directory was cleared
        std::fs::remove_dir_all(fx.paths.extras_dir("a.mp4", 3))?;
        let again = cache.extras(id, 3).await?;
        assert_eq!(again, frames);
        assert_eq!(fx.transcoder.window_calls.load(Ordering::SeqCst), 1);
        assert!(!fx.paths.extras_dir("a.mp4", 3).exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_existing_directory_is_listed_not_extracted() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.registered("a.mp4", 300.0).await;
        let dir = fx.paths.extras_dir("a.mp4", 1);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("0.jpg"), b"")?;
        std::fs::write(dir.join("1.jpg"), b"")?;

        let cache = ExtraFrameCache::new(fx.catalog.clone(), 8);
        let frames = cache.extras(id, 1).await?;
        assert_eq!(
            frames.iter().map(|f| f.timestamp).collect::<Vec<_>>(),
            vec![0.0, 1.0]
        );
        assert_eq!(fx.transcoder.window_calls.load(Ordering::SeqCst), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_state_and_cleans_up() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.registered("a.mp4", 300.0).await;
        fx.set_state(id, VideoState::PreProcessDone);
        fx.transcoder.fail_window.store(true, Ordering::SeqCst);

        let cache = ExtraFrameCache::new(fx.catalog.clone(), 8);
        let err = cache.extras(id, 2).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(fx.stored_state(id), VideoState::PreProcessDone);
        assert!(!fx.paths.extras_dir("a.mp4", 2).exists());
        assert_eq!(cache.cached_videos()?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_video_being_preprocessed() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.registered("a.mp4", 300.0).await;
        fx.set_state(id, VideoState::PreProcessing);
        let cache = ExtraFrameCache::new(fx.catalog.clone(), 8);

        let err = cache.extras(id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotPreprocessed {
                state: VideoState::PreProcessing,
                ..
            }
        ));
        assert_eq!(fx.transcoder.window_calls.load(Ordering::SeqCst), 0);
        assert!(!fx.paths.extras_dir("a.mp4", 1).exists());
        assert_eq!(cache.cached_videos()?, 0);

        // Served again once the run has ended, whatever its outcome
        fx.set_state(id, VideoState::PreProcessFail);
        assert_eq!(cache.extras(id, 1).await?.len(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_index_zero_and_unknown_video() {
        let fx = Fixture::new();
        let cache = ExtraFrameCache::new(fx.catalog.clone(), 8);

        assert!(matches!(
            cache.extras(1, 0).await.unwrap_err(),
            Error::InvalidFrameIndex(0)
        ));
        assert!(matches!(
            cache.extras(99, 1).await.unwrap_err(),
            Error::NotFound(99)
        ));
    }

    #[tokio::test]
    async fn test_capacity_and_eviction() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let a = fx.registered("a.mp4", 30.0).await;
        let b = fx.registered("b.mp4", 30.0).await;
        let cache = ExtraFrameCache::new(fx.catalog.clone(), 1);

        cache.extras(a, 1).await?;
        cache.extras(a, 2).await?;
        assert_eq!(cache.cached_videos()?, 1);
        cache.extras(b, 1).await?;
        assert_eq!(cache.cached_videos()?, 1);

        cache.evict(b)?;
        assert_eq!(cache.cached_videos()?, 0);

        Ok(())
    }
}

//! Preprocessing state machine.
//!
//! A `preprocess` trigger persists `PreProcessing` before returning and hands
//! the extraction to a background task, which writes `PreProcessDone` or
//! `PreProcessFail` when it ends. Each run is recorded in the job ledger so
//! a restart can tell interrupted runs apart, and at most one run per video
//! is in flight at a time.

use crate::catalog::VideoCatalog;
use crate::error::{Error, Result};
use crate::extras::ExtraFrameCache;
use crate::frames::list_images;
use shared::{Video, VideoState};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Drives coarse extraction for videos
#[derive(Clone)]
pub struct Preprocessor {
    catalog: VideoCatalog,
    extras: ExtraFrameCache,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

/// Handle to a background preprocessing run
#[derive(Debug)]
pub struct PreprocessRun {
    pub video_id: i64,
    handle: JoinHandle<VideoState>,
}

impl PreprocessRun {
    /// Wait for the run and return the state it persisted
    pub async fn finished(self) -> VideoState {
        match self.handle.await {
            Ok(state) => state,
            Err(e) => {
                error!(video_id = self.video_id, error = %e, "Preprocessing task aborted");
                VideoState::PreProcessFail
            }
        }
    }
}

/// Outcome of the startup sweep
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Videos found in `PreProcessing`, now `PreProcessFail`
    pub interrupted: Vec<i64>,
    /// Runs restarted for interrupted videos
    pub resumed: Vec<PreprocessRun>,
}

/// Removes a video from the in-flight set when its run ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<i64>>>,
    video_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.video_id);
    }
}

impl Preprocessor {
    pub fn new(catalog: VideoCatalog, extras: ExtraFrameCache) -> Self {
        Self {
            catalog,
            extras,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a run for this video is in flight
    pub fn is_running(&self, video_id: i64) -> bool {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.contains(&video_id))
            .unwrap_or(false)
    }

    /// Start preprocessing a video.
    ///
    /// Returns once `PreProcessing` is persisted; extraction continues on a
    /// spawned task. A stale file name is rejected with [`Error::Mismatch`]
    /// and a video with a run in flight with [`Error::Busy`], both before
    /// any state is written. Must be called from within a tokio runtime.
    pub fn trigger(&self, video_id: i64, file: &str) -> Result<PreprocessRun> {
        let video = self.catalog.find_matching(video_id, file)?;
        let guard = self.claim(video_id)?;

        self.catalog.store().with(|s| {
            s.update_state(video_id, VideoState::PreProcessing)?;
            s.begin_job(video_id, &video.file)
        })?;

        // Cached extras belong to the frames about to be replaced. Extras are
        // refused from here on, so nothing refills the cache before the run
        // deletes the directories.
        self.extras.evict(video_id)?;

        info!(video_id, file = %video.file, previous = %video.state, "Preprocessing started");

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            this.run(video).await
        });

        Ok(PreprocessRun { video_id, handle })
    }

    /// Reconcile runs interrupted by a restart.
    ///
    /// Every video still in `PreProcessing` has no live run behind it and is
    /// moved to `PreProcessFail`, and the job ledger is cleared. With
    /// `resume_interrupted`, videos that had a ledger entry are triggered
    /// again. Must be called from within a tokio runtime.
    pub fn recover(&self, resume_interrupted: bool) -> Result<RecoveryReport> {
        let (jobs, interrupted) = self.catalog.store().with(|s| {
            let jobs = s.unfinished_jobs()?;
            let interrupted =
                s.transition_all(VideoState::PreProcessing, VideoState::PreProcessFail)?;
            for job in &jobs {
                s.finish_job(job.video_id)?;
            }
            Ok((jobs, interrupted))
        })?;

        if !jobs.is_empty() {
            debug!(count = jobs.len(), "Cleared preprocess job ledger");
        }

        let mut report = RecoveryReport {
            interrupted,
            resumed: Vec::new(),
        };

        if resume_interrupted {
            for job in jobs {
                if !report.interrupted.contains(&job.video_id) {
                    continue;
                }
                match self.trigger(job.video_id, &job.file) {
                    Ok(run) => {
                        info!(video_id = job.video_id, started_at = %job.started_at, "Resumed interrupted preprocessing");
                        report.resumed.push(run);
                    }
                    Err(e) => {
                        warn!(video_id = job.video_id, error = %e, "Could not resume interrupted preprocessing");
                    }
                }
            }
        }

        if !report.interrupted.is_empty() {
            warn!(
                interrupted = report.interrupted.len(),
                resumed = report.resumed.len(),
                "Recovered interrupted preprocessing"
            );
        }

        Ok(report)
    }

    fn claim(&self, video_id: i64) -> Result<InFlightGuard> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| Error::Store(anyhow::anyhow!("In-flight set lock poisoned")))?;

        if !in_flight.insert(video_id) {
            debug!(video_id, "Preprocessing already in flight");
            return Err(Error::Busy(video_id));
        }

        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            video_id,
        })
    }

    /// Background half of a run: extract, then persist the terminal state
    async fn run(self, video: Video) -> VideoState {
        let state = match self.extract(&video).await {
            Ok(frames) => {
                info!(video_id = video.id, frames, "Preprocessing done");
                VideoState::PreProcessDone
            }
            Err(e) => {
                error!(video_id = video.id, file = %video.file, error = %e, "Preprocessing failed");
                VideoState::PreProcessFail
            }
        };

        let persisted = self.catalog.store().with(|s| {
            s.update_state(video.id, state)?;
            s.finish_job(video.id)
        });
        if let Err(e) = persisted {
            // The ledger entry stays, so the next startup sweep fails the video
            error!(video_id = video.id, state = %state, error = %e, "Failed to persist preprocessing result");
        }

        state
    }

    /// Replace the coarse frame directory and fill it, returning the frame count
    async fn extract(&self, video: &Video) -> Result<usize> {
        let paths = self.catalog.paths();

        let root = paths.output_dir();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(Error::fs(root))?;

        let dir = paths.frames_dir(&video.file);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            debug!(video_id = video.id, dir = %dir.display(), "Removing previous frames");
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(Error::fs(&dir))?;
            self.extras.evict(video.id)?;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(Error::fs(&dir))?;

        let spf = self.catalog.spf(video);
        let fps = 1.0 / f64::from(spf);
        info!(video_id = video.id, duration = video.duration, spf, "Extracting coarse frames");

        self.catalog
            .transcoder()
            .extract_samples(&paths.video_file(&video.file), &dir, fps)
            .await?;

        let images = list_images(&dir).await.map_err(Error::fs(&dir))?;
        Ok(images.len())
    }
}

//! Video persistence for the preprocessing pipeline.
//!
//! This module provides a high-level API over the `videos` table and the
//! `preprocess_jobs` ledger. Each statement is atomic on its own; callers
//! composing read-then-write sequences get no transaction around them.

use crate::models::*;
use crate::Database;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const VIDEO_COLUMNS: &str = "id, file, duration, framerate, width, height, state";

/// Video store
pub struct VideoStore {
    db: Database,
}

impl VideoStore {
    /// Create a new video store with the given database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a video by id
    pub fn find_by_id(&self, id: i64) -> Result<Option<Video>> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
                params![id],
                row_to_video,
            )
            .optional()
            .with_context(|| format!("Failed to query video {}", id))
    }

    /// Get a video by its file name
    pub fn find_by_file(&self, file: &str) -> Result<Option<Video>> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {} FROM videos WHERE file = ?1", VIDEO_COLUMNS),
                params![file],
                row_to_video,
            )
            .optional()
            .with_context(|| format!("Failed to query video {}", file))
    }

    /// Get all videos ordered by id
    pub fn find_all(&self) -> Result<Vec<Video>> {
        let conn = self.db.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos ORDER BY id ASC",
            VIDEO_COLUMNS
        ))?;

        let videos = stmt
            .query_map([], row_to_video)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(videos)
    }

    /// Insert a newly discovered video in state `New` and return its id
    pub fn insert(&mut self, video: &NewVideo) -> Result<i64> {
        let conn = self.db.conn_mut();

        conn.execute(
            "INSERT INTO videos (file, duration, framerate, width, height, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                video.file,
                video.duration,
                video.framerate,
                video.width,
                video.height,
                VideoState::New.code(),
            ],
        )
        .with_context(|| format!("Failed to insert video {}", video.file))?;

        let id = conn.last_insert_rowid();
        info!(video_id = id, file = %video.file, duration = video.duration, "Created new video entry");

        Ok(id)
    }

    /// Set the state of one video, returning the number of changed rows
    pub fn update_state(&mut self, id: i64, state: VideoState) -> Result<usize> {
        ensure_persistable(state)?;

        let changes = self
            .db
            .conn_mut()
            .execute(
                "UPDATE videos SET state = ?1 WHERE id = ?2",
                params![state.code(), id],
            )
            .with_context(|| format!("Failed to update state of video {}", id))?;

        debug!(video_id = id, state = %state, changes, "Updated video state");

        Ok(changes)
    }

    /// Set the state of the video with the given file name
    pub fn update_state_by_file(&mut self, file: &str, state: VideoState) -> Result<usize> {
        ensure_persistable(state)?;

        let changes = self
            .db
            .conn_mut()
            .execute(
                "UPDATE videos SET state = ?1 WHERE file = ?2",
                params![state.code(), file],
            )
            .with_context(|| format!("Failed to update state of video {}", file))?;

        debug!(file = %file, state = %state, changes, "Updated video state");

        Ok(changes)
    }

    /// Move every video in `from` to `to`, returning the ids that changed
    pub fn transition_all(&mut self, from: VideoState, to: VideoState) -> Result<Vec<i64>> {
        ensure_persistable(to)?;

        let tx = self.db.conn_mut().transaction()?;

        let ids = {
            let mut stmt = tx.prepare("SELECT id FROM videos WHERE state = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map(params![from.code()], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        tx.execute(
            "UPDATE videos SET state = ?1 WHERE state = ?2",
            params![to.code(), from.code()],
        )?;
        tx.commit()?;

        if !ids.is_empty() {
            info!(count = ids.len(), from = %from, to = %to, "Transitioned videos");
        }

        Ok(ids)
    }

    /// Record that a preprocessing run has started for a video
    pub fn begin_job(&mut self, video_id: i64, file: &str) -> Result<()> {
        self.db
            .conn_mut()
            .execute(
                "INSERT OR REPLACE INTO preprocess_jobs (video_id, file, started_at)
                 VALUES (?1, ?2, ?3)",
                params![video_id, file, Utc::now()],
            )
            .with_context(|| format!("Failed to record preprocess job for video {}", video_id))?;

        debug!(video_id, file = %file, "Recorded preprocess job");
        Ok(())
    }

    /// Clear the in-progress marker for a video
    pub fn finish_job(&mut self, video_id: i64) -> Result<()> {
        self.db
            .conn_mut()
            .execute(
                "DELETE FROM preprocess_jobs WHERE video_id = ?1",
                params![video_id],
            )
            .with_context(|| format!("Failed to clear preprocess job for video {}", video_id))?;

        debug!(video_id, "Cleared preprocess job");
        Ok(())
    }

    /// List runs that started but never wrote a terminal state
    pub fn unfinished_jobs(&self) -> Result<Vec<PreprocessJob>> {
        let conn = self.db.conn();

        let mut stmt = conn.prepare(
            "SELECT video_id, file, started_at FROM preprocess_jobs ORDER BY video_id",
        )?;

        let jobs = stmt
            .query_map([], |row| {
                Ok(PreprocessJob {
                    video_id: row.get(0)?,
                    file: row.get(1)?,
                    started_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    /// Count videos per state
    pub fn count_by_state(&self) -> Result<Vec<(VideoState, usize)>> {
        let conn = self.db.conn();

        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM videos GROUP BY state")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = Vec::new();
        for row in rows {
            let (code, count) = row?;
            counts.push((VideoState::try_from(code)?, count as usize));
        }

        Ok(counts)
    }
}

fn ensure_persistable(state: VideoState) -> Result<()> {
    if !state.is_persistable() {
        warn!(state = %state, "Refusing to persist synthesized state");
        anyhow::bail!("State {} is never written to storage", state);
    }
    Ok(())
}

/// Helper: Convert a database row to a Video
fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<Video> {
    let code: u8 = row.get(6)?;
    let state = VideoState::try_from(code).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Integer, e.into())
    })?;

    Ok(Video {
        id: row.get(0)?,
        file: row.get(1)?,
        duration: row.get(2)?,
        framerate: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        state,
        frames: None,
    })
}

/// Video store shared between request handlers and background workers
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<VideoStore>>,
}

impl SharedStore {
    pub fn new(store: VideoStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store.
    ///
    /// The lock is held only for the duration of `f`, so callers must not
    /// await inside it.
    pub fn with<R>(&self, f: impl FnOnce(&mut VideoStore) -> Result<R>) -> Result<R> {
        let mut store = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Video store lock poisoned"))?;
        f(&mut store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VideoStore {
        VideoStore::new(Database::open_in_memory().unwrap())
    }

    fn new_video(file: &str) -> NewVideo {
        NewVideo {
            file: file.to_string(),
            duration: 90.0,
            framerate: 25.0,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn test_insert_and_find() -> Result<()> {
        let mut store = store();
        let id = store.insert(&new_video("a.mp4"))?;

        let video = store.find_by_id(id)?.expect("video exists");
        assert_eq!(video.file, "a.mp4");
        assert_eq!(video.state, VideoState::New);
        assert_eq!(video.width, 1280);

        assert_eq!(store.find_by_file("a.mp4")?.map(|v| v.id), Some(id));
        assert!(store.find_by_id(id + 1)?.is_none());

        Ok(())
    }

    #[test]
    fn test_file_is_unique() -> Result<()> {
        let mut store = store();
        store.insert(&new_video("a.mp4"))?;
        assert!(store.insert(&new_video("a.mp4")).is_err());
        Ok(())
    }

    #[test]
    fn test_ids_are_stable_and_ordered() -> Result<()> {
        let mut store = store();
        let first = store.insert(&new_video("b.mp4"))?;
        let second = store.insert(&new_video("a.mp4"))?;
        assert!(second > first);

        let ids: Vec<_> = store.find_all()?.into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![first, second]);
        Ok(())
    }

    #[test]
    fn test_update_state_rejects_removed() -> Result<()> {
        let mut store = store();
        let id = store.insert(&new_video("a.mp4"))?;

        assert_eq!(store.update_state(id, VideoState::PreProcessDone)?, 1);
        assert!(store.update_state(id, VideoState::Removed).is_err());
        assert_eq!(
            store.find_by_id(id)?.map(|v| v.state),
            Some(VideoState::PreProcessDone)
        );
        assert_eq!(store.update_state(id + 10, VideoState::New)?, 0);
        Ok(())
    }

    #[test]
    fn test_transition_all() -> Result<()> {
        let mut store = store();
        let a = store.insert(&new_video("a.mp4"))?;
        let b = store.insert(&new_video("b.mp4"))?;
        store.update_state(a, VideoState::PreProcessing)?;

        let moved = store.transition_all(VideoState::PreProcessing, VideoState::PreProcessFail)?;
        assert_eq!(moved, vec![a]);
        assert_eq!(store.find_by_id(a)?.unwrap().state, VideoState::PreProcessFail);
        assert_eq!(store.find_by_id(b)?.unwrap().state, VideoState::New);
        Ok(())
    }

    #[test]
    fn test_job_ledger() -> Result<()> {
        let mut store = store();
        let id = store.insert(&new_video("a.mp4"))?;

        store.begin_job(id, "a.mp4")?;
        store.begin_job(id, "a.mp4")?;
        let jobs = store.unfinished_jobs()?;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].video_id, id);

        store.finish_job(id)?;
        assert!(store.unfinished_jobs()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_count_by_state() -> Result<()> {
        let mut store = store();
        let a = store.insert(&new_video("a.mp4"))?;
        store.insert(&new_video("b.mp4"))?;
        store.update_state_by_file("a.mp4", VideoState::Processed)?;

        let counts = store.count_by_state()?;
        assert!(counts.contains(&(VideoState::New, 1)));
        assert!(counts.contains(&(VideoState::Processed, 1)));
        assert_eq!(store.find_by_id(a)?.unwrap().state, VideoState::Processed);
        Ok(())
    }

    #[test]
    fn test_shared_store() -> Result<()> {
        let shared = SharedStore::new(store());
        let id = shared.with(|s| s.insert(&new_video("a.mp4")))?;
        let clone = shared.clone();
        let video = clone.with(|s| s.find_by_id(id))?;
        assert!(video.is_some());
        Ok(())
    }
}

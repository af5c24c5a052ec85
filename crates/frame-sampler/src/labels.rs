//! Label files.
//!
//! Final annotations are written to `<output>/jsonlist/<file>.json` as
//! compact JSON. The payload is assembled by the editor and stored as is,
//! apart from the `url` field pointing back at the source video.

use crate::catalog::VideoCatalog;
use crate::error::{Error, Result};
use serde_json::Value;
use shared::VideoState;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Writes label files and marks videos as processed
#[derive(Clone)]
pub struct LabelWriter {
    catalog: VideoCatalog,
}

/// Outcome of consolidating legacy label files
#[derive(Debug, Default, PartialEq)]
pub struct ConsolidationReport {
    /// Videos whose newest versioned file became `<file>.json`
    pub consolidated: Vec<String>,
    /// Older versions deleted
    pub removed: usize,
    /// Consolidated videos with no stored row
    pub unknown: Vec<String>,
}

impl LabelWriter {
    pub fn new(catalog: VideoCatalog) -> Self {
        Self { catalog }
    }

    /// Write the label file for a video and mark it `Processed`.
    ///
    /// The video must still be stored under `file` and must have produced
    /// frames. The state is only advanced once the file is written.
    pub async fn save(&self, video_id: i64, file: &str, content: Value) -> Result<()> {
        let video = self.catalog.find_matching(video_id, file)?;
        if !video.state.has_frames() {
            return Err(Error::NotPreprocessed {
                id: video_id,
                state: video.state,
            });
        }

        let Value::Object(mut content) = content else {
            return Err(Error::InvalidContent);
        };

        let paths = self.catalog.paths();
        let url = paths.video_file(&video.file);
        content.insert(
            "url".to_string(),
            Value::String(url.to_string_lossy().into_owned()),
        );

        let dir = paths.labels_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(Error::fs(&dir))?;

        let path = paths.label_file(&video.file);
        let bytes = serde_json::to_vec(&content).map_err(|e| Error::Store(e.into()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| Error::Write {
                path: path.clone(),
                source,
            })?;

        self.catalog
            .store()
            .with(|s| s.update_state(video_id, VideoState::Processed))?;

        info!(video_id, file = %video.file, path = %path.display(), "Saved labels");
        Ok(())
    }

    /// Fold legacy versioned label files into one file per video.
    ///
    /// Files named `<file>-<a>-<b>-<c>.json` are grouped by video; the
    /// lexicographically greatest name is renamed to `<file>.json`, the
    /// others are deleted, and the video is marked `Processed`.
    pub async fn consolidate_legacy(&self) -> Result<ConsolidationReport> {
        let paths = self.catalog.paths();
        let dir = paths.labels_dir();
        let mut report = ConsolidationReport::default();

        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            debug!(dir = %dir.display(), "No label directory, nothing to consolidate");
            return Ok(report);
        }

        let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(Error::fs(&dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(Error::fs(&dir))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(video) = versioned_video(&name) {
                versions.entry(video.to_string()).or_default().push(name);
            }
        }

        for (video, mut names) in versions {
            names.sort_unstable_by(|a, b| b.cmp(a));
            let newest = &names[0];

            for old in &names[1..] {
                let path = dir.join(old);
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(Error::fs(&path))?;
                report.removed += 1;
            }

            let target = paths.label_file(&video);
            tokio::fs::rename(dir.join(newest), &target)
                .await
                .map_err(Error::fs(&target))?;

            let changed = self
                .catalog
                .store()
                .with(|s| s.update_state_by_file(&video, VideoState::Processed))?;
            if changed == 0 {
                warn!(file = %video, "Consolidated labels for a video with no stored row");
                report.unknown.push(video.clone());
            }

            info!(file = %video, kept = %newest, versions = names.len(), "Consolidated labels");
            report.consolidated.push(video);
        }

        Ok(report)
    }
}

/// Video file name of a `<file>-<a>-<b>-<c>.json` label file
fn versioned_video(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(".json")?;
    let mut parts = stem.rsplitn(4, '-');
    let versioned = parts
        .by_ref()
        .take(3)
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    match parts.next() {
        Some(video) if versioned && !video.is_empty() => Some(video),
        _ => None,
    }
}

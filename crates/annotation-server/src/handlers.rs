//! Handlers for the `/api/v1` resources.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{ExtraFrame, LabelSet, Video};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Action requested on a single video
#[derive(Debug, Deserialize)]
pub struct VideoAction {
    pub action: String,
    pub file: String,
}

/// Final annotation content for a video
#[derive(Debug, Deserialize)]
pub struct SaveResults {
    pub file: String,
    pub content: Value,
}

/// GET /labels
pub async fn list_labels(State(state): State<AppState>) -> Json<LabelSet> {
    Json(state.label_set.as_ref().clone())
}

/// GET /videos
pub async fn list_videos(State(state): State<AppState>) -> AppResult<Json<Vec<Video>>> {
    Ok(Json(state.catalog.list_all().await?))
}

/// GET /videos/{id}
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Video>> {
    Ok(Json(state.catalog.find_one(id, true).await?))
}

/// POST /videos/{id}
///
/// Only `preprocess` is supported. Responds once `PreProcessing` is stored;
/// clients poll the video to observe the outcome.
pub async fn video_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<VideoAction>,
) -> AppResult<(StatusCode, Json<Value>)> {
    match body.action.as_str() {
        "preprocess" => {
            let run = state.preprocessor.trigger(id, &body.file)?;
            info!(video_id = run.video_id, "Preprocessing accepted");
            Ok((StatusCode::ACCEPTED, Json(json!({}))))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {other}"))),
    }
}

/// GET /videos/{id}/frames/{index}/extras
pub async fn list_extras(
    State(state): State<AppState>,
    Path((id, index)): Path<(i64, u32)>,
) -> AppResult<Json<Vec<ExtraFrame>>> {
    Ok(Json(state.extras.extras(id, index).await?))
}

/// POST /videos/{id}/results
pub async fn save_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SaveResults>,
) -> AppResult<Json<Value>> {
    state.labels.save(id, &body.file, body.content).await?;
    Ok(Json(json!({})))
}

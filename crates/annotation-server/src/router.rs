//! Application router.
//!
//! ```text
//! GET  /api/v1/labels                              list_labels
//! GET  /api/v1/videos                              list_videos
//! GET  /api/v1/videos/{id}                         get_video
//! POST /api/v1/videos/{id}                         video_action
//! GET  /api/v1/videos/{id}/frames/{index}/extras   list_extras
//! POST /api/v1/videos/{id}/results                 save_results
//!
//! GET  /static/videos/*                            source videos
//! GET  /static/frames/*                            extracted frames
//! ```

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/labels", get(handlers::list_labels))
        .route("/videos", get(handlers::list_videos))
        .route(
            "/videos/{id}",
            get(handlers::get_video).post(handlers::video_action),
        )
        .route(
            "/videos/{id}/frames/{index}/extras",
            get(handlers::list_extras),
        )
        .route("/videos/{id}/results", post(handlers::save_results))
}

/// Build the full application router with static file serving and tracing
pub fn build_app_router(state: AppState) -> Router {
    let paths = state.catalog.paths().clone();

    Router::new()
        .nest("/api/v1", api_routes())
        .nest_service("/static/videos", ServeDir::new(paths.source_dir()))
        .nest_service("/static/frames", ServeDir::new(paths.output_dir()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

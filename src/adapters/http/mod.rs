//! HTTP surface: the JSON API plus static HLS delivery.

pub mod error;
pub mod rate_limit;
pub mod segments;
pub mod videos;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;

use crate::application::ingest::IngestService;
use crate::config::Config;
use crate::ports::repository::VideoRepository;

use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestService,
    pub repo: Arc<dyn VideoRepository>,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
}

pub fn router(state: AppState) -> Router {
    let segments_dir = state.config.segments_dir.clone();
    let max_upload = state.config.max_upload_bytes;

    let api = Router::new()
        .route("/api/health", get(videos::health))
        .route("/api/videos", get(videos::list).post(videos::upload))
        .route(
            "/api/videos/:id",
            get(videos::get_by_id).delete(videos::remove),
        )
        .route(
            "/api/videos/:series_id/:episode_number",
            get(videos::get_for_episode),
        )
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state);

    api.nest_service("/segments", segments::router(&segments_dir))
}

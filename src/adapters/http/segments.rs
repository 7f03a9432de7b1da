//! Serves transcoded HLS output straight from the segments directory.
//!
//! `ServeDir` handles range requests for the `.ts` files; the layer on
//! top pins the content types players expect and the cache split between
//! mutable playlists and immutable segments.

use std::path::Path;

use axum::extract::Request;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::services::ServeDir;

pub fn router(segments_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(segments_dir))
        .layer(middleware::from_fn(hls_headers))
}

async fn hls_headers(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let mut res = next.run(req).await;
    if !res.status().is_success() {
        return res;
    }
    let headers = res.headers_mut();
    if path.ends_with(".m3u8") {
        // Playlists mutate during processing; forbid caching outright.
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));
    } else if path.ends_with(".ts") {
        // Segments are immutable once written.
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("video/mp2t"));
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000"),
        );
    }
    res
}

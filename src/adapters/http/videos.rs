//! REST handlers for the upload and job-status API.

use std::io;
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::warn;
use uuid::Uuid;

use crate::application::ingest::IngestRequest;
use crate::domain::video::{VideoListing, VideoRecord, VideoStatus};
use crate::domain::{layout, video};

use super::error::ApiError;
use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoDto {
    id: Uuid,
    title: String,
    series_id: Uuid,
    episode_id: Option<Uuid>,
    episode_number: u32,
    original_filename: String,
    duration: f64,
    file_size: u64,
    status: VideoStatus,
    processing_progress: u8,
    total_segments: u32,
    hls_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    series_title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VideoDto {
    fn from_record(v: VideoRecord, series_title: Option<String>) -> Self {
        // The playlist URL is only advertised once the job finished.
        let hls_url = match v.status {
            VideoStatus::Completed => layout::manifest_url(v.series_id, v.episode_number).ok(),
            _ => None,
        };
        Self {
            id: v.id,
            title: v.title,
            series_id: v.series_id,
            episode_id: v.episode_id,
            episode_number: v.episode_number,
            original_filename: v.original_filename,
            duration: v.duration_secs,
            file_size: v.file_size,
            status: v.status,
            processing_progress: v.processing_progress,
            total_segments: v.total_segments,
            hls_url,
            series_title,
            created_at: v.created_at,
            updated_at: v.updated_at,
        }
    }

    fn from_listing(listing: VideoListing) -> Self {
        Self::from_record(listing.video, listing.series_title)
    }
}

/// POST /api/videos
///
/// Multipart upload. The file is streamed to the staging directory while
/// the other fields arrive, then validated and handed to the ingestion
/// service. Responds as soon as the job row exists; clients poll for the
/// rest.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut staged: Option<(PathBuf, String, String)> = None;
    let mut series_id_raw: Option<String> = None;
    let mut episode_raw: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("video") => {
                let original = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or_else(|| ApiError::bad_request("Video field is missing a filename"))?;
                let content_type = field.content_type().unwrap_or_default();
                if !content_type.starts_with("video/") {
                    return Err(ApiError::bad_request("Only video files are allowed"));
                }
                let safe = video::safe_filename(&original);
                let path = state.config.upload_dir.join(&safe);
                stream_to_file(&path, field)
                    .await
                    .map_err(ApiError::from)?;
                staged = Some((path, original, safe));
            }
            Some("seriesId") => series_id_raw = Some(text_field(field).await?),
            Some("episodeNumber") => episode_raw = Some(text_field(field).await?),
            Some("title") => title = Some(text_field(field).await?),
            _ => {}
        }
    }

    let (staged_path, original_filename, safe_filename) =
        staged.ok_or_else(|| ApiError::bad_request("No video file provided"))?;

    let parsed = parse_upload_fields(series_id_raw, episode_raw, title);
    let (series_id, episode_number, title) = match parsed {
        Ok(v) => v,
        Err(e) => {
            discard_staged(&staged_path).await;
            return Err(e);
        }
    };

    let receipt = state
        .ingest
        .ingest(IngestRequest {
            series_id,
            episode_number,
            title: title.clone(),
            original_filename,
            safe_filename,
            staged_path: staged_path.clone(),
        })
        .await;

    let receipt = match receipt {
        Ok(r) => r,
        Err(e) => {
            // The staged file is gone once the service relocated it; this
            // only cleans up rejections that happened before the move.
            discard_staged(&staged_path).await;
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "video": {
                "id": receipt.video_id,
                "title": title,
                "seriesId": series_id,
                "episodeNumber": episode_number,
                "status": VideoStatus::Processing,
                "duration": receipt.metadata.duration_secs,
                "resolution": receipt.metadata.resolution(),
                "videoCodec": receipt.metadata.video_codec,
                "audioCodec": receipt.metadata.audio_codec,
                "estimatedSegments": receipt.metadata.estimated_segments(),
            },
        })),
    ))
}

/// GET /api/videos
pub async fn list(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.limiter.allow(addr.ip()) {
        return Err(ApiError::too_many_requests());
    }
    let videos: Vec<VideoDto> = state
        .repo
        .list_videos()
        .await?
        .into_iter()
        .map(VideoDto::from_listing)
        .collect();
    Ok(Json(json!({ "success": true, "videos": videos })))
}

/// GET /api/videos/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.limiter.allow(addr.ip()) {
        return Err(ApiError::too_many_requests());
    }
    let video = state
        .repo
        .get_video(id)
        .await?
        .ok_or_else(|| ApiError::from(crate::error::PipelineError::NotFound("video")))?;

    // Completed jobs carry their segment inventory with public URLs.
    let segments: Vec<serde_json::Value> = match video.status {
        VideoStatus::Completed => state
            .repo
            .list_segments(id)
            .await?
            .iter()
            .map(|s| {
                json!({
                    "segmentNumber": s.segment_number,
                    "duration": s.duration_secs,
                    // Rows are 1-based, files 0-based.
                    "url": layout::segment_url(video.series_id, video.episode_number, s.segment_number - 1).ok(),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(Json(json!({
        "success": true,
        "video": VideoDto::from_record(video, None),
        "segments": segments,
    })))
}

/// GET /api/videos/{seriesId}/{episodeNumber}
///
/// Playback lookup: only a `completed` job satisfies it.
pub async fn get_for_episode(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((series_id, episode_raw)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.limiter.allow(addr.ip()) {
        return Err(ApiError::too_many_requests());
    }
    let episode_number = parse_episode_number(&episode_raw)?;
    let video = state
        .repo
        .find_completed_for_episode(series_id, episode_number)
        .await?
        .ok_or_else(|| ApiError::from(crate::error::PipelineError::NotFound("video")))?;
    Ok(Json(json!({
        "success": true,
        "video": VideoDto::from_record(video, None),
    })))
}

/// DELETE /api/videos/{id}
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let video = state.ingest.delete(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Video '{}' deleted successfully", video.title),
    })))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.repo.ping().await?;
    Ok(Json(json!({
        "success": true,
        "status": "healthy",
        "database": "connected",
        "segmentsDir": state.config.segments_dir.display().to_string(),
    })))
}

async fn text_field(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))
}

fn parse_upload_fields(
    series_id_raw: Option<String>,
    episode_raw: Option<String>,
    title: Option<String>,
) -> Result<(Uuid, u32, String), ApiError> {
    let series_id = series_id_raw
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|_| ApiError::bad_request("seriesId must be a valid UUID"))?
        .ok_or_else(|| ApiError::bad_request("seriesId is required"))?;
    let episode_number =
        parse_episode_number(episode_raw.as_deref().unwrap_or_default())?;
    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    Ok((series_id, episode_number, title))
}

fn parse_episode_number(raw: &str) -> Result<u32, ApiError> {
    match raw.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ApiError::bad_request(
            "episodeNumber must be a positive integer",
        )),
    }
}

async fn discard_staged(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), "staged upload not removed: {}", e);
        }
    }
}

/// Streams one multipart field to disk without buffering it in memory.
async fn stream_to_file(path: &FsPath, field: Field<'_>) -> crate::error::Result<()> {
    let body_with_io_error = field.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_number_parsing() {
        assert_eq!(parse_episode_number("1").unwrap(), 1);
        assert_eq!(parse_episode_number("42").unwrap(), 42);
        for bad in ["0", "-1", "abc", "", "1.5", " 1"] {
            assert!(parse_episode_number(bad).is_err(), "accepted {:?}", bad);
        }
    }
}

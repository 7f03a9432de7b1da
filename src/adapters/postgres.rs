//! PostgreSQL-backed job state store.
//!
//! Queries are bound at runtime and rows mapped by hand; the partial
//! unique index on (series_id, episode_number) backstops the explicit
//! conflict check the orchestrator performs before insert.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::video::{SegmentRecord, VideoListing, VideoRecord, VideoStatus};
use crate::error::{PipelineError, Result};
use crate::ports::repository::VideoRepository;

const VIDEO_COLUMNS: &str = "id, title, series_id, episode_id, episode_number, \
     original_filename, safe_filename, duration, file_size, video_path, \
     hls_manifest_path, status, processing_progress, total_segments, \
     created_at, updated_at";

pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }
}

fn video_from_row(row: &PgRow) -> Result<VideoRecord> {
    let status: String = row.try_get("status")?;
    Ok(VideoRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        series_id: row.try_get("series_id")?,
        episode_id: row.try_get("episode_id")?,
        episode_number: row.try_get::<i32, _>("episode_number")? as u32,
        original_filename: row.try_get("original_filename")?,
        safe_filename: row.try_get("safe_filename")?,
        duration_secs: row.try_get("duration")?,
        file_size: row.try_get::<i64, _>("file_size")? as u64,
        video_path: PathBuf::from(row.try_get::<String, _>("video_path")?),
        hls_manifest_path: row
            .try_get::<Option<String>, _>("hls_manifest_path")?
            .map(PathBuf::from),
        status: status
            .parse::<VideoStatus>()
            .map_err(|e| PipelineError::Database(sqlx::Error::Decode(e.into())))?,
        processing_progress: row.try_get::<i32, _>("processing_progress")? as u8,
        total_segments: row.try_get::<i32, _>("total_segments")? as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn segment_from_row(row: &PgRow) -> Result<SegmentRecord> {
    Ok(SegmentRecord {
        id: row.try_get("id")?,
        video_id: row.try_get("video_id")?,
        segment_number: row.try_get::<i32, _>("segment_number")? as u32,
        filename: row.try_get("filename")?,
        file_path: PathBuf::from(row.try_get::<String, _>("file_path")?),
        duration_secs: row.try_get("duration")?,
        file_size: row.try_get::<i64, _>("file_size")? as u64,
    })
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn series_exists(&self, series_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM series WHERE id = $1")
            .bind(series_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn find_episode_id(&self, series_id: Uuid, episode_number: u32) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM episodes WHERE series_id = $1 AND number = $2")
            .bind(series_id)
            .bind(episode_number as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("id")?),
            None => None,
        })
    }

    async fn find_active_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos \
             WHERE series_id = $1 AND episode_number = $2 AND status <> 'failed'"
        ))
        .bind(series_id)
        .bind(episode_number as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    async fn find_completed_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos \
             WHERE series_id = $1 AND episode_number = $2 AND status = 'completed'"
        ))
        .bind(series_id)
        .bind(episode_number as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    async fn insert_video(&self, video: &VideoRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO videos ( \
                id, title, series_id, episode_id, episode_number, \
                original_filename, safe_filename, duration, file_size, \
                video_path, hls_manifest_path, status, processing_progress, \
                total_segments, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(video.series_id)
        .bind(video.episode_id)
        .bind(video.episode_number as i32)
        .bind(&video.original_filename)
        .bind(&video.safe_filename)
        .bind(video.duration_secs)
        .bind(video.file_size as i64)
        .bind(video.video_path.to_string_lossy().into_owned())
        .bind(
            video
                .hls_manifest_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(video.status.as_str())
        .bind(video.processing_progress as i32)
        .bind(video.total_segments as i32)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => PipelineError::Conflict,
            _ => PipelineError::Database(e),
        })?;
        Ok(())
    }

    async fn update_progress(&self, video_id: Uuid, progress: u8) -> Result<()> {
        sqlx::query("UPDATE videos SET processing_progress = $1, updated_at = $2 WHERE id = $3")
            .bind(progress as i32)
            .bind(Utc::now())
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        video_id: Uuid,
        manifest_path: &Path,
        total_segments: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE videos SET status = 'completed', hls_manifest_path = $1, \
             total_segments = $2, processing_progress = 100, updated_at = $3 \
             WHERE id = $4",
        )
        .bind(manifest_path.to_string_lossy().into_owned())
        .bind(total_segments as i32)
        .bind(Utc::now())
        .bind(video_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, video_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE videos SET status = 'failed', updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_videos(&self) -> Result<Vec<VideoListing>> {
        let rows = sqlx::query(
            "SELECT v.id, v.title, v.series_id, v.episode_id, v.episode_number, \
                    v.original_filename, v.safe_filename, v.duration, v.file_size, \
                    v.video_path, v.hls_manifest_path, v.status, v.processing_progress, \
                    v.total_segments, v.created_at, v.updated_at, \
                    s.title AS series_title \
             FROM videos v \
             LEFT JOIN series s ON v.series_id = s.id \
             ORDER BY v.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(VideoListing {
                    video: video_from_row(row)?,
                    series_title: row.try_get("series_title")?,
                })
            })
            .collect()
    }

    async fn get_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>> {
        let row = sqlx::query(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"))
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    async fn replace_segments(&self, video_id: Uuid, segments: &[SegmentRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments WHERE video_id = $1")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;

        for segment in segments {
            sqlx::query(
                "INSERT INTO segments ( \
                    id, video_id, segment_number, filename, file_path, duration, file_size \
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(segment.id)
            .bind(segment.video_id)
            .bind(segment.segment_number as i32)
            .bind(&segment.filename)
            .bind(segment.file_path.to_string_lossy().into_owned())
            .bind(segment.duration_secs)
            .bind(segment.file_size as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_segments(&self, video_id: Uuid) -> Result<Vec<SegmentRecord>> {
        let rows = sqlx::query(
            "SELECT id, video_id, segment_number, filename, file_path, duration, file_size \
             FROM segments WHERE video_id = $1 ORDER BY segment_number",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(segment_from_row).collect()
    }

    async fn delete_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>> {
        let row = sqlx::query(&format!(
            "DELETE FROM videos WHERE id = $1 RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(video_from_row).transpose()
    }
}

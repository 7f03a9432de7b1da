//! Durable job state store, plus the two read-only catalog queries the
//! pipeline needs from the series/episode tables.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::video::{SegmentRecord, VideoListing, VideoRecord};
use crate::error::Result;

#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<()>;

    /// Whether the series row exists. Uploads against unknown series are
    /// rejected before any filesystem work.
    async fn series_exists(&self, series_id: Uuid) -> Result<bool>;

    /// Episode row id for (series, number) if one exists. The link is
    /// optional; uploads are legal without a matching episode row.
    async fn find_episode_id(&self, series_id: Uuid, episode_number: u32) -> Result<Option<Uuid>>;

    /// The non-failed video for (series, episode), whatever its state.
    /// Used for the explicit conflict check before insert.
    async fn find_active_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>>;

    /// The single completed video for (series, episode). This is how
    /// playback resolves its manifest URL; `processing` and `failed` rows
    /// do not count.
    async fn find_completed_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>>;

    /// Insert a new job row. Fails with `Conflict` when a non-failed row
    /// for the same (series, episode) already exists.
    async fn insert_video(&self, video: &VideoRecord) -> Result<()>;

    async fn update_progress(&self, video_id: Uuid, progress: u8) -> Result<()>;

    async fn mark_completed(
        &self,
        video_id: Uuid,
        manifest_path: &Path,
        total_segments: u32,
    ) -> Result<()>;

    async fn mark_failed(&self, video_id: Uuid) -> Result<()>;

    /// All jobs, newest first, joined with the series title.
    async fn list_videos(&self) -> Result<Vec<VideoListing>>;

    async fn get_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>>;

    /// Replace the segment inventory for a video (delete-then-insert, for
    /// re-processing).
    async fn replace_segments(&self, video_id: Uuid, segments: &[SegmentRecord]) -> Result<()>;

    async fn list_segments(&self, video_id: Uuid) -> Result<Vec<SegmentRecord>>;

    /// Delete a job row, cascading to its segments. Returns the deleted
    /// record so the caller can remove files afterwards.
    async fn delete_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>>;
}

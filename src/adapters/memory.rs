//! In-memory job state store.
//!
//! Drop-in stand-in for the PostgreSQL repository behind the same port,
//! used by the application-level tests. Enforces the same one-live-video
//! per (series, episode) rule the database index enforces.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::video::{SegmentRecord, VideoListing, VideoRecord, VideoStatus};
use crate::error::{PipelineError, Result};
use crate::ports::repository::VideoRepository;

#[derive(Default)]
struct Inner {
    series: HashMap<Uuid, String>,
    episodes: HashMap<(Uuid, u32), Uuid>,
    videos: HashMap<Uuid, VideoRecord>,
    segments: HashMap<Uuid, Vec<SegmentRecord>>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a series row, returning its id.
    pub fn add_series(&self, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().series.insert(id, title.to_owned());
        id
    }

    /// Seed an episode row for (series, number), returning its id.
    pub fn add_episode(&self, series_id: Uuid, number: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .episodes
            .insert((series_id, number), id);
        id
    }

    /// Seed a full video row in the given status, returning its id.
    pub fn seed_video(&self, series_id: Uuid, episode_number: u32, status: VideoStatus) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let record = VideoRecord {
            id,
            title: format!("Episode {}", episode_number),
            series_id,
            episode_id: None,
            episode_number,
            original_filename: String::from("source.mp4"),
            safe_filename: String::from("1700000000_abcd1234_source.mp4"),
            duration_secs: 20.0,
            file_size: 4096,
            video_path: Path::new("/tmp/video.mp4").to_path_buf(),
            hls_manifest_path: match status {
                VideoStatus::Completed => Some(Path::new("/tmp/playlist.m3u8").to_path_buf()),
                _ => None,
            },
            status,
            processing_progress: match status {
                VideoStatus::Completed => 100,
                _ => 0,
            },
            total_segments: match status {
                VideoStatus::Completed => 4,
                _ => 0,
            },
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().videos.insert(id, record);
        id
    }
}

#[async_trait]
impl VideoRepository for InMemoryRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn series_exists(&self, series_id: Uuid) -> Result<bool> {
        Ok(self.inner.lock().unwrap().series.contains_key(&series_id))
    }

    async fn find_episode_id(&self, series_id: Uuid, episode_number: u32) -> Result<Option<Uuid>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .episodes
            .get(&(series_id, episode_number))
            .copied())
    }

    async fn find_active_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .videos
            .values()
            .find(|v| {
                v.series_id == series_id
                    && v.episode_number == episode_number
                    && v.status != VideoStatus::Failed
            })
            .cloned())
    }

    async fn find_completed_for_episode(
        &self,
        series_id: Uuid,
        episode_number: u32,
    ) -> Result<Option<VideoRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .videos
            .values()
            .find(|v| {
                v.series_id == series_id
                    && v.episode_number == episode_number
                    && v.status == VideoStatus::Completed
            })
            .cloned())
    }

    async fn insert_video(&self, video: &VideoRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.videos.values().any(|v| {
            v.series_id == video.series_id
                && v.episode_number == video.episode_number
                && v.status != VideoStatus::Failed
        });
        if duplicate {
            return Err(PipelineError::Conflict);
        }
        inner.videos.insert(video.id, video.clone());
        Ok(())
    }

    async fn update_progress(&self, video_id: Uuid, progress: u8) -> Result<()> {
        if let Some(video) = self.inner.lock().unwrap().videos.get_mut(&video_id) {
            video.processing_progress = progress;
            video.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        video_id: Uuid,
        manifest_path: &Path,
        total_segments: u32,
    ) -> Result<()> {
        if let Some(video) = self.inner.lock().unwrap().videos.get_mut(&video_id) {
            video.status = VideoStatus::Completed;
            video.hls_manifest_path = Some(manifest_path.to_path_buf());
            video.total_segments = total_segments;
            video.processing_progress = 100;
            video.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, video_id: Uuid) -> Result<()> {
        if let Some(video) = self.inner.lock().unwrap().videos.get_mut(&video_id) {
            video.status = VideoStatus::Failed;
            video.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_videos(&self) -> Result<Vec<VideoListing>> {
        let inner = self.inner.lock().unwrap();
        let mut listings: Vec<VideoListing> = inner
            .videos
            .values()
            .map(|v| VideoListing {
                video: v.clone(),
                series_title: inner.series.get(&v.series_id).cloned(),
            })
            .collect();
        listings.sort_by(|a, b| b.video.created_at.cmp(&a.video.created_at));
        Ok(listings)
    }

    async fn get_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>> {
        Ok(self.inner.lock().unwrap().videos.get(&video_id).cloned())
    }

    async fn replace_segments(&self, video_id: Uuid, segments: &[SegmentRecord]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .segments
            .insert(video_id, segments.to_vec());
        Ok(())
    }

    async fn list_segments(&self, video_id: Uuid) -> Result<Vec<SegmentRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .segments
            .get(&video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_video(&self, video_id: Uuid) -> Result<Option<VideoRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.segments.remove(&video_id);
        Ok(inner.videos.remove(&video_id))
    }
}

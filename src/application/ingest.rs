//! Ingestion orchestrator.
//!
//! Drives one upload from staged file to completed HLS asset: relocate
//! into the canonical episode directory, probe, persist the job row,
//! then hand off to a background continuation that transcodes, repairs
//! the playlist, records the segment inventory and finalizes status.
//! The HTTP caller gets its response as soon as the row exists; every
//! later failure is only visible through the job's `status` field.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::video::{ProbedMetadata, SegmentRecord, VideoRecord, VideoStatus};
use crate::domain::{layout, manifest, video};
use crate::error::{PipelineError, Result};
use crate::ports::media::{MediaProber, ProgressSink, Transcoder};
use crate::ports::repository::VideoRepository;

/// A validated upload, already staged on local disk by the HTTP layer.
#[derive(Debug)]
pub struct IngestRequest {
    pub series_id: Uuid,
    pub episode_number: u32,
    pub title: String,
    pub original_filename: String,
    pub safe_filename: String,
    pub staged_path: PathBuf,
}

/// Returned to the caller while transcoding continues in the background.
#[derive(Debug)]
pub struct IngestReceipt {
    pub video_id: Uuid,
    pub metadata: ProbedMetadata,
    pub video_path: PathBuf,
}

#[derive(Clone)]
pub struct IngestService {
    repo: Arc<dyn VideoRepository>,
    transcoder: Arc<dyn Transcoder>,
    prober: Arc<dyn MediaProber>,
    segments_dir: PathBuf,
    /// Live continuations by job id. Gives deletion (and any future
    /// cancellation feature) a handle to abort instead of a detached task.
    handles: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl IngestService {
    pub fn new(
        repo: Arc<dyn VideoRepository>,
        transcoder: Arc<dyn Transcoder>,
        prober: Arc<dyn MediaProber>,
        segments_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            transcoder,
            prober,
            segments_dir,
            handles: Arc::new(DashMap::new()),
        }
    }

    /// Accept a staged upload: relocate, probe, persist the job row and
    /// launch the transcode. Returns as soon as the row is durable.
    pub async fn ingest(&self, req: IngestRequest) -> Result<IngestReceipt> {
        if !self.repo.series_exists(req.series_id).await? {
            return Err(PipelineError::NotFound("series"));
        }
        if self
            .repo
            .find_active_for_episode(req.series_id, req.episode_number)
            .await?
            .is_some()
        {
            return Err(PipelineError::Conflict);
        }

        let dir = self
            .segments_dir
            .join(layout::episode_dir_name(req.series_id, req.episode_number)?);
        tokio::fs::create_dir_all(&dir).await?;

        // Relocate under a fixed name, keeping the original extension.
        let local_name = match Path::new(&req.original_filename).extension() {
            Some(ext) => format!("video.{}", ext.to_string_lossy()),
            None => String::from("video"),
        };
        let video_path = dir.join(local_name);
        move_file(&req.staged_path, &video_path).await?;

        // Probing happens after the move; a probe failure leaves the
        // relocated file behind with no job row pointing at it.
        let metadata = self.prober.probe(&video_path).await?;

        let episode_id = self
            .repo
            .find_episode_id(req.series_id, req.episode_number)
            .await?;

        let now = Utc::now();
        let record = VideoRecord {
            id: Uuid::new_v4(),
            title: req.title,
            series_id: req.series_id,
            episode_id,
            episode_number: req.episode_number,
            original_filename: req.original_filename,
            safe_filename: req.safe_filename,
            duration_secs: metadata.duration_secs,
            file_size: metadata.file_size,
            video_path: video_path.clone(),
            hls_manifest_path: None,
            status: VideoStatus::Processing,
            processing_progress: 0,
            total_segments: 0,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_video(&record).await?;

        info!(
            video_id = %record.id,
            series_id = %req.series_id,
            episode = req.episode_number,
            duration = metadata.duration_secs,
            "upload accepted, starting transcode"
        );

        self.spawn_processing(record.id, video_path.clone(), dir, metadata.duration_secs);

        Ok(IngestReceipt {
            video_id: record.id,
            metadata,
            video_path,
        })
    }

    /// Delete a job: abort a live continuation, remove the row (segments
    /// cascade), then best-effort removal of the episode directory with
    /// the source file inside it. File errors never fail the deletion.
    pub async fn delete(&self, video_id: Uuid) -> Result<VideoRecord> {
        if let Some((_, handle)) = self.handles.remove(&video_id) {
            // Wait for the aborted task to be dropped so the transcoder
            // child, killed on drop, is gone before its directory is.
            handle.abort();
            let _ = handle.await;
        }

        let video = self
            .repo
            .delete_video(video_id)
            .await?
            .ok_or(PipelineError::NotFound("video"))?;

        let dir = self
            .segments_dir
            .join(layout::episode_dir_name(video.series_id, video.episode_number)?);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(
                video_id = %video_id,
                dir = %dir.display(),
                "segment directory not removed: {}", e
            );
        }

        info!(video_id = %video_id, title = %video.title, "video deleted");
        Ok(video)
    }

    /// Wait for a job's background continuation to finish. Used by tests
    /// and graceful shutdown; a no-op when the job already settled.
    pub async fn await_processing(&self, video_id: Uuid) {
        if let Some((_, handle)) = self.handles.remove(&video_id) {
            let _ = handle.await;
        }
    }

    fn spawn_processing(
        &self,
        video_id: Uuid,
        video_path: PathBuf,
        dir: PathBuf,
        duration_secs: f64,
    ) {
        let repo = Arc::clone(&self.repo);
        let transcoder = Arc::clone(&self.transcoder);
        let handles = Arc::clone(&self.handles);

        let handle = tokio::spawn(async move {
            let outcome = run_pipeline(
                Arc::clone(&repo),
                transcoder,
                video_id,
                video_path,
                dir,
                duration_secs,
            )
            .await;

            if let Err(e) = outcome {
                error!(video_id = %video_id, "processing failed: {}", e);
                if let Err(db) = repo.mark_failed(video_id).await {
                    error!(video_id = %video_id, "could not mark job failed: {}", db);
                }
            }
            handles.remove(&video_id);
        });
        self.handles.insert(video_id, handle);
        // The task deregisters itself on completion. If it settled before
        // the insert above, that removal was a no-op and the stored handle
        // is already dead; drop it here instead of leaking it.
        if self
            .handles
            .get(&video_id)
            .map(|h| h.is_finished())
            .unwrap_or(false)
        {
            self.handles.remove(&video_id);
        }
    }

    /// Number of continuations currently registered.
    pub fn active_jobs(&self) -> usize {
        self.handles.len()
    }
}

/// The asynchronous continuation: transcode, repair the playlist, record
/// segments, finalize. Partial output from a failed run stays on disk
/// until the job is deleted.
async fn run_pipeline(
    repo: Arc<dyn VideoRepository>,
    transcoder: Arc<dyn Transcoder>,
    video_id: Uuid,
    video_path: PathBuf,
    dir: PathBuf,
    duration_secs: f64,
) -> Result<()> {
    let manifest_path = dir.join(layout::MANIFEST_FILENAME);
    let segment_pattern = dir.join(layout::SEGMENT_FILE_PATTERN);

    // Persist progress at 10-point steps only, so a chatty transcoder
    // cannot amplify into a database write per callback.
    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
    let sink: ProgressSink = Arc::new(move |percent| {
        let _ = tx.send(percent);
    });
    let progress_repo = Arc::clone(&repo);
    let writer = tokio::spawn(async move {
        let mut last_written = 0u8;
        while let Some(percent) = rx.recv().await {
            let bucket = percent - percent % 10;
            if bucket > last_written {
                last_written = bucket;
                if let Err(e) = progress_repo.update_progress(video_id, bucket).await {
                    warn!(video_id = %video_id, "progress update failed: {}", e);
                }
            }
        }
    });

    let transcode_result = transcoder
        .transcode_to_hls(
            &video_path,
            &manifest_path,
            &segment_pattern,
            duration_secs,
            sink,
        )
        .await;
    let _ = writer.await;
    transcode_result?;

    // The playlist is untrusted transcoder output; guarantee the header
    // tags before anything is published.
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| PipelineError::Manifest(format!("playlist missing after transcode: {}", e)))?;
    let repaired = manifest::repair_manifest(&raw);
    if repaired != raw {
        tokio::fs::write(&manifest_path, &repaired).await?;
        info!(video_id = %video_id, "repaired playlist header tags");
    }

    // Zero-padded fixed-width names, so a lexicographic sort is the
    // playback order.
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".ts") {
            names.push(name);
        }
    }
    names.sort();

    if names.is_empty() {
        return Err(PipelineError::Transcode(String::from(
            "transcoder produced no segments",
        )));
    }

    let durations = video::segment_durations(duration_secs, names.len());
    let mut segments = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let file_path = dir.join(name);
        let file_size = tokio::fs::metadata(&file_path).await?.len();
        segments.push(SegmentRecord {
            id: Uuid::new_v4(),
            video_id,
            segment_number: (i + 1) as u32,
            filename: name.clone(),
            file_path,
            duration_secs: durations[i],
            file_size,
        });
    }

    repo.replace_segments(video_id, &segments).await?;
    repo.mark_completed(video_id, &manifest_path, segments.len() as u32)
        .await?;

    info!(
        video_id = %video_id,
        segments = segments.len(),
        "HLS processing completed"
    );
    Ok(())
}

/// Rename with a copy fallback for cross-device staging directories.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

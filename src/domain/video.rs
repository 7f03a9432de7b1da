//! Video job and segment records, plus the segment timing math.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed segment duration for every rendition, in seconds.
pub const SEGMENT_DURATION_SECS: f64 = 6.0;

/// Lifecycle of an upload job. Terminal states are `Completed` and
/// `Failed`; a failed job is only recoverable by deletion and re-upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploading => "uploading",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(VideoStatus::Uploading),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(format!("unknown video status: {}", other)),
        }
    }
}

/// One upload job, persisted for the whole lifetime of the video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: Uuid,
    pub title: String,
    pub series_id: Uuid,
    /// Linked episode row when one existed at upload time. Uploads are
    /// accepted without a matching episode row.
    pub episode_id: Option<Uuid>,
    pub episode_number: u32,
    pub original_filename: String,
    pub safe_filename: String,
    /// Probed source duration in seconds, 0 until known.
    pub duration_secs: f64,
    pub file_size: u64,
    /// Relocated source file inside the episode directory.
    pub video_path: PathBuf,
    /// Set when the job completes.
    pub hls_manifest_path: Option<PathBuf>,
    pub status: VideoStatus,
    /// 0..=100, throttled to 10-point steps while transcoding.
    pub processing_progress: u8,
    pub total_segments: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One transport-stream segment belonging to a video. Segment numbers are
/// 1-based and contiguous, matching the playlist order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: Uuid,
    pub video_id: Uuid,
    pub segment_number: u32,
    pub filename: String,
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub file_size: u64,
}

/// A job row joined with its series title for admin listings.
#[derive(Debug, Clone)]
pub struct VideoListing {
    pub video: VideoRecord,
    pub series_title: Option<String>,
}

/// Metadata extracted from the source file before transcoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbedMetadata {
    pub duration_secs: f64,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
}

impl ProbedMetadata {
    /// Expected segment count for the fixed 6-second target duration.
    pub fn estimated_segments(&self) -> u32 {
        (self.duration_secs / SEGMENT_DURATION_SECS).ceil() as u32
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Approximate per-segment durations: the fixed target for every segment
/// except the last, which carries the remainder. A mis-probed total
/// duration can make the remainder negative; it is clamped at zero rather
/// than persisting a negative duration.
pub fn segment_durations(total_duration_secs: f64, segment_count: usize) -> Vec<f64> {
    (0..segment_count)
        .map(|i| {
            if i + 1 == segment_count {
                let rest = total_duration_secs - (segment_count - 1) as f64 * SEGMENT_DURATION_SECS;
                rest.max(0.0)
            } else {
                SEGMENT_DURATION_SECS
            }
        })
        .collect()
}

/// Collision-resistant staging filename preserving the original extension:
/// `<unix-millis>_<uuid prefix>_<sanitized stem><ext>`.
pub fn safe_filename(original: &str) -> String {
    let path = Path::new(original);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem: String = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(50)
        .collect();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let tag = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}{}", millis, &tag[..8], stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_durations_with_remainder() {
        // 20 seconds at a 6-second target: ceil(20/6) = 4 segments.
        let durations = segment_durations(20.0, 4);
        assert_eq!(durations, vec![6.0, 6.0, 6.0, 2.0]);
    }

    #[test]
    fn test_segment_durations_exact_multiple() {
        let durations = segment_durations(12.0, 2);
        assert_eq!(durations, vec![6.0, 6.0]);
    }

    #[test]
    fn test_negative_remainder_clamped_to_zero() {
        // Mis-probed total shorter than (count - 1) * 6.
        let durations = segment_durations(10.0, 4);
        assert_eq!(durations, vec![6.0, 6.0, 6.0, 0.0]);
    }

    #[test]
    fn test_estimated_segments() {
        let meta = ProbedMetadata {
            duration_secs: 20.0,
            file_size: 1024,
            width: 1280,
            height: 720,
            video_codec: String::from("h264"),
            audio_codec: String::from("aac"),
        };
        assert_eq!(meta.estimated_segments(), 4);
        assert_eq!(meta.resolution(), "1280x720");
    }

    #[test]
    fn test_safe_filename_sanitizes_and_keeps_extension() {
        let name = safe_filename("my episode (final).mp4");
        assert!(name.ends_with(".mp4"));
        assert!(name.contains("my_episode__final_"));
        assert!(!name.contains(' '));
        assert!(!name.contains('('));
    }

    #[test]
    fn test_safe_filename_without_extension() {
        let name = safe_filename("raw_upload");
        assert!(name.ends_with("raw_upload"));
        assert!(!name.ends_with('.'));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            VideoStatus::Uploading,
            VideoStatus::Processing,
            VideoStatus::Completed,
            VideoStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), status);
        }
    }
}

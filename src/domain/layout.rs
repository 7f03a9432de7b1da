//! Canonical naming for per-episode segment storage.
//!
//! The same `series-<id>-ep-<NN>` string is used as the on-disk directory
//! under the segments root and as the path segment in public HLS URLs. A
//! mismatch between the two breaks playback, so every consumer derives the
//! name here instead of formatting its own.

use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Playlist filename inside an episode directory.
pub const MANIFEST_FILENAME: &str = "playlist.m3u8";

/// ffmpeg output pattern for segment files, 3-digit zero-padded so a plain
/// lexicographic sort matches playback order.
pub const SEGMENT_FILE_PATTERN: &str = "segment_%03d.ts";

/// URL prefix under which episode directories are served.
pub const SEGMENTS_URL_ROOT: &str = "/segments";

/// Directory name for one episode's HLS output. Episode numbers are
/// zero-padded to two digits and render unpadded above 99.
pub fn episode_dir_name(series_id: Uuid, episode_number: u32) -> Result<String> {
    if episode_number == 0 {
        return Err(PipelineError::Validation(String::from(
            "episode number must be a positive integer",
        )));
    }
    Ok(format!("series-{}-ep-{:02}", series_id, episode_number))
}

/// Public URL of an episode's playlist.
pub fn manifest_url(series_id: Uuid, episode_number: u32) -> Result<String> {
    Ok(format!(
        "{}/{}/{}",
        SEGMENTS_URL_ROOT,
        episode_dir_name(series_id, episode_number)?,
        MANIFEST_FILENAME
    ))
}

/// Public URL of one media segment. `sequence` is the zero-based file
/// index, matching the transcoder's output numbering on disk.
pub fn segment_url(series_id: Uuid, episode_number: u32, sequence: u32) -> Result<String> {
    Ok(format!(
        "{}/{}/segment_{:03}.ts",
        SEGMENTS_URL_ROOT,
        episode_dir_name(series_id, episode_number)?,
        sequence
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> Uuid {
        Uuid::parse_str("b9e7dd5d-59c5-44dc-b37e-d313a345e277").unwrap()
    }

    #[test]
    fn test_zero_padding() {
        for (n, padded) in [(1, "01"), (9, "09"), (10, "10"), (99, "99"), (100, "100")] {
            let dir = episode_dir_name(sid(), n).unwrap();
            assert_eq!(dir, format!("series-{}-ep-{}", sid(), padded));
        }
    }

    #[test]
    fn test_directory_and_url_agree() {
        let dir = episode_dir_name(sid(), 7).unwrap();
        let url = manifest_url(sid(), 7).unwrap();
        assert_eq!(url, format!("/segments/{}/playlist.m3u8", dir));
    }

    #[test]
    fn test_segment_url_padding() {
        let url = segment_url(sid(), 1, 4).unwrap();
        assert!(url.ends_with("/segment_004.ts"));
        let url = segment_url(sid(), 1, 123).unwrap();
        assert!(url.ends_with("/segment_123.ts"));
    }

    #[test]
    fn test_rejects_episode_zero() {
        assert!(episode_dir_name(sid(), 0).is_err());
        assert!(manifest_url(sid(), 0).is_err());
    }
}

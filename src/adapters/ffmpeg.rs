//! External ffmpeg process adapter.
//!
//! One invocation converts the whole source file into a single HLS
//! rendition. The encoding profile is fixed and not configurable per call:
//! H.264 baseline level 3.0 with yuv420p, AAC 44.1 kHz stereo at 128k,
//! 6-second MPEG-TS segments in a VOD playlist, and forced keyframes every
//! 2 seconds so each segment is independently decodable.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::domain::manifest::TARGET_DURATION_SECS;
use crate::error::{PipelineError, Result};
use crate::ports::media::{ProgressSink, Transcoder};

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    out_time: Regex,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            out_time: Regex::new(r"^out_time_ms=(\d+)").unwrap(),
        }
    }
}

/// Parse one `-progress pipe:1` line into an output position in seconds.
/// Despite the name, ffmpeg reports `out_time_ms` in microseconds.
fn out_time_secs(re: &Regex, line: &str) -> Option<f64> {
    re.captures(line)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(|micros| micros as f64 / 1_000_000.0)
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode_to_hls(
        &self,
        input: &Path,
        manifest_path: &Path,
        segment_pattern: &Path,
        duration_secs: f64,
        progress: ProgressSink,
    ) -> Result<()> {
        let hls_time = TARGET_DURATION_SECS.to_string();

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-y")
            .arg("-i")
            .arg(input)
            // Video: H.264 baseline for maximum device compatibility
            .args(["-c:v", "libx264", "-preset", "fast", "-crf", "23"])
            .args(["-profile:v", "baseline", "-level", "3.0"])
            .args(["-pix_fmt", "yuv420p"])
            // Audio: AAC stereo at a fixed rate
            .args(["-c:a", "aac", "-ar", "44100", "-ac", "2", "-b:a", "128k"])
            // HLS muxer: fixed-length MPEG-TS segments, complete VOD playlist
            .args(["-f", "hls"])
            .args(["-hls_time", &hls_time])
            .args(["-hls_list_size", "0"])
            .args(["-hls_segment_type", "mpegts"])
            .arg("-hls_segment_filename")
            .arg(segment_pattern)
            .args(["-hls_flags", "independent_segments+program_date_time"])
            .args(["-hls_playlist_type", "vod"])
            // Keyframe alignment at segment boundaries (2-second GOP)
            .args(["-g", "48", "-keyint_min", "48", "-sc_threshold", "0"])
            .args(["-force_key_frames", "expr:gte(t,n_forced*2)"])
            .args(["-nostats", "-loglevel", "error"])
            .args(["-progress", "pipe:1"])
            .arg(manifest_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child must not outlive a cancelled pipeline task, or it
            // keeps writing into a directory deletion is about to remove.
            .kill_on_drop(true);

        debug!(input = %input.display(), manifest = %manifest_path.display(), "launching ffmpeg");

        let mut child = command.spawn().map_err(|e| {
            PipelineError::Transcode(format!("failed to spawn {}: {}", self.ffmpeg_path, e))
        })?;

        // Progress lines stream on stdout while stderr collects diagnostics;
        // both must be drained concurrently or ffmpeg can block on a full pipe.
        let stdout = child.stdout.take();
        let re = self.out_time.clone();
        let reporter = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(position) = out_time_secs(&re, &line) {
                    if duration_secs > 0.0 {
                        let percent = (position / duration_secs * 100.0).clamp(0.0, 100.0);
                        progress(percent.round() as u8);
                    }
                }
            }
        });

        let mut stderr_text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::Transcode(format!("ffmpeg did not exit cleanly: {}", e)))?;
        let _ = reporter.await;

        if !status.success() {
            let detail = stderr_text.trim();
            let message = if detail.is_empty() {
                format!("ffmpeg exited with {}", status)
            } else {
                detail.chars().take(2000).collect()
            };
            return Err(PipelineError::Transcode(message));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_time_parsing() {
        let t = FfmpegTranscoder::new("ffmpeg");
        assert_eq!(out_time_secs(&t.out_time, "out_time_ms=12000000"), Some(12.0));
        assert_eq!(out_time_secs(&t.out_time, "out_time_ms=500000"), Some(0.5));
        assert_eq!(out_time_secs(&t.out_time, "out_time=00:00:12.000000"), None);
        assert_eq!(out_time_secs(&t.out_time, "frame=300"), None);
        assert_eq!(out_time_secs(&t.out_time, "progress=end"), None);
    }

    #[test]
    fn test_cancellation_kills_spawned_process() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;
        use std::time::Duration;

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            // Stands in for a long-running encode: sleeps, then writes.
            let script = dir.path().join("slow-transcoder.sh");
            std::fs::write(
                &script,
                "#!/bin/sh\nsleep 1\ntouch \"$(dirname \"$0\")/late-write\"\n",
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let manifest = dir.path().join("playlist.m3u8");
            let pattern = dir.path().join("segment_%03d.ts");
            let transcoder = FfmpegTranscoder::new(script.to_string_lossy().into_owned());
            let task = tokio::spawn(async move {
                let _ = transcoder
                    .transcode_to_hls(
                        Path::new("in.mp4"),
                        &manifest,
                        &pattern,
                        10.0,
                        Arc::new(|_| {}),
                    )
                    .await;
            });

            tokio::time::sleep(Duration::from_millis(200)).await;
            task.abort();
            let _ = task.await;

            // Past the point where a surviving process would have written.
            tokio::time::sleep(Duration::from_millis(1300)).await;
            assert!(
                !dir.path().join("late-write").exists(),
                "transcoder process outlived cancellation"
            );
        });
    }

    #[test]
    fn test_spawn_failure_surfaces_as_transcode_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let t = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary");
        let err = rt
            .block_on(t.transcode_to_hls(
                Path::new("in.mp4"),
                Path::new("/tmp/out/playlist.m3u8"),
                Path::new("/tmp/out/segment_%03d.ts"),
                10.0,
                std::sync::Arc::new(|_| {}),
            ))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transcode(_)));
    }
}

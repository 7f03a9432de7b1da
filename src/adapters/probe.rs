//! Source file analysis via libav bindings.
//!
//! Opening the container is blocking work, so it runs on the blocking
//! thread pool. Duration falls back to 0 when the container does not
//! report one; a file that cannot be opened at all is a probe failure,
//! which aborts ingestion before any job row is written.

use std::path::Path;

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use tokio::task;

use crate::domain::video::ProbedMetadata;
use crate::error::{PipelineError, Result};
use crate::ports::media::MediaProber;

#[derive(Clone, Copy)]
pub struct FfmpegProber;

#[async_trait]
impl MediaProber for FfmpegProber {
    async fn probe(&self, path: &Path) -> Result<ProbedMetadata> {
        let path = path.to_path_buf();

        task::spawn_blocking(move || {
            ffmpeg::init().map_err(|e| PipelineError::Probe(e.to_string()))?;

            let file_size = std::fs::metadata(&path)?.len();
            let context = ffmpeg::format::input(&path)
                .map_err(|e| PipelineError::Probe(format!("{}: {}", path.display(), e)))?;

            let duration_secs = if context.duration() > 0 {
                context.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
            } else {
                0.0
            };

            let mut width = 0u32;
            let mut height = 0u32;
            let mut video_codec = String::from("unknown");
            let mut audio_codec = String::from("unknown");

            if let Some(stream) = context.streams().best(ffmpeg::media::Type::Video) {
                let params = stream.parameters();
                video_codec = format!("{:?}", params.id()).to_lowercase();
                if let Ok(decoder) = ffmpeg::codec::context::Context::from_parameters(params)
                    .and_then(|ctx| ctx.decoder().video())
                {
                    width = decoder.width();
                    height = decoder.height();
                }
            }

            if let Some(stream) = context.streams().best(ffmpeg::media::Type::Audio) {
                audio_codec = format!("{:?}", stream.parameters().id()).to_lowercase();
            }

            Ok(ProbedMetadata {
                duration_secs,
                file_size,
                width,
                height,
                video_codec,
                audio_codec,
            })
        })
        .await
        .map_err(|e| PipelineError::Probe(format!("probe task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_file_is_an_error() {
        let err = FfmpegProber
            .probe(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        // Fails on the metadata call before libav ever opens it.
        assert!(matches!(err, PipelineError::Io(_)));
    }
}

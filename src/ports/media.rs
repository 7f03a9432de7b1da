//! Outbound ports for the external media toolchain.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::video::ProbedMetadata;
use crate::error::Result;

/// Fractional progress callback, called with 0..=100. The adapter reports
/// whatever granularity the tool emits; throttling is the caller's job.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Extracts duration, dimensions and codec names without decoding.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbedMetadata>;
}

/// Converts one input file into a single HLS rendition (playlist plus
/// transport-stream segments) with a fixed browser-compatible profile.
///
/// The call resolves exactly once. Failures carry a human-readable message
/// only; callers treat every failure identically and a failed run's
/// partial output is unusable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode_to_hls(
        &self,
        input: &Path,
        manifest_path: &Path,
        segment_pattern: &Path,
        duration_secs: f64,
        progress: ProgressSink,
    ) -> Result<()>;
}

//! Error taxonomy for the ingestion pipeline.
//!
//! Synchronous validation failures are reported to the uploading client;
//! everything that happens after the upload response is only observable
//! through the job's `status` field.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad client input, rejected before any job is created.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A non-failed video already exists for this (series, episode) pair.
    #[error("a video for this series and episode already exists")]
    Conflict,

    /// The source file could not be analyzed. Aborts before a job row is
    /// written; the relocated file stays on disk.
    #[error("probe failed: {0}")]
    Probe(String),

    /// The external transcoder reported an error or exited non-zero.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// The playlist was absent or unreadable after the transcoder
    /// reported success.
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Video ingestion service: accepts episode uploads over HTTP, probes
//! them, transcodes to HLS with an external ffmpeg, and serves the
//! resulting playlists and segments.
//!
//! The crate follows a hexagonal layout. `domain` holds the pure rules
//! (naming layout, playlist repair, segment math), `ports` the async
//! traits the application depends on, `adapters` the concrete backends
//! (PostgreSQL, ffmpeg, HTTP), and `application` the ingestion
//! orchestrator that ties them together.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

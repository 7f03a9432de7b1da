//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Server configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Staging directory for in-flight uploads
    pub upload_dir: PathBuf,
    /// Root directory for per-episode HLS output
    pub segments_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// ffmpeg binary, overridable for non-system installs
    pub ffmpeg_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| String::from("postgres://localhost/ozu")),
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| String::from("uploads")),
            ),
            segments_dir: PathBuf::from(
                env::var("SEGMENTS_DIR").unwrap_or_else(|_| String::from("segments")),
            ),
            max_upload_bytes: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024 * 1024),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| String::from("ffmpeg")),
        }
    }
}

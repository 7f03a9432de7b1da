use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ozu::adapters::ffmpeg::FfmpegTranscoder;
use ozu::adapters::http::rate_limit::RateLimiter;
use ozu::adapters::http::{self, AppState};
use ozu::adapters::postgres::PgVideoRepository;
use ozu::adapters::probe::FfmpegProber;
use ozu::application::ingest::IngestService;
use ozu::config::Config;
use ozu::ports::media::{MediaProber, Transcoder};
use ozu::ports::repository::VideoRepository;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env());
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.segments_dir).await?;

    let repo: Arc<dyn VideoRepository> =
        Arc::new(PgVideoRepository::connect(&config.database_url).await?);
    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path));
    let prober: Arc<dyn MediaProber> = Arc::new(FfmpegProber);

    let ingest = IngestService::new(
        Arc::clone(&repo),
        transcoder,
        prober,
        config.segments_dir.clone(),
    );

    // 30 polls per client per 10 seconds, table capped at 10k clients.
    let limiter = Arc::new(RateLimiter::new(30, Duration::from_secs(10), 10_000));

    let state = AppState {
        ingest,
        repo,
        config: Arc::clone(&config),
        limiter,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind((config.addr.as_str(), config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        segments_dir = %config.segments_dir.display(),
        "video service listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

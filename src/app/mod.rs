//! Service wiring: configuration, collaborators, API server.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::ApiServer;
use crate::config::Config;
use crate::directory::HttpUserDirectory;
use crate::global;
use crate::orchestrator::Orchestrator;
use crate::pipeline::FfmpegTranscoder;
use crate::provider::HttpRtcProvider;
use crate::registry::SqliteRegistry;
use crate::storage::HttpObjectStore;

pub async fn run_service() -> Result<()> {
    let mut config = Config::load()?;
    config.apply_env();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider.request_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let provider = Arc::new(HttpRtcProvider::new(client.clone(), &config));
    let registry = Arc::new(SqliteRegistry::open(&global::registry_file()?)?);
    let storage = Arc::new(HttpObjectStore::new(client.clone(), &config.storage));
    let directory = Arc::new(HttpUserDirectory::new(client, &config.directory));

    let transcoder = FfmpegTranscoder::new();
    if !transcoder.is_available().await {
        warn!("ffmpeg not found on PATH; recording conversions will fail");
    }

    let orchestrator = Orchestrator::new(
        &config,
        provider,
        registry,
        storage,
        directory,
        Arc::new(transcoder),
    )?;

    info!("Orchestrator ready (app id: {})", config.provider.app_id);

    ApiServer::new(Arc::new(orchestrator), &config.server)
        .start()
        .await
}

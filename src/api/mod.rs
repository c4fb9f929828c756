//! REST API server for VoxRelay.
//!
//! Provides HTTP endpoints for:
//! - Join-token issuance
//! - Channel overview and registration
//! - Recording control (request, start, stop, auto-start)
//! - Archived-recording lookup
//! - User directory listing

pub mod error;
pub mod routes;

use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub use error::{ApiError, ApiResult};

pub struct ApiServer {
    bind: String,
    port: u16,
    orchestrator: Arc<Orchestrator>,
}

impl ApiServer {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &ServerConfig) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            orchestrator,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            // Root and version endpoints
            .route("/", get(status))
            .route("/version", get(version))
            // Orchestrator surface
            .nest("/api/token", routes::token::router(Arc::clone(&self.orchestrator)))
            .nest(
                "/api/channels",
                routes::channels::router(Arc::clone(&self.orchestrator)),
            )
            .nest(
                "/api/recording",
                routes::recording::router(Arc::clone(&self.orchestrator)),
            )
            .nest("/api/users", routes::users::router(self.orchestrator))
            .layer(ServiceBuilder::new());

        let listener =
            tokio::net::TcpListener::bind(&format!("{}:{}", self.bind, self.port)).await?;

        info!("API server listening on http://{}:{}", self.bind, self.port);
        info!("Endpoints:");
        info!("  GET  /                        - Service info");
        info!("  GET  /version                 - Get version info");
        info!("  GET  /api/token/new           - Mint a join token");
        info!("  GET  /api/channels/list       - Reconciled channel overview");
        info!("  POST /api/channels            - Register a channel");
        info!("  GET  /api/recording/request   - Reserve recording capacity");
        info!("  GET  /api/recording/start     - Start a recording");
        info!("  GET  /api/recording/stop      - Stop, convert, and archive");
        info!("  POST /api/recording/auto-start - Record a target participant");
        info!("  GET  /api/recording/file      - Archived MP3 for a channel");
        info!("  GET  /api/users/list          - List directory users");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "voxrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "voxrelay"
    }))
}

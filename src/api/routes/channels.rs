//! Channel listing and registration endpoints.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub title: String,
    pub host_uid: String,
}

pub fn router(state: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/list", get(list_channels))
        .route("/", post(create_channel))
        .with_state(state)
}

/// Reconciled view over the provider, the registry, and the archive:
/// `{live, recorded}`. Always answers, possibly partially.
async fn list_channels(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    let sets = orchestrator.channel_overview().await;
    Json(json!({ "channels": sets }))
}

async fn create_channel(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<CreateChannelRequest>,
) -> ApiResult<Json<Value>> {
    let id = orchestrator
        .create_channel(&request.title, &request.host_uid)
        .await?;
    Ok(Json(json!({ "id": id })))
}

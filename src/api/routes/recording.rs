//! Recording control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Reserving recording capacity (GET /request)
//! - Starting and stopping a recording (GET /start, GET /stop)
//! - The auto-start workflow (POST /auto-start)
//! - Looking up a channel's archived MP3 (GET /file)

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Deserialize)]
pub struct RequestQuery {
    pub channel: String,
    pub token: String,
    pub uid: String,
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub channel: String,
    pub resource_id: String,
    pub token: String,
    pub uid: String,
    #[serde(default)]
    pub target_uid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopQuery {
    pub channel: String,
    pub resource_id: String,
    pub sid: String,
    pub uid: String,
}

#[derive(Debug, Deserialize)]
pub struct AutoStartRequest {
    pub channel: String,
    pub target_uid: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub channel: String,
}

pub fn router(state: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/request", get(request_recording))
        .route("/start", get(start_recording))
        .route("/stop", get(stop_recording))
        .route("/auto-start", post(auto_start))
        .route("/file", get(recorded_file))
        .with_state(state)
}

async fn request_recording(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<RequestQuery>,
) -> ApiResult<Json<Value>> {
    let resource_id = orchestrator
        .request_recording(&query.channel, &query.uid, &query.token)
        .await?;
    Ok(Json(json!({ "resourceId": resource_id })))
}

async fn start_recording(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<StartQuery>,
) -> ApiResult<Json<Value>> {
    let sid = orchestrator
        .start_recording(
            &query.resource_id,
            &query.channel,
            &query.token,
            &query.uid,
            query.target_uid.clone(),
        )
        .await?;
    Ok(Json(json!({
        "resourceId": query.resource_id,
        "sid": sid,
    })))
}

/// Stops the recording, then converts and archives it. The provider's
/// stop payload comes back alongside the archive key.
async fn stop_recording(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<StopQuery>,
) -> ApiResult<Json<Value>> {
    let outcome = orchestrator
        .stop_recording(&query.resource_id, &query.sid, &query.channel, &query.uid)
        .await?;
    Ok(Json(json!({
        "provider": outcome.provider_response,
        "archivedKey": outcome.archived_key,
    })))
}

async fn auto_start(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<AutoStartRequest>,
) -> ApiResult<Json<Value>> {
    info!(
        "Auto-start requested for target {} on '{}'",
        request.target_uid, request.channel
    );
    let outcome = orchestrator
        .auto_start(&request.channel, &request.target_uid)
        .await?;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

async fn recorded_file(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<Value>> {
    let file = orchestrator
        .recorded_file(&query.channel)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no recording archived for '{}'", query.channel))
        })?;
    Ok(Json(json!({ "key": file.key, "url": file.url })))
}

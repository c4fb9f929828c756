//! User directory endpoint.

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::orchestrator::Orchestrator;

pub fn router(state: Arc<Orchestrator>) -> Router {
    Router::new().route("/list", get(list_users)).with_state(state)
}

/// Every non-admin directory user, concatenated across directory pages.
async fn list_users(State(orchestrator): State<Arc<Orchestrator>>) -> ApiResult<Json<Value>> {
    let users = orchestrator.list_users().await?;
    Ok(Json(json!({ "users": users })))
}

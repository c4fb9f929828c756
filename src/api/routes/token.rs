//! Join-token issuance endpoint.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::orchestrator::Orchestrator;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub channel: String,
    #[serde(default = "default_uid")]
    pub uid: String,
}

fn default_uid() -> String {
    "0".to_string()
}

pub fn router(state: Arc<Orchestrator>) -> Router {
    Router::new().route("/new", get(new_token)).with_state(state)
}

/// Mints a join token for `uid` on `channel`. `is_host` reports whether
/// the caller would be first into the channel.
async fn new_token(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<TokenQuery>,
) -> Json<Value> {
    info!("Token requested for uid {} on '{}'", query.uid, query.channel);
    let grant = orchestrator.issue_token(&query.uid, &query.channel).await;
    Json(json!({
        "token": grant.token,
        "is_host": grant.is_host,
    }))
}

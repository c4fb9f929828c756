//! Error taxonomy for the orchestration core.
//!
//! External collaborators surface raw (status + body, never retried here);
//! the API layer owns user-facing translation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A collaborator answered with a non-success status. Body is kept intact.
    #[error("{service} returned status {status}: {body}")]
    ExternalService {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect failure, timeout).
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("no free requester uid after {attempts} attempts (pool size {pool_size})")]
    AllocationExhausted { attempts: u32, pool_size: u32 },

    #[error("target uid {target_uid} is not present in channel '{channel}'")]
    PreconditionFailed { channel: String, target_uid: String },

    #[error("conversion for channel '{channel}' failed: {reason}")]
    ConversionFailed { channel: String, reason: String },

    /// Stop was rejected after a successful start. The provider-side
    /// recording is still running and must be reaped by an operator.
    #[error("recording leaked on channel '{channel}' (resource {resource_id}, sid {sid}): {detail}")]
    RecordingLeaked {
        channel: String,
        resource_id: String,
        sid: String,
        detail: String,
    },

    #[error("invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("channel registry error: {0}")]
    Registry(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

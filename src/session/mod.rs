//! Recording session lifecycle.
//!
//! Drives acquire → start → stop against the provider's recording
//! service. Sessions are ephemeral: one per recording, discarded once
//! stop completes or fails terminally. Steps are strictly sequential;
//! each consumes the previous step's output.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::OrchestratorError;
use crate::provider::{AudioSubscription, RtcProvider, StartParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Acquired,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Acquired => "acquired",
            SessionState::Starting => "starting",
            SessionState::Started => "started",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub channel_name: String,
    pub requester_uid: String,
    /// Present for sessions that still have to start; stop does not need it.
    pub requester_token: Option<String>,
    pub target_uid: Option<String>,
    pub resource_id: Option<String>,
    pub sid: Option<String>,
    state: SessionState,
}

impl RecordingSession {
    pub fn new(
        channel_name: impl Into<String>,
        requester_uid: impl Into<String>,
        requester_token: impl Into<String>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            requester_uid: requester_uid.into(),
            requester_token: Some(requester_token.into()),
            target_uid: None,
            resource_id: None,
            sid: None,
            state: SessionState::Idle,
        }
    }

    /// Record only the target participant's audio instead of every stream.
    pub fn with_target(mut self, target_uid: impl Into<String>) -> Self {
        self.target_uid = Some(target_uid.into());
        self
    }

    /// Rebuild a session the caller acquired earlier (stateless API surface).
    pub fn resume_acquired(
        channel_name: impl Into<String>,
        requester_uid: impl Into<String>,
        requester_token: impl Into<String>,
        target_uid: Option<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            requester_uid: requester_uid.into(),
            requester_token: Some(requester_token.into()),
            target_uid,
            resource_id: Some(resource_id.into()),
            sid: None,
            state: SessionState::Acquired,
        }
    }

    /// Rebuild a session that is already recording.
    pub fn resume_started(
        channel_name: impl Into<String>,
        requester_uid: impl Into<String>,
        resource_id: impl Into<String>,
        sid: impl Into<String>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            requester_uid: requester_uid.into(),
            requester_token: None,
            target_uid: None,
            resource_id: Some(resource_id.into()),
            sid: Some(sid.into()),
            state: SessionState::Started,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn subscription(&self) -> AudioSubscription {
        match &self.target_uid {
            Some(uid) => AudioSubscription::Single(uid.clone()),
            None => AudioSubscription::AllStreams,
        }
    }
}

pub struct SessionMachine {
    provider: Arc<dyn RtcProvider>,
}

impl SessionMachine {
    pub fn new(provider: Arc<dyn RtcProvider>) -> Self {
        Self { provider }
    }

    /// Idle → Acquired. A provider rejection poisons the session and
    /// surfaces the raw error.
    pub async fn acquire(
        &self,
        session: &mut RecordingSession,
    ) -> Result<String, OrchestratorError> {
        if session.state != SessionState::Idle {
            return Err(OrchestratorError::InvalidTransition(format!(
                "acquire from '{}'",
                session.state.as_str()
            )));
        }

        session.state = SessionState::Acquiring;
        match self
            .provider
            .acquire_resource(&session.channel_name, &session.requester_uid)
            .await
        {
            Ok(resource_id) => {
                info!(
                    "Acquired recording resource for '{}' (requester {})",
                    session.channel_name, session.requester_uid
                );
                session.resource_id = Some(resource_id.clone());
                session.state = SessionState::Acquired;
                Ok(resource_id)
            }
            Err(e) => {
                session.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Acquired → Started. No retry here: re-acquiring is the caller's call.
    pub async fn start(
        &self,
        session: &mut RecordingSession,
    ) -> Result<String, OrchestratorError> {
        if session.state != SessionState::Acquired {
            return Err(OrchestratorError::InvalidTransition(format!(
                "start from '{}'",
                session.state.as_str()
            )));
        }
        let resource_id = session
            .resource_id
            .clone()
            .ok_or_else(|| OrchestratorError::InvalidTransition("start without resource id".into()))?;
        let token = session
            .requester_token
            .clone()
            .ok_or_else(|| OrchestratorError::InvalidTransition("start without join token".into()))?;

        session.state = SessionState::Starting;
        let params = StartParams {
            token,
            subscription: session.subscription(),
        };
        match self
            .provider
            .start_recording(
                &resource_id,
                &session.channel_name,
                &session.requester_uid,
                &params,
            )
            .await
        {
            Ok(started) => {
                info!(
                    "Recording started on '{}' (sid {})",
                    session.channel_name, started.sid
                );
                session.sid = Some(started.sid.clone());
                session.state = SessionState::Started;
                Ok(started.sid)
            }
            Err(e) => {
                session.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Started → Stopped. A rejected stop leaves the provider-side
    /// recording running: that is the `RecordingLeaked` class, surfaced
    /// distinctly so operators can reap the session.
    pub async fn stop(
        &self,
        session: &mut RecordingSession,
    ) -> Result<Value, OrchestratorError> {
        if session.state != SessionState::Started {
            return Err(OrchestratorError::InvalidTransition(format!(
                "stop from '{}'",
                session.state.as_str()
            )));
        }
        let resource_id = session
            .resource_id
            .clone()
            .ok_or_else(|| OrchestratorError::InvalidTransition("stop without resource id".into()))?;
        let sid = session
            .sid
            .clone()
            .ok_or_else(|| OrchestratorError::InvalidTransition("stop without sid".into()))?;

        session.state = SessionState::Stopping;
        match self
            .provider
            .stop_recording(&resource_id, &sid, &session.channel_name, &session.requester_uid)
            .await
        {
            Ok(payload) => {
                info!(
                    "Recording stopped on '{}' (sid {})",
                    session.channel_name, sid
                );
                session.state = SessionState::Stopped;
                Ok(payload)
            }
            Err(e) => {
                session.state = SessionState::Failed;
                let leak = OrchestratorError::RecordingLeaked {
                    channel: session.channel_name.clone(),
                    resource_id,
                    sid,
                    detail: e.to_string(),
                };
                error!("{leak}");
                Err(leak)
            }
        }
    }
}

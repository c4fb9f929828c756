//! RTC provider REST client.
//!
//! Covers the provider surface the orchestrator consumes:
//! - channel directory (list, per-channel presence)
//! - cloud recording protocol: acquire → start → stop
//!
//! Payload shapes are passed through largely unmodified; callers receive
//! the provider's raw error body on any non-success answer.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub mod token;

use crate::config::Config;
use crate::error::OrchestratorError;

/// Wildcard accepted by the provider for "subscribe to every audio stream".
pub const ALL_STREAMS: &str = "#allstream#";

const SERVICE: &str = "rtc provider";

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderChannel {
    pub channel_name: String,
    pub user_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelPresence {
    #[serde(default)]
    pub channel_exist: bool,
    #[serde(default)]
    pub users: Vec<u32>,
}

/// Audio-subscription filter for a recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSubscription {
    AllStreams,
    Single(String),
}

impl AudioSubscription {
    fn uid_list(&self) -> Vec<String> {
        match self {
            AudioSubscription::AllStreams => vec![ALL_STREAMS.to_string()],
            AudioSubscription::Single(uid) => vec![uid.clone()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartParams {
    pub token: String,
    pub subscription: AudioSubscription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartedRecording {
    pub sid: String,
}

#[async_trait]
pub trait RtcProvider: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<ProviderChannel>, OrchestratorError>;

    async fn channel_presence(&self, channel: &str)
        -> Result<ChannelPresence, OrchestratorError>;

    async fn acquire_resource(
        &self,
        channel: &str,
        uid: &str,
    ) -> Result<String, OrchestratorError>;

    async fn start_recording(
        &self,
        resource_id: &str,
        channel: &str,
        uid: &str,
        params: &StartParams,
    ) -> Result<StartedRecording, OrchestratorError>;

    /// Returns the provider's stop payload verbatim; the caller decides
    /// what (if anything) to extract from it.
    async fn stop_recording(
        &self,
        resource_id: &str,
        sid: &str,
        channel: &str,
        uid: &str,
    ) -> Result<Value, OrchestratorError>;
}

// Wire shapes for the recording protocol.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageTarget {
    vendor: u32,
    region: u32,
    bucket: String,
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingSpec {
    max_idle_time: u32,
    channel_type: u32,
    stream_types: u32,
    subscribe_audio_uids: Vec<String>,
    subscribe_uid_group: u32,
    stream_mode: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartConfig {
    token: String,
    storage_config: StorageTarget,
    recording_config: RecordingSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcquireRequest<'a> {
    scene: u32,
    region: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcquireBody<'a> {
    cname: &'a str,
    uid: &'a str,
    client_request: AcquireRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    cname: &'a str,
    uid: &'a str,
    client_request: StartConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest {
    async_stop: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopBody<'a> {
    cname: &'a str,
    uid: &'a str,
    client_request: StopRequest,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelListData {
    #[serde(default)]
    channels: Vec<ProviderChannel>,
}

#[derive(Debug, Deserialize)]
struct ChannelListEnvelope {
    #[serde(default)]
    data: ChannelListData,
}

#[derive(Debug, Deserialize)]
struct PresenceEnvelope {
    #[serde(default)]
    data: ChannelPresence,
}

#[derive(Debug, Deserialize)]
struct AcquireResponse {
    #[serde(rename = "resourceId")]
    resource_id: String,
}

/// REST implementation over the provider's HTTP API.
pub struct HttpRtcProvider {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    auth_header: String,
    channel_page_size: u32,
    max_idle_time: u32,
    acquire_region: String,
    storage: StorageTargetSettings,
}

#[derive(Debug, Clone)]
struct StorageTargetSettings {
    vendor: u32,
    region: u32,
    bucket: String,
    access_key: String,
    secret_key: String,
}

impl HttpRtcProvider {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        let credentials = format!(
            "{}:{}",
            config.provider.rest_key, config.provider.rest_secret
        );
        Self {
            client,
            base_url: config.provider.base_url.trim_end_matches('/').to_string(),
            app_id: config.provider.app_id.clone(),
            auth_header: format!("Basic {}", BASE64.encode(credentials)),
            channel_page_size: config.provider.channel_page_size,
            max_idle_time: config.recording.max_idle_time,
            acquire_region: config.recording.region.clone(),
            storage: StorageTargetSettings {
                vendor: config.storage.vendor,
                region: config.storage.region_code,
                bucket: config.storage.bucket.clone(),
                access_key: config.storage.access_key.clone(),
                secret_key: config.storage.secret_key.clone(),
            },
        }
    }

    fn start_config(&self, params: &StartParams) -> StartConfig {
        StartConfig {
            token: params.token.clone(),
            storage_config: StorageTarget {
                vendor: self.storage.vendor,
                region: self.storage.region,
                bucket: self.storage.bucket.clone(),
                access_key: self.storage.access_key.clone(),
                secret_key: self.storage.secret_key.clone(),
            },
            recording_config: RecordingSpec {
                max_idle_time: self.max_idle_time,
                channel_type: 0,
                stream_types: 0,
                subscribe_audio_uids: params.subscription.uid_list(),
                subscribe_uid_group: 0,
                stream_mode: "original".to_string(),
            },
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, OrchestratorError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| OrchestratorError::Transport {
                service: SERVICE,
                source,
            })?;
        read_json(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &impl Serialize,
    ) -> Result<T, OrchestratorError> {
        debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(body)
            .send()
            .await
            .map_err(|source| OrchestratorError::Transport {
                service: SERVICE,
                source,
            })?;
        read_json(response).await
    }
}

/// Non-2xx and malformed bodies both surface as the provider's raw answer.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, OrchestratorError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| OrchestratorError::Transport {
            service: SERVICE,
            source,
        })?;

    if !status.is_success() {
        return Err(OrchestratorError::ExternalService {
            service: SERVICE,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|_| OrchestratorError::ExternalService {
        service: SERVICE,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RtcProvider for HttpRtcProvider {
    async fn list_channels(&self) -> Result<Vec<ProviderChannel>, OrchestratorError> {
        let url = format!(
            "{}/dev/v1/channel/{}?page_size={}",
            self.base_url, self.app_id, self.channel_page_size
        );
        let envelope: ChannelListEnvelope = self.get_json(url).await?;
        Ok(envelope.data.channels)
    }

    async fn channel_presence(
        &self,
        channel: &str,
    ) -> Result<ChannelPresence, OrchestratorError> {
        let url = format!(
            "{}/dev/v1/channel/user/{}/{}",
            self.base_url, self.app_id, channel
        );
        let envelope: PresenceEnvelope = self.get_json(url).await?;
        Ok(envelope.data)
    }

    async fn acquire_resource(
        &self,
        channel: &str,
        uid: &str,
    ) -> Result<String, OrchestratorError> {
        let url = format!("{}/v1/apps/{}/cloud_recording/acquire", self.base_url, self.app_id);
        let body = AcquireBody {
            cname: channel,
            uid,
            client_request: AcquireRequest {
                scene: 0,
                region: &self.acquire_region,
            },
        };
        let response: AcquireResponse = self.post_json(url, &body).await?;
        Ok(response.resource_id)
    }

    async fn start_recording(
        &self,
        resource_id: &str,
        channel: &str,
        uid: &str,
        params: &StartParams,
    ) -> Result<StartedRecording, OrchestratorError> {
        let url = format!(
            "{}/v1/apps/{}/cloud_recording/resourceid/{}/mode/individual/start",
            self.base_url, self.app_id, resource_id
        );
        let body = StartBody {
            cname: channel,
            uid,
            client_request: self.start_config(params),
        };
        self.post_json(url, &body).await
    }

    async fn stop_recording(
        &self,
        resource_id: &str,
        sid: &str,
        channel: &str,
        uid: &str,
    ) -> Result<Value, OrchestratorError> {
        let url = format!(
            "{}/v1/apps/{}/cloud_recording/resourceid/{}/sid/{}/mode/individual/stop",
            self.base_url, self.app_id, resource_id, sid
        );
        let body = StopBody {
            cname: channel,
            uid,
            client_request: StopRequest { async_stop: false },
        };
        self.post_json(url, &body).await
    }
}

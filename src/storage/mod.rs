//! Object-storage gateway client.
//!
//! Listing returns keys with time-limited signed URLs; downloads go
//! through those URLs directly. Uploads overwrite existing keys.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::OrchestratorError;

const SERVICE: &str = "object storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    #[serde(rename = "signedUrl")]
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredObject>, OrchestratorError>;

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), OrchestratorError>;

    /// Fetch `url` into `dest`, streaming chunks to disk.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), OrchestratorError>;
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    objects: Vec<StoredObject>,
}

pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key: String,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, config: &StorageConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            access_key: config.access_key.clone(),
        }
    }

    fn objects_url(&self) -> String {
        format!("{}/v1/buckets/{}/objects", self.endpoint, self.bucket)
    }
}

fn transport(source: reqwest::Error) -> OrchestratorError {
    OrchestratorError::Transport {
        service: SERVICE,
        source,
    }
}

async fn fail_on_status(response: reqwest::Response) -> Result<reqwest::Response, OrchestratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OrchestratorError::ExternalService {
        service: SERVICE,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredObject>, OrchestratorError> {
        let mut request = self
            .client
            .get(self.objects_url())
            .bearer_auth(&self.access_key);
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }

        let response = fail_on_status(request.send().await.map_err(transport)?).await?;
        let envelope: ListEnvelope = response.json().await.map_err(transport)?;
        debug!("Listed {} archive objects", envelope.objects.len());
        Ok(envelope.objects)
    }

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<(), OrchestratorError> {
        let bytes = tokio::fs::read(source).await?;
        debug!("Uploading {} ({} bytes) as {key}", source.display(), bytes.len());

        let response = self
            .client
            .put(format!("{}/{}", self.objects_url(), key))
            .bearer_auth(&self.access_key)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        fail_on_status(response).await?;
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), OrchestratorError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let mut response = fail_on_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

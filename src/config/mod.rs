use crate::error::OrchestratorError;
use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub directory: DirectoryConfig,
    pub recording: RecordingConfig,
    pub server: ServerConfig,
}

/// RTC provider credentials and REST endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub app_id: String,
    pub app_certificate: String,
    pub rest_key: String,
    pub rest_secret: String,
    pub base_url: String,
    pub token_expiry_seconds: u64,
    pub request_timeout_seconds: u64,
    pub channel_page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_certificate: String::new(),
            rest_key: String::new(),
            rest_secret: String::new(),
            base_url: "https://api.agora.io".to_string(),
            token_expiry_seconds: 3600 * 24,
            request_timeout_seconds: 15,
            channel_page_size: 500,
        }
    }
}

/// Archive bucket settings. `vendor` and `region_code` are the provider's
/// numeric identifiers for the bucket vendor, passed through in the
/// recording start payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub vendor: u32,
    pub region_code: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            vendor: 1,
            region_code: 25,
        }
    }
}

/// User directory (identity store) client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub endpoint: String,
    pub api_key: String,
    pub page_size: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Seconds the provider keeps recording an empty channel before
    /// stopping on its own.
    pub max_idle_time: u32,
    /// Acquire region hint, passed through verbatim.
    pub region: String,
    /// Upper bound (exclusive) of the requester uid draw.
    pub uid_pool_size: u32,
    /// Allocation gives up after this many redraws.
    pub max_alloc_attempts: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_idle_time: 30,
            region: "EU".to_string(),
            uid_pool_size: 10_000,
            max_alloc_attempts: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay credentials from the environment so deployments never have
    /// to write secrets into the config file.
    pub fn apply_env(&mut self) {
        overlay(&mut self.provider.app_id, "VOXRELAY_APP_ID");
        overlay(&mut self.provider.app_certificate, "VOXRELAY_APP_CERTIFICATE");
        overlay(&mut self.provider.rest_key, "VOXRELAY_REST_KEY");
        overlay(&mut self.provider.rest_secret, "VOXRELAY_REST_SECRET");
        overlay(&mut self.storage.access_key, "VOXRELAY_STORAGE_ACCESS_KEY");
        overlay(&mut self.storage.secret_key, "VOXRELAY_STORAGE_SECRET_KEY");
        overlay(&mut self.storage.bucket, "VOXRELAY_STORAGE_BUCKET");
        overlay(&mut self.directory.api_key, "VOXRELAY_DIRECTORY_API_KEY");
    }

    /// Credential validation happens here, at construction time, so a bad
    /// deployment fails with an error value instead of a process exit.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.provider.app_id.is_empty() {
            return Err(OrchestratorError::Config(
                "provider.app_id is not set".to_string(),
            ));
        }
        if self.provider.app_certificate.is_empty() {
            return Err(OrchestratorError::Config(
                "provider.app_certificate is not set".to_string(),
            ));
        }
        if self.provider.rest_key.is_empty() || self.provider.rest_secret.is_empty() {
            return Err(OrchestratorError::Config(
                "provider.rest_key / provider.rest_secret are not set".to_string(),
            ));
        }
        if self.recording.uid_pool_size == 0 {
            return Err(OrchestratorError::Config(
                "recording.uid_pool_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

fn overlay(field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

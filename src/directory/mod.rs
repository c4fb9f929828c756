//! User directory client.
//!
//! The identity store pages its listing with an opaque cursor. Pages are
//! consumed lazily through `UserPages`, so very large directories never
//! grow the call stack and a caller can stop early.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::error::OrchestratorError;

const SERVICE: &str = "user directory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPage {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch one page; `None` token means the first page.
    async fn fetch_page(&self, page_token: Option<&str>)
        -> Result<UserPage, OrchestratorError>;
}

/// Lazy, restartable page sequence over a directory.
pub struct UserPages<'a> {
    directory: &'a dyn UserDirectory,
    cursor: Option<String>,
    done: bool,
}

impl<'a> UserPages<'a> {
    pub fn new(directory: &'a dyn UserDirectory) -> Self {
        Self {
            directory,
            cursor: None,
            done: false,
        }
    }

    /// Next page of users, or `None` once the directory is drained.
    /// An error ends the sequence; restart by constructing a new cursor.
    pub async fn next_page(
        &mut self,
    ) -> Option<Result<Vec<DirectoryUser>, OrchestratorError>> {
        if self.done {
            return None;
        }
        match self.directory.fetch_page(self.cursor.as_deref()).await {
            Ok(page) => {
                self.cursor = page.next_page_token;
                if self.cursor.is_none() {
                    self.done = true;
                }
                Some(Ok(page.users))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Concatenate every page, excluding admin accounts.
pub async fn list_all_users(
    directory: &dyn UserDirectory,
) -> Result<Vec<DirectoryUser>, OrchestratorError> {
    let mut pages = UserPages::new(directory);
    let mut users = Vec::new();
    while let Some(page) = pages.next_page().await {
        users.extend(page?.into_iter().filter(|u| !u.admin));
    }
    Ok(users)
}

/// REST implementation over the directory gateway.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    page_size: u32,
}

impl HttpUserDirectory {
    pub fn new(client: reqwest::Client, config: &DirectoryConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn fetch_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<UserPage, OrchestratorError> {
        let url = format!("{}/v1/users", self.endpoint);
        debug!("GET {url} (page_token: {page_token:?})");

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("page_size", self.page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|source| OrchestratorError::Transport {
                service: SERVICE,
                source,
            })?;

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
}

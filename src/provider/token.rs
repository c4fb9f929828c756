//! Join-token minting.
//!
//! A compact signed grant over (app, channel, uid, role, expiry). The
//! provider only checks the signature against the shared certificate, so
//! the token stays opaque to everything else in this service.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

const TOKEN_VERSION: &str = "007";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn code(&self) -> u8 {
        match self {
            Role::Publisher => 1,
            Role::Subscriber => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenMinter {
    app_id: String,
    app_certificate: String,
    expiry_seconds: u64,
}

impl TokenMinter {
    pub fn new(
        app_id: impl Into<String>,
        app_certificate: impl Into<String>,
        expiry_seconds: u64,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_certificate: app_certificate.into(),
            expiry_seconds,
        }
    }

    pub fn build_token(&self, channel: &str, uid: &str, role: Role) -> String {
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.build_token_at(channel, uid, role, issued_at)
    }

    fn build_token_at(&self, channel: &str, uid: &str, role: Role, issued_at: u64) -> String {
        let expires_at = issued_at + self.expiry_seconds;
        let payload = format!(
            "{}:{}:{}:{}:{}",
            self.app_id,
            channel,
            uid,
            role.code(),
            expires_at
        );

        let mut hasher = Sha256::new();
        hasher.update(self.app_certificate.as_bytes());
        hasher.update(payload.as_bytes());
        let signature = BASE64.encode(hasher.finalize());

        format!(
            "{}{}",
            TOKEN_VERSION,
            BASE64.encode(format!("{signature}.{payload}"))
        )
    }
}

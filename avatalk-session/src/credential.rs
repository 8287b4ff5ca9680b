//! Access credential acquisition.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use avatalk_core::{Credential, CredentialConfig};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const MAX_TOKEN_SIZE: usize = 8 * 1024;

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch a fresh short-lived token. Called once per session start.
    async fn fetch(&self) -> Result<Credential>;
}

/// POSTs an empty body to the token endpoint and reads the plain-text reply.
pub struct HttpCredentialSource {
    client: Client,
    endpoint: String,
}

impl HttpCredentialSource {
    pub fn new(config: &CredentialConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SessionError::Credential(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<Credential> {
        let response = self
            .client
            .post(&self.endpoint)
            .send()
            .await
            .map_err(|e| SessionError::Credential(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Credential(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Credential(format!("Failed to read token: {}", e)))?;
        if body.len() > MAX_TOKEN_SIZE {
            return Err(SessionError::Credential("Token response too large".to_string()));
        }

        let credential = Credential::new(body);
        debug!("Fetched access token {}", credential.redacted());
        Ok(credential)
    }
}

/// A fixed token, for offline runs.
pub struct StaticCredentialSource(Credential);

impl StaticCredentialSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Credential::new(token))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}

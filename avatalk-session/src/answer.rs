//! Question-answering service client.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use avatalk_core::AnswerConfig;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const MAX_QUESTION_LEN: usize = 4_000;
const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Raw JSON response for `question`; reply extraction is the caller's job.
    async fn ask(&self, question: &str) -> Result<Value>;
}

pub struct HttpAnswerService {
    client: Client,
    endpoint: String,
}

impl HttpAnswerService {
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SessionError::Answer(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn ask(&self, question: &str) -> Result<Value> {
        if question.len() > MAX_QUESTION_LEN {
            return Err(SessionError::Answer(format!(
                "Question too long (max {} bytes)",
                MAX_QUESTION_LEN
            )));
        }
        debug!("Asking answer service ({} chars)", question.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "Query": question }))
            .send()
            .await
            .map_err(|e| SessionError::Answer(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Answer(format!(
                "Answer service returned {}",
                status
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_RESPONSE_SIZE as u64 {
                return Err(SessionError::Answer("Response too large".to_string()));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SessionError::Answer(format!("Failed to read response: {}", e)))?;
        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(SessionError::Answer("Response too large".to_string()));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Answer(format!("Response is not JSON: {}", e)))
    }
}

//! Anthropic Messages API client
//!
//! One synchronous request/response per flag group with a fixed timeout.
//! Every failure is reported as a [`DiagnosticsError`]; callers degrade to
//! a placeholder narrative instead of aborting the run.

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use vbc_common::config::DiagnosticsConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// No API key in the environment or configuration
    #[error("no API key configured (set ANTHROPIC_API_KEY)")]
    MissingApiKey,

    /// Connection or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Non-success HTTP status
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body was not the expected JSON
    #[error("failed to parse response: {message}")]
    Parse { message: String, raw: String },
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http_client: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(config: &DiagnosticsConfig) -> Result<Self, DiagnosticsError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DiagnosticsError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send one prompt and return the text of the first content block.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, DiagnosticsError> {
        let api_key = self.api_key.as_deref().ok_or(DiagnosticsError::MissingApiKey)?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending diagnostics request");

        let response = self
            .http_client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiagnosticsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| DiagnosticsError::Parse {
                message: e.to_string(),
                raw: body.clone(),
            })?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| DiagnosticsError::Parse {
                message: "response has no text content".to_string(),
                raw: body,
            })
    }

    fn transport_error(&self, err: reqwest::Error) -> DiagnosticsError {
        if err.is_timeout() {
            DiagnosticsError::Timeout(self.timeout_secs)
        } else {
            DiagnosticsError::Network(err.to_string())
        }
    }
}

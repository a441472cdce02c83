//! LLM second-pass extraction client.
//!
//! The second pass is a cross-check only: its output is diffed against
//! the deterministic parse and surfaced for operator review, never used
//! for constraint application. Concurrency against the endpoint is
//! bounded to respect rate limits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM response unparseable: {0}")]
    BadResponse(String),

    #[error("LLM request timed out")]
    Timeout,
}

/// One clause as the model reports it. Deliberately looser than the
/// deterministic clause: fields the model omits stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmClause {
    pub clause_id: String,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub section_ref: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// The model's whole answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmExtraction {
    #[serde(default)]
    pub clauses: Vec<LlmClause>,
    #[serde(default)]
    pub family_id: Option<String>,
}

/// Seam for the second pass; mocked in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn extract(
        &self,
        document_text: &str,
        clause_inventory: &str,
        family_catalogue: &str,
    ) -> Result<LlmExtraction, LlmError>;
}

/// Chat-completions client configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl LlmConfig {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(120),
            max_concurrency: 3,
        }
    }
}

/// HTTP client against a chat-completions endpoint.
pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Request(format!("client build: {e}")))?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    fn build_prompt(document_text: &str, clause_inventory: &str, family_catalogue: &str) -> String {
        format!(
            "Extract structured clauses from the commodity contract below.\n\
             Known clause ids:\n{clause_inventory}\n\
             Known families:\n{family_catalogue}\n\
             Respond with a JSON object {{\"clauses\": [...], \"family_id\": ...}} where each \
             clause has clause_id, parameter, operator (gte|lte|eq|between), value, unit, \
             section_ref and confidence (high|medium|low).\n\
             CONTRACT TEXT:\n{document_text}"
        )
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn extract(
        &self,
        document_text: &str,
        clause_inventory: &str,
        family_catalogue: &str,
    ) -> Result<LlmExtraction, LlmError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| LlmError::Request("limiter closed".into()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a contract clause extractor. Output valid JSON only."
                },
                {
                    "role": "user",
                    "content": Self::build_prompt(document_text, clause_inventory, family_catalogue)
                }
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("envelope: {e}")))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| LlmError::BadResponse("no choices returned".into()))?;

        serde_json::from_str(content)
            .map_err(|e| LlmError::BadResponse(format!("content JSON: {e}")))
    }
}

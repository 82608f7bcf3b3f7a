//! Clients for the generative models that write quiz questions.
//!
//! Both backends answer a single prompt with a single block of text. Quota
//! exhaustion is recognised by a literal marker in the error text, which is
//! the only signal the upstream APIs give us that survives every code path.

use std::time::Duration;

use async_trait::async_trait;
use chatgpt::{client::ChatGPT, config::ChatGPTEngine, types::CompletionResponse};
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_CHATGPT_MODEL: &str = "gpt-3.5-turbo";

/// Marker Gemini puts in the `status` field of a 429 reply.
pub const GEMINI_QUOTA_MARKER: &str = "RESOURCE_EXHAUSTED";
/// Error type OpenAI reports once the account has run out of credit.
pub const OPENAI_QUOTA_MARKER: &str = "insufficient_quota";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request to the model failed: {0}")]
    Transport(String),

    /// Non-2xx reply. `body` is kept verbatim so the quota marker stays visible.
    #[error("{status} {body}")]
    Api { status: u16, body: String },

    #[error("model backend error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send `prompt` to the model and return its raw text reply.
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError>;

    fn quota_marker(&self) -> &str;

    fn is_quota_exhausted(&self, error_text: &str) -> bool {
        error_text.contains(self.quota_marker())
    }
}

// ── Gemini ───────────────────────────────────────────────────────────────────

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model)
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        })
    }

    /// Join the text parts of the first candidate, skipping `thought` parts
    /// emitted by thinking models.
    pub fn extract_text(response: &Value) -> Option<String> {
        let parts = response["candidates"][0]["content"]["parts"].as_array()?;

        let text: Vec<&str> = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text.join(""))
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError> {
        debug!("Gemini request to model {}", self.model);

        let response = self
            .client
            .post(self.api_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        // An empty candidate list is not an upstream failure; the generator
        // reports it as an unparseable reply.
        Ok(Self::extract_text(&json).unwrap_or_default())
    }

    fn quota_marker(&self) -> &str {
        GEMINI_QUOTA_MARKER
    }
}

// ── ChatGPT ──────────────────────────────────────────────────────────────────

pub struct ChatGptClient {
    chat_gpt: ChatGPT,
}

impl ChatGptClient {
    pub fn new(api_key: impl Into<String>, model: &str) -> Result<Self, ModelError> {
        let engine = Self::engine_for(model)
            .ok_or_else(|| ModelError::UnsupportedModel(model.to_string()))?;

        let mut chat_gpt = ChatGPT::new(api_key.into()).map_err(Self::convert_error)?;
        chat_gpt.config.engine = engine;
        chat_gpt.config.timeout = Duration::from_secs(60);

        Ok(Self { chat_gpt })
    }

    pub fn engine_for(model: &str) -> Option<ChatGPTEngine> {
        match model {
            "gpt-3.5-turbo" => Some(ChatGPTEngine::Gpt35Turbo),
            "gpt-4" => Some(ChatGPTEngine::Gpt4),
            _ => None,
        }
    }

    fn convert_error(error: chatgpt::err::Error) -> ModelError {
        match error {
            chatgpt::err::Error::BackendError {
                message,
                error_type,
            } => ModelError::Backend {
                error_type,
                message,
            },
            other => ModelError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for ChatGptClient {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError> {
        debug!("ChatGPT request, {} prompt bytes", prompt.len());

        let response: CompletionResponse = self
            .chat_gpt
            .send_message(prompt)
            .await
            .map_err(Self::convert_error)?;

        Ok(response.message().content.clone())
    }

    fn quota_marker(&self) -> &str {
        OPENAI_QUOTA_MARKER
    }
}

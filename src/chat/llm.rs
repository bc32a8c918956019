use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Upstream failures the chat endpoint maps to distinct status codes.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Outbound call to the generation endpoint. Behind a trait so tests
/// can stand in a canned client.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Returns the model's reply, or `None` when the endpoint answered
    /// without usable text.
    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<Option<String>, GenerationError>;
}

/// The reply shapes the generation endpoint is known to produce:
/// chat-style (`message.content`), generate-style (`response`), and
/// bare completion (`text`). Tried in that order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GenerationResponse {
    Chat { message: ChatMessage },
    Generate { response: String },
    Completion { text: String },
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

impl GenerationResponse {
    /// Non-empty reply text, whichever shape carried it.
    pub fn into_reply(self) -> Option<String> {
        let text = match self {
            GenerationResponse::Chat { message } => message.content,
            GenerationResponse::Generate { response } => response,
            GenerationResponse::Completion { text } => text,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<Option<String>, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
            "stream": false,
        });

        debug!(model = %self.model, "generation request");
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?
            .error_for_status()
            .map_err(map_transport)?;

        let payload = response.bytes().await.map_err(map_transport)?;
        match serde_json::from_slice::<GenerationResponse>(&payload) {
            Ok(decoded) => Ok(decoded.into_reply()),
            Err(e) => {
                // Unknown body shape counts as "no usable text", not as a
                // transport fault.
                warn!(error = %e, "unrecognized generation response shape");
                Ok(None)
            }
        }
    }
}

fn map_transport(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> Option<String> {
        serde_json::from_str::<GenerationResponse>(raw)
            .ok()
            .and_then(GenerationResponse::into_reply)
    }

    #[test]
    fn decodes_chat_shape() {
        assert_eq!(
            decode(r#"{"message": {"content": "Retain 30 days."}}"#),
            Some("Retain 30 days.".into())
        );
    }

    #[test]
    fn decodes_generate_shape() {
        assert_eq!(
            decode(r#"{"response": "Retain 30 days."}"#),
            Some("Retain 30 days.".into())
        );
    }

    #[test]
    fn decodes_completion_shape() {
        assert_eq!(decode(r#"{"text": "Retain 30 days."}"#), Some("Retain 30 days.".into()));
    }

    #[test]
    fn ignores_extra_fields_in_chat_shape() {
        let raw = r#"{"model": "company-bot", "message": {"content": "ok"}, "done": true}"#;
        assert_eq!(decode(raw), Some("ok".into()));
    }

    #[test]
    fn empty_reply_is_none() {
        assert_eq!(decode(r#"{"response": ""}"#), None);
        assert_eq!(decode(r#"{"message": {"content": ""}}"#), None);
    }

    #[test]
    fn unknown_shape_is_none() {
        assert_eq!(decode(r#"{"error": "model not found"}"#), None);
    }
}

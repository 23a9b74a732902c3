//! AI backend contract, response validation and HTTP client.
//!
//! Responses are validated at the boundary: anything that does not match the
//! documented shape becomes [`JudgeLoopError::MalformedAiResponse`] instead of
//! being silently defaulted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::AiConfig;
use crate::error::{Backend, JudgeLoopError, Result};

/// Path of the chat endpoint.
pub const CHAT_ENDPOINT: &str = "/chat/";

/// Path of the fix endpoint.
pub const REGEN_ENDPOINT: &str = "/regen/";

/// Body of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// What the user typed.
    pub user: String,
    /// Display name of the current language.
    pub lang: String,
    /// Current source code.
    pub code: String,
    /// Last error text, if the latest run failed.
    pub error: Option<String>,
}

/// A validated chat answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Assistant message to show.
    pub chat: String,
    /// Replacement source code, if the assistant rewrote it.
    pub fixed_code: Option<String>,
    /// AI backend language key, if the assistant picked a language.
    pub language: Option<String>,
}

impl ChatReply {
    /// Validates a raw `/chat/` response body.
    ///
    /// `chat` must be a string. `fixed_code` and `language` must be strings or
    /// null when present; empty strings count as absent.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(JudgeLoopError::malformed_ai_response(
                CHAT_ENDPOINT,
                "response is not a JSON object",
            ));
        };
        let chat = match fields.remove("chat") {
            Some(Value::String(chat)) => chat,
            Some(_) => {
                return Err(JudgeLoopError::malformed_ai_response(
                    CHAT_ENDPOINT,
                    "field 'chat' is not a string",
                ))
            }
            None => {
                return Err(JudgeLoopError::malformed_ai_response(
                    CHAT_ENDPOINT,
                    "missing field 'chat'",
                ))
            }
        };
        Ok(Self {
            chat,
            fixed_code: optional_text(fields.remove("fixed_code"), "fixed_code")?,
            language: optional_text(fields.remove("language"), "language")?,
        })
    }
}

fn optional_text(value: Option<Value>, field: &str) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(JudgeLoopError::malformed_ai_response(
            CHAT_ENDPOINT,
            format!("field '{field}' is not a string"),
        )),
    }
}

/// Body of a fix request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenRequest {
    /// Error text to fix.
    pub error: String,
    /// Source code that produced it.
    pub code: String,
    /// AI backend language key.
    pub language: String,
}

/// Extracts the new source code from a raw `/regen/` response body.
pub fn regen_code_from_value(value: &Value) -> Result<String> {
    match value.get("response") {
        Some(Value::String(code)) => Ok(code.clone()),
        Some(_) => Err(JudgeLoopError::malformed_ai_response(
            REGEN_ENDPOINT,
            "field 'response' is not a string",
        )),
        None => Err(JudgeLoopError::malformed_ai_response(
            REGEN_ENDPOINT,
            "missing field 'response'",
        )),
    }
}

/// Request/response contract of the AI backend.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Asks the assistant about the current code.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Asks the assistant to rewrite code so the error goes away.
    async fn regenerate(&self, request: &RegenRequest) -> Result<String>;
}

/// AI backend client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAiClient {
    client: Client,
    base_url: String,
}

impl HttpAiClient {
    /// Creates a client from AI backend configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the HTTP client cannot be built.
    pub fn new(config: &AiConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JudgeLoopError::transport(Backend::Ai, None, e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, endpoint: &str, body: &T) -> Result<Value> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| JudgeLoopError::transport(Backend::Ai, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JudgeLoopError::transport(
                Backend::Ai,
                Some(status.as_u16()),
                body,
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| JudgeLoopError::malformed_ai_response(endpoint, e.to_string()))
    }
}

#[async_trait]
impl AiBackend for HttpAiClient {
    #[instrument(skip(self, request), fields(lang = %request.lang))]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let body = self.post(CHAT_ENDPOINT, request).await?;
        let reply = ChatReply::from_value(body)?;
        debug!(
            has_code = reply.fixed_code.is_some(),
            language = ?reply.language,
            "Chat reply received"
        );
        Ok(reply)
    }

    #[instrument(skip(self, request), fields(language = %request.language))]
    async fn regenerate(&self, request: &RegenRequest) -> Result<String> {
        let body = self.post(REGEN_ENDPOINT, request).await?;
        let code = regen_code_from_value(&body)?;
        debug!(code_len = code.len(), "Regenerated code received");
        Ok(code)
    }
}

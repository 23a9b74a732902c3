//! Judge service contract and HTTP client.
//!
//! The judge is consumed through two calls: create a submission (returns a
//! token) and fetch a submission by token. Every request asks for base64
//! payloads and all fields.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::JudgeConfig;
use crate::encoding;
use crate::error::{Backend, JudgeLoopError, Result};
use crate::language::Language;

const QUERY: [(&str, &str); 2] = [("base64_encoded", "true"), ("fields", "*")];

/// Judge status block of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeStatus {
    /// Numeric status id (1 = in queue, 2 = processing, 3 = accepted, ...).
    pub id: u32,
    /// Judge-provided description of the status.
    #[serde(default)]
    pub description: String,
}

/// The judge's report for one submission.
///
/// Output fields are kept encoded, exactly as the judge sent them; `None`
/// means the judge reported no such output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDetails {
    /// Execution status.
    pub status: JudgeStatus,
    /// Encoded standard output.
    #[serde(default)]
    pub stdout: Option<String>,
    /// Encoded standard error.
    #[serde(default)]
    pub stderr: Option<String>,
    /// Encoded compiler output.
    #[serde(default)]
    pub compile_output: Option<String>,
    /// Wall time in seconds, as reported by the judge.
    #[serde(default)]
    pub time: Option<String>,
    /// Peak memory in kilobytes.
    #[serde(default)]
    pub memory: Option<u64>,
}

impl OutputDetails {
    /// Creates details carrying only a status.
    #[must_use]
    pub fn with_status(id: u32, description: impl Into<String>) -> Self {
        Self {
            status: JudgeStatus {
                id,
                description: description.into(),
            },
            stdout: None,
            stderr: None,
            compile_output: None,
            time: None,
            memory: None,
        }
    }
}

/// Body of a create-submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Judge language id.
    pub language_id: u32,
    /// Encoded source code.
    pub source_code: String,
}

impl SubmissionRequest {
    /// Builds a request for `code` in `language`, encoding the source.
    #[must_use]
    pub fn new(language: &Language, code: &str) -> Self {
        Self {
            language_id: language.id,
            source_code: encoding::encode(code),
        }
    }
}

/// A submission accepted by the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Judge-assigned token used for polling.
    pub token: String,
    /// Judge language id.
    pub language_id: u32,
    /// Encoded source code.
    pub source_code: String,
}

impl Submission {
    /// Records the accepted `request` under `token`.
    #[must_use]
    pub fn accepted(token: impl Into<String>, request: SubmissionRequest) -> Self {
        Self {
            token: token.into(),
            language_id: request.language_id,
            source_code: request.source_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Request/response contract of the judge service.
#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// Creates a submission and returns its token.
    async fn create_submission(&self, request: &SubmissionRequest) -> Result<String>;

    /// Fetches the current report for a submission.
    async fn get_submission(&self, token: &str) -> Result<OutputDetails>;
}

/// Judge client speaking the Judge0 REST API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJudgeClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_host: String,
}

impl HttpJudgeClient {
    /// Creates a client from judge configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Transport` error if the HTTP client cannot be built.
    pub fn new(config: &JudgeConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JudgeLoopError::transport(Backend::Judge, None, e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.query(&QUERY);
        if !self.api_key.is_empty() {
            request = request.header("x-rapidapi-key", &self.api_key);
        }
        if !self.api_host.is_empty() {
            request = request.header("x-rapidapi-host", &self.api_host);
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| JudgeLoopError::transport(Backend::Judge, None, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Judge quota exceeded");
            return Err(JudgeLoopError::QuotaExceeded);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JudgeLoopError::transport(
                Backend::Judge,
                Some(status.as_u16()),
                body,
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl JudgeApi for HttpJudgeClient {
    #[instrument(skip(self, request), fields(language_id = request.language_id))]
    async fn create_submission(&self, request: &SubmissionRequest) -> Result<String> {
        let url = format!("{}/submissions", self.base_url);
        let response = self
            .send(self.authorize(self.client.post(url)).json(request))
            .await?;
        let body: TokenResponse = response.json().await.map_err(|e| {
            JudgeLoopError::transport(Backend::Judge, None, format!("invalid token body: {e}"))
        })?;
        debug!(token = %body.token, "Submission created");
        Ok(body.token)
    }

    #[instrument(skip(self))]
    async fn get_submission(&self, token: &str) -> Result<OutputDetails> {
        let url = format!("{}/submissions/{token}", self.base_url);
        let response = self.send(self.authorize(self.client.get(url))).await?;
        let details: OutputDetails = response.json().await.map_err(|e| {
            JudgeLoopError::transport(Backend::Judge, None, format!("invalid submission body: {e}"))
        })?;
        debug!(status_id = details.status.id, "Submission polled");
        Ok(details)
    }
}

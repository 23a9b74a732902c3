//! Configuration types for the judgeloop orchestrator.
//!
//! This module provides the configuration structures that point a session at
//! its judge and AI backend and tune polling, chat pacing and notification
//! durations.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JudgeLoopError, Result};
use crate::language::{Language, LanguageCatalog, Theme, DEFAULT_LANGUAGE_ID};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "judgeloop.json";

/// Environment variable overriding the judge base URL.
pub const ENV_JUDGE_URL: &str = "JUDGELOOP_JUDGE_URL";
/// Environment variable overriding the judge API key.
pub const ENV_JUDGE_API_KEY: &str = "JUDGELOOP_JUDGE_API_KEY";
/// Environment variable overriding the judge API host header.
pub const ENV_JUDGE_HOST: &str = "JUDGELOOP_JUDGE_HOST";
/// Environment variable overriding the AI backend base URL.
pub const ENV_AI_URL: &str = "JUDGELOOP_AI_URL";

fn default_judge_url() -> String {
    "https://judge0-ce.p.rapidapi.com".to_string()
}

fn default_judge_host() -> String {
    "judge0-ce.p.rapidapi.com".to_string()
}

fn default_ai_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

/// Default delay between two polls of the same submission.
const fn default_poll_interval_ms() -> u64 {
    2000
}

/// Default time a chat answer stays on screen before the flow moves on.
const fn default_chat_reply_delay_ms() -> u64 {
    2000
}

/// Default timeout for a single HTTP request.
const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_language_id() -> u32 {
    DEFAULT_LANGUAGE_ID
}

const fn default_success_ms() -> u64 {
    1000
}

const fn default_error_ms() -> u64 {
    1000
}

const fn default_quota_ms() -> u64 {
    10_000
}

/// Main configuration for judgeloop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Judge service settings.
    #[serde(default)]
    pub judge: JudgeConfig,

    /// AI backend settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Delay between polls of an in-progress submission, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay after a chat answer before the conversation advances, in milliseconds.
    #[serde(default = "default_chat_reply_delay_ms")]
    pub chat_reply_delay_ms: u64,

    /// Timeout for a single HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Judge id of the language a new session starts with.
    #[serde(default = "default_language_id")]
    pub default_language_id: u32,

    /// Editor theme a new session starts with.
    #[serde(default)]
    pub theme: Theme,

    /// How long notifications stay visible.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Replaces the built-in language list when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<Language>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            ai: AiConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            chat_reply_delay_ms: default_chat_reply_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            default_language_id: default_language_id(),
            theme: Theme::default(),
            notifications: NotificationConfig::default(),
            languages: None,
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `judgeloop.json` in the current directory and falls back to
    /// defaults when it does not exist. Environment overrides are applied on
    /// top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            JudgeLoopError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration. Environment
    /// overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns `JudgeLoopError::ConfigParseError` if the file exists but
    /// contains invalid JSON.
    ///
    /// Returns `JudgeLoopError::ConfigValidationError` if the configuration
    /// values are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Self>(&contents)
                .map_err(|e| JudgeLoopError::config_parse(path, e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(JudgeLoopError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup (normally the process
    /// environment). Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(ENV_JUDGE_URL) {
            self.judge.base_url = url;
        }
        if let Some(key) = lookup(ENV_JUDGE_API_KEY) {
            self.judge.api_key = key;
        }
        if let Some(host) = lookup(ENV_JUDGE_HOST) {
            self.judge.api_host = host;
        }
        if let Some(url) = lookup(ENV_AI_URL) {
            self.ai.base_url = url;
        }
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `pollIntervalMs` and `requestTimeoutSecs` are greater than 0
    /// - both base URLs are non-empty
    /// - the language list (if given) is valid
    /// - `defaultLanguageId` exists in the language list
    ///
    /// # Errors
    ///
    /// Returns `JudgeLoopError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(JudgeLoopError::config_validation(
                "pollIntervalMs must be greater than 0",
                "Set pollIntervalMs to at least 1 in your judgeloop.json (2000 is the judge-friendly default)",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(JudgeLoopError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 in your judgeloop.json",
            ));
        }

        if self.judge.base_url.trim().is_empty() {
            return Err(JudgeLoopError::config_validation(
                "judge.baseUrl must not be empty",
                format!("Set judge.baseUrl in your judgeloop.json or export {ENV_JUDGE_URL}"),
            ));
        }

        if self.ai.base_url.trim().is_empty() {
            return Err(JudgeLoopError::config_validation(
                "ai.baseUrl must not be empty",
                format!("Set ai.baseUrl in your judgeloop.json or export {ENV_AI_URL}"),
            ));
        }

        let catalog = self.catalog()?;
        if catalog.by_id(self.default_language_id).is_none() {
            return Err(JudgeLoopError::config_validation(
                format!(
                    "defaultLanguageId {} is not in the language list",
                    self.default_language_id
                ),
                "Set defaultLanguageId to one of the configured language ids",
            ));
        }

        Ok(())
    }

    /// Builds the language catalog this configuration selects.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if a configured language list is invalid.
    pub fn catalog(&self) -> Result<LanguageCatalog> {
        self.languages.as_ref().map_or_else(
            || Ok(LanguageCatalog::builtin()),
            |languages| LanguageCatalog::from_languages(languages.clone()),
        )
    }

    /// Returns the poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the chat reply delay as a `Duration`.
    #[must_use]
    pub const fn chat_reply_delay(&self) -> Duration {
        Duration::from_millis(self.chat_reply_delay_ms)
    }

    /// Returns the HTTP request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Judge service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeConfig {
    /// Base URL of the judge REST API.
    #[serde(default = "default_judge_url")]
    pub base_url: String,

    /// Value of the `x-rapidapi-key` header; omitted when empty.
    #[serde(default)]
    pub api_key: String,

    /// Value of the `x-rapidapi-host` header; omitted when empty.
    #[serde(default = "default_judge_host")]
    pub api_host: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_judge_url(),
            api_key: String::new(),
            api_host: default_judge_host(),
        }
    }
}

/// AI backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    /// Base URL of the AI backend.
    #[serde(default = "default_ai_url")]
    pub base_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_url(),
        }
    }
}

/// How long notifications stay visible, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    /// Success notifications.
    #[serde(default = "default_success_ms")]
    pub success_ms: u64,

    /// Generic failure notifications.
    #[serde(default = "default_error_ms")]
    pub error_ms: u64,

    /// Quota-exceeded notifications.
    #[serde(default = "default_quota_ms")]
    pub quota_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_ms: default_success_ms(),
            error_ms: default_error_ms(),
            quota_ms: default_quota_ms(),
        }
    }
}

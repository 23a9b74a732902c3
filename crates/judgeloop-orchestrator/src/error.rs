//! Error types for the judgeloop orchestrator.
//!
//! This module defines the error hierarchy for all session operations,
//! including configuration loading, judge and AI backend transport, payload
//! decoding and step machine transitions.

use std::path::PathBuf;

use crate::encoding::DecodeError;

/// A specialized `Result` type for judgeloop operations.
pub type Result<T> = std::result::Result<T, JudgeLoopError>;

/// Generic message surfaced when a judge or AI call fails.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong! Please try again.";

/// Message surfaced when the judge reports that the daily quota is used up.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Quota of 100 requests exceeded for the Day! Please set up your own Judge0 instance or RapidAPI key to keep compiling.";

/// Errors that can occur while driving a judgeloop session.
///
/// Judge run outcomes (compile errors, runtime errors, time limits) are not
/// errors; they are classified results, see [`crate::status`].
#[derive(Debug, thiserror::Error)]
pub enum JudgeLoopError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your judgeloop.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// A request to the judge or the AI backend failed.
    #[error("{backend} request failed{}: {message}\n\nSuggestion: {}", status_suffix(.status), .backend.suggestion())]
    Transport {
        /// Which collaborator the request was addressed to.
        backend: Backend,
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// The judge answered HTTP 429: the request quota is used up.
    #[error("Judge quota exceeded (HTTP 429)\n\nSuggestion: Wait for the quota to reset or configure your own judge API key")]
    QuotaExceeded,

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// An encoded judge field could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The AI backend answered with a body of unexpected shape.
    #[error("Malformed AI response from '{endpoint}': {message}")]
    MalformedAiResponse {
        /// The endpoint that produced the response.
        endpoint: String,
        /// What was wrong with the body.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No language with the given judge id exists in the catalog.
    #[error("Unknown language id {id}\n\nSuggestion: Pick a language id from the judge's language list")]
    UnknownLanguage {
        /// The requested judge language id.
        id: u32,
    },

    /// The code buffer is empty; there is nothing to compile.
    #[error("Source code is empty\n\nSuggestion: Write some code before compiling")]
    EmptySource,

    /// There is no failed run whose error could be fixed.
    #[error("Nothing to regenerate: the last run did not fail")]
    NothingToRegenerate,

    /// The named operation is already in flight.
    #[error("{operation} is already running")]
    AlreadyRunning {
        /// Name of the operation.
        operation: String,
    },

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" (HTTP {code})"))
}

/// The remote collaborator a transport error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The code execution judge.
    Judge,
    /// The AI chat/fix backend.
    Ai,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Judge => write!(f, "judge"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

impl Backend {
    /// Returns a suggestion message for failures against this backend.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Judge => "Check the judge URL and API key, or retry later",
            Self::Ai => "Check that the AI backend is running and reachable",
        }
    }
}

impl JudgeLoopError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(backend: Backend, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend,
            status,
            message: message.into(),
        }
    }

    /// Creates a new `MalformedAiResponse` error.
    #[must_use]
    pub fn malformed_ai_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedAiResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a new `AlreadyRunning` error.
    #[must_use]
    pub fn already_running(operation: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            operation: operation.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and the user may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500,
            },
            Self::AlreadyRunning { .. } => true,
            _ => false,
        }
    }

    /// Returns the user-facing notification text for this error.
    ///
    /// Quota exhaustion has its own message; every other failure collapses
    /// into the generic retry suggestion.
    #[must_use]
    pub const fn notification_message(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => QUOTA_EXCEEDED_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}

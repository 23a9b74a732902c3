//! Classification of judge reports into displayable outcomes.
//!
//! The judge's status space is larger than what a user needs to see; every
//! status that is not explicitly handled collapses into
//! [`OutcomeKind::RuntimeError`] so there is always something to render.

use serde::{Deserialize, Serialize};

use crate::encoding::{decode_field, DecodeError};
use crate::judge::OutputDetails;

/// Judge status id of an accepted (successful) run.
pub const STATUS_ACCEPTED: u32 = 3;

/// Message shown for runs that hit the time limit.
pub const TIME_LIMIT_MESSAGE: &str = "Time Limit Exceeded";

/// The closed set of outcome kinds a judge report maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Queued or running; the only non-terminal kind.
    InProgress,
    /// Ran to completion and was accepted.
    Success,
    /// Hit the time limit.
    TimeExceeded,
    /// Failed to compile.
    CompileError,
    /// Any other terminal status.
    RuntimeError,
}

impl OutcomeKind {
    /// Maps a judge status id to its outcome kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use judgeloop_orchestrator::OutcomeKind;
    ///
    /// assert_eq!(OutcomeKind::from_status_id(2), OutcomeKind::InProgress);
    /// assert_eq!(OutcomeKind::from_status_id(3), OutcomeKind::Success);
    /// assert_eq!(OutcomeKind::from_status_id(11), OutcomeKind::RuntimeError);
    /// ```
    #[must_use]
    pub const fn from_status_id(id: u32) -> Self {
        match id {
            1 | 2 => Self::InProgress,
            STATUS_ACCEPTED => Self::Success,
            5 => Self::TimeExceeded,
            6 => Self::CompileError,
            _ => Self::RuntimeError,
        }
    }

    /// Returns `true` for every kind that ends polling.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::TimeExceeded => write!(f, "time_exceeded"),
            Self::CompileError => write!(f, "compile_error"),
            Self::RuntimeError => write!(f, "runtime_error"),
        }
    }
}

/// A classified judge report with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// The outcome kind.
    pub kind: OutcomeKind,
    /// Judge status description.
    pub description: String,
    /// Decoded field selected for display; `None` when the judge sent none.
    pub payload: Option<String>,
}

impl Outcome {
    /// Returns the text a view shows for this outcome.
    #[must_use]
    pub fn display_text(&self) -> &str {
        match self.kind {
            OutcomeKind::TimeExceeded => TIME_LIMIT_MESSAGE,
            _ => self.payload.as_deref().unwrap_or_default(),
        }
    }
}

/// Classifies a judge report.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the displayed field is not valid base64.
/// Other fields are not touched.
pub fn classify(details: &OutputDetails) -> Result<Outcome, DecodeError> {
    let kind = OutcomeKind::from_status_id(details.status.id);
    let payload = match kind {
        OutcomeKind::InProgress | OutcomeKind::TimeExceeded => None,
        OutcomeKind::Success => decode_field("stdout", details.stdout.as_deref())?,
        OutcomeKind::CompileError => {
            decode_field("compile_output", details.compile_output.as_deref())?
        }
        OutcomeKind::RuntimeError => decode_field("stderr", details.stderr.as_deref())?,
    };
    Ok(Outcome {
        kind,
        description: details.status.description.clone(),
        payload,
    })
}

/// Returns the error text of a report, as handed to the AI backend.
///
/// Standard error wins; compiler output is only decoded when standard error
/// is missing or empty.
///
/// # Errors
///
/// Returns a [`DecodeError`] if a field it reads is not valid base64.
pub fn error_text(details: &OutputDetails) -> Result<Option<String>, DecodeError> {
    let stderr = decode_field("stderr", details.stderr.as_deref())?;
    if let Some(text) = stderr.filter(|s| !s.is_empty()) {
        return Ok(Some(text));
    }
    Ok(decode_field("compile_output", details.compile_output.as_deref())?
        .filter(|s| !s.is_empty()))
}

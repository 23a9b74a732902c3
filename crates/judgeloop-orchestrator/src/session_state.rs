//! Session state for the judgeloop orchestrator.
//!
//! [`SessionState`] is the single mutable aggregate of a session: the code
//! buffer, the selected language and theme, the latest judge report and the
//! transient `processing`/`regenerating` flags. It is only changed through the
//! named operations below, so every write site is visible in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::encoding::DecodeError;
use crate::error::{JudgeLoopError, Result};
use crate::judge::OutputDetails;
use crate::language::{Language, Theme};
use crate::status::{
    classify, error_text, Outcome, OutcomeKind, STATUS_ACCEPTED, TIME_LIMIT_MESSAGE,
};

// ============================================================================
// SessionState
// ============================================================================

/// Complete mutable state of one session.
#[derive(Debug)]
pub struct SessionState {
    code: String,
    language: Language,
    theme: Theme,
    output: Option<OutputDetails>,
    processing: bool,
    regenerating: bool,
    compile_token: Option<CancellationToken>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a new state with no judge report and both flags cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use judgeloop_orchestrator::{Language, SessionState, Theme};
    ///
    /// let language = Language::new(63, "JavaScript (Node.js 12.14.0)", "javascript");
    /// let state = SessionState::new("console.log(1)", language, Theme::default());
    /// assert!(!state.error_occurred());
    /// assert!(!state.is_processing());
    /// assert!(state.output().is_none());
    /// ```
    #[must_use]
    pub fn new(code: impl Into<String>, language: Language, theme: Theme) -> Self {
        Self {
            code: code.into(),
            language,
            theme,
            output: None,
            processing: false,
            regenerating: false,
            compile_token: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns the current source code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the selected language.
    #[must_use]
    pub const fn language(&self) -> &Language {
        &self.language
    }

    /// Returns the selected theme.
    #[must_use]
    pub const fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Returns the latest terminal judge report, if any.
    #[must_use]
    pub const fn output(&self) -> Option<&OutputDetails> {
        self.output.as_ref()
    }

    /// Returns `true` while a compile chain is in flight.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        self.processing
    }

    /// Returns `true` while a regeneration is in flight.
    #[must_use]
    pub const fn is_regenerating(&self) -> bool {
        self.regenerating
    }

    /// Returns `true` iff a judge report exists and it is not Accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use judgeloop_orchestrator::{Language, OutputDetails, SessionState, Theme};
    ///
    /// let language = Language::new(71, "Python (3.8.1)", "python");
    /// let mut state = SessionState::new("print(", language, Theme::default());
    /// let token = state.begin_processing();
    /// state.finish_processing(&token, Some(OutputDetails::with_status(11, "Runtime Error (NZEC)")));
    /// assert!(state.error_occurred());
    /// ```
    #[must_use]
    pub fn error_occurred(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|details| details.status.id != STATUS_ACCEPTED)
    }

    /// When the state was last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------------
    // Editor mutations
    // ------------------------------------------------------------------------

    /// Replaces the code buffer.
    pub fn replace_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.touch();
    }

    /// Switches the selected language.
    pub fn switch_language(&mut self, language: Language) {
        self.language = language;
        self.touch();
    }

    /// Switches the editor theme.
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Compile chain
    // ------------------------------------------------------------------------

    /// Starts a new compile chain and returns its cancellation token.
    ///
    /// The previous chain's token, if any, is cancelled first, so at most one
    /// chain can ever write its result.
    pub fn begin_processing(&mut self) -> CancellationToken {
        if let Some(previous) = self.compile_token.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.compile_token = Some(token.clone());
        self.processing = true;
        self.touch();
        token
    }

    /// Returns `true` if `token` belongs to the chain currently of interest.
    ///
    /// Every token except the live one is cancelled, so a live token that is
    /// still registered is the current one.
    #[must_use]
    pub fn is_current(&self, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.compile_token.is_some()
    }

    /// Ends the compile chain owning `token`.
    ///
    /// Stores `output` when given (a terminal report) and clears `processing`.
    /// A superseded chain changes nothing and gets `false` back.
    pub fn finish_processing(
        &mut self,
        token: &CancellationToken,
        output: Option<OutputDetails>,
    ) -> bool {
        if !self.is_current(token) {
            return false;
        }
        if let Some(details) = output {
            self.output = Some(details);
        }
        // Spent tokens are cancelled so at most one live token exists.
        if let Some(spent) = self.compile_token.take() {
            spent.cancel();
        }
        self.processing = false;
        self.touch();
        true
    }

    /// Cancels the compile chain in flight, if any, and clears `processing`.
    pub fn cancel_processing(&mut self) {
        if let Some(token) = self.compile_token.take() {
            token.cancel();
        }
        self.processing = false;
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Regeneration
    // ------------------------------------------------------------------------

    /// Marks a regeneration as in flight.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if a regeneration is already in flight.
    pub fn begin_regenerating(&mut self) -> Result<()> {
        if self.regenerating {
            return Err(JudgeLoopError::already_running("regeneration"));
        }
        self.regenerating = true;
        self.touch();
        Ok(())
    }

    /// Releases the regeneration flag.
    pub fn finish_regenerating(&mut self) {
        self.regenerating = false;
        self.touch();
    }

    /// Clears the error payload of the latest report to empty strings.
    ///
    /// Standard output and the status are left as they are.
    pub fn clear_error_payload(&mut self) {
        if let Some(details) = self.output.as_mut() {
            details.stderr = Some(String::new());
            details.compile_output = Some(String::new());
            self.touch();
        }
    }

    // ------------------------------------------------------------------------
    // Derived reads
    // ------------------------------------------------------------------------

    /// Classifies the latest report.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the displayed field is not valid base64.
    pub fn outcome(&self) -> std::result::Result<Option<Outcome>, DecodeError> {
        self.output.as_ref().map(classify).transpose()
    }

    /// Returns the error text of the latest failed run.
    ///
    /// Standard error wins over compiler output; a time-limited run reports
    /// the time limit message. `None` when the last run did not fail or its
    /// error payload is empty.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if an error field is not valid base64.
    pub fn failure_text(&self) -> std::result::Result<Option<String>, DecodeError> {
        let Some(details) = self.output.as_ref().filter(|_| self.error_occurred()) else {
            return Ok(None);
        };
        let text = error_text(details)?.or_else(|| {
            (OutcomeKind::from_status_id(details.status.id) == OutcomeKind::TimeExceeded)
                .then(|| TIME_LIMIT_MESSAGE.to_string())
        });
        Ok(text)
    }

    /// Returns a serializable copy of the state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            language: self.language.clone(),
            theme: self.theme.clone(),
            output: self.output.clone(),
            outcome: self.outcome().ok().flatten(),
            processing: self.processing,
            regenerating: self.regenerating,
            error_occurred: self.error_occurred(),
            updated_at: self.updated_at,
        }
    }
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Read-only view of a session, as served by the API and the `connected`
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current source code.
    pub code: String,
    /// Selected language.
    pub language: Language,
    /// Selected theme.
    pub theme: Theme,
    /// Latest judge report, encoded as the judge sent it.
    pub output: Option<OutputDetails>,
    /// Classified report; absent when there is none or it cannot be decoded.
    pub outcome: Option<Outcome>,
    /// A compile chain is in flight.
    pub processing: bool,
    /// A regeneration is in flight.
    pub regenerating: bool,
    /// The latest report exists and is not Accepted.
    pub error_occurred: bool,
    /// When the state was last changed.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

//! Submit-then-poll state machine against the judge.
//!
//! ```text
//! Idle -> Submitting -> Polling { token } -> Done
//!              \              \
//!               `-> Failed     `-> Failed
//! ```
//!
//! [`SubmissionPoller`] performs one network step per call; [`run`] drives it
//! to completion, waiting one interval between polls and racing every wait
//! and every request against a cancellation token.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{JudgeLoopError, Result};
use crate::judge::{JudgeApi, OutputDetails, Submission, SubmissionRequest};
use crate::language::Language;
use crate::status::OutcomeKind;

/// Default delay between two polls of the same submission.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

// ============================================================================
// PollerState
// ============================================================================

/// Where a submission is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollerState {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// Create-submission request in flight.
    Submitting,
    /// Accepted by the judge; waiting for a terminal report.
    Polling {
        /// Judge-assigned submission token.
        token: String,
    },
    /// A terminal report was received.
    Done,
    /// A request failed; the chain is over.
    Failed,
}

impl PollerState {
    /// Returns `true` for `Done` and `Failed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use judgeloop_orchestrator::PollerState;
    ///
    /// assert!(PollerState::Done.is_terminal());
    /// assert!(PollerState::Failed.is_terminal());
    /// assert!(!PollerState::Polling { token: "T1".into() }.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Polling { .. } => write!(f, "polling"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Still queued or running; poll again after the given delay.
    Pending(Duration),
    /// Terminal report.
    Finished(OutputDetails),
}

// ============================================================================
// SubmissionPoller
// ============================================================================

/// One submission's walk through [`PollerState`].
#[derive(Debug)]
pub struct SubmissionPoller {
    state: PollerState,
    interval: Duration,
    submission: Option<Submission>,
    polls: u32,
}

impl SubmissionPoller {
    /// Creates an idle poller that waits `interval` between polls.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            state: PollerState::Idle,
            interval,
            submission: None,
            polls: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &PollerState {
        &self.state
    }

    /// The accepted submission, once submitted.
    #[must_use]
    pub const fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// Number of polls answered so far.
    #[must_use]
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Encodes `code` and creates a submission for it.
    ///
    /// Returns the judge token on success.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the poller is `Idle`, and the
    /// judge's error (`QuotaExceeded`, `Transport`) if the request fails, in
    /// which case the poller is `Failed`.
    pub async fn submit(
        &mut self,
        judge: &dyn JudgeApi,
        language: &Language,
        code: &str,
    ) -> Result<String> {
        if self.state != PollerState::Idle {
            return Err(JudgeLoopError::invalid_transition(
                &self.state,
                PollerState::Submitting,
            ));
        }
        self.state = PollerState::Submitting;

        let request = SubmissionRequest::new(language, code);
        match judge.create_submission(&request).await {
            Ok(token) => {
                info!(token = %token, language_id = language.id, "Submission accepted");
                self.state = PollerState::Polling {
                    token: token.clone(),
                };
                self.submission = Some(Submission::accepted(token.clone(), request));
                Ok(token)
            }
            Err(e) => {
                self.state = PollerState::Failed;
                Err(e)
            }
        }
    }

    /// Polls the judge once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the poller is `Polling`, and
    /// the judge's error if the request fails, in which case the poller is
    /// `Failed`.
    pub async fn tick(&mut self, judge: &dyn JudgeApi) -> Result<PollStep> {
        let PollerState::Polling { token } = &self.state else {
            return Err(JudgeLoopError::invalid_transition(&self.state, "polling"));
        };
        let token = token.clone();

        match judge.get_submission(&token).await {
            Ok(details) => {
                self.polls += 1;
                let kind = OutcomeKind::from_status_id(details.status.id);
                if kind.is_terminal() {
                    debug!(token = %token, polls = self.polls, %kind, "Submission finished");
                    self.state = PollerState::Done;
                    Ok(PollStep::Finished(details))
                } else {
                    debug!(token = %token, polls = self.polls, "Submission in progress");
                    Ok(PollStep::Pending(self.interval))
                }
            }
            Err(e) => {
                self.state = PollerState::Failed;
                Err(e)
            }
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// How a driven submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The judge produced a terminal report.
    Completed {
        /// The terminal report.
        details: OutputDetails,
        /// Number of polls it took.
        polls: u32,
    },
    /// The chain was cancelled before it finished.
    Superseded,
}

/// Submits `code` and polls until the judge reports a terminal status.
///
/// The first poll is issued right after the submission is accepted; each
/// following poll waits `interval`. There is no retry cap. Cancelling
/// `cancel` at any point returns [`PollOutcome::Superseded`].
///
/// # Errors
///
/// Returns the first judge error (`QuotaExceeded`, `Transport`).
pub async fn run(
    judge: &dyn JudgeApi,
    language: &Language,
    code: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<PollOutcome> {
    let mut poller = SubmissionPoller::new(interval);

    tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(PollOutcome::Superseded),
        submitted = poller.submit(judge, language, code) => {
            submitted?;
        }
    }

    loop {
        let step = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(PollOutcome::Superseded),
            step = poller.tick(judge) => step?,
        };

        match step {
            PollStep::Finished(details) => {
                return Ok(PollOutcome::Completed {
                    details,
                    polls: poller.polls(),
                });
            }
            PollStep::Pending(wait) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(PollOutcome::Superseded),
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

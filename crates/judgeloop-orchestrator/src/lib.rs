//! judgeloop Orchestrator
//!
//! Drives a compile-and-repair session: submits code to a Judge0-style
//! judge, polls for the verdict, and asks an AI backend to fix failures or
//! chat about them. Exposes the session over an HTTP API and WebSocket events.

pub mod ai;
pub mod api;
pub mod chat;
pub mod config;
pub mod encoding;
pub mod error;
pub mod events;
pub mod judge;
pub mod language;
pub mod poller;
pub mod regen;
pub mod session;
pub mod session_state;
pub mod status;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use ai::{AiBackend, ChatReply, ChatRequest, HttpAiClient, RegenRequest};
pub use api::{create_router, AppState, ErrorResponse};
pub use chat::{ChatMachine, ChatMessage, ChatStepId, Speaker};
pub use config::{AiConfig, Config, JudgeConfig, NotificationConfig};
pub use error::{Backend, JudgeLoopError, Result};
pub use events::{EventBroadcaster, NotificationLevel, SessionEvent};
pub use judge::{HttpJudgeClient, JudgeApi, OutputDetails, Submission, SubmissionRequest};
pub use language::{Language, LanguageCatalog, Theme};
pub use poller::{PollOutcome, PollerState, SubmissionPoller};
pub use session::{Session, SessionSettings};
pub use session_state::{SessionSnapshot, SessionState};
pub use status::{classify, Outcome, OutcomeKind};

//! Conversational step machine driving the AI chat assistant.
//!
//! The flow is a static transition table:
//!
//! ```text
//! greeting -> prompt -> await_user -> fetch_bot_response -> followup
//!                           ^                                  |
//!                           `----------------------------------'
//! ```
//!
//! Message steps are emitted and left immediately; the machine parks on
//! `await_user` until the user writes, then runs the one asynchronous step
//! (`fetch_bot_response`) and loops back through `followup`.
//!
//! A machine owns a lifetime [`CancellationToken`]. [`ChatMachine::teardown`]
//! cancels it; anything still in flight is discarded without touching the
//! session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{AiBackend, ChatReply, ChatRequest};
use crate::error::{JudgeLoopError, Result};

/// Bot message used when the assistant call fails or answers garbage.
pub const FALLBACK_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// Default time a bot answer stays alone before the follow-up message.
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(2000);

// ============================================================================
// Graph
// ============================================================================

/// Identifier of a node in the chat graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStepId {
    /// Opening message.
    Greeting,
    /// Asks what the user needs.
    Prompt,
    /// Waits for user text.
    AwaitUser,
    /// Calls the assistant.
    FetchBotResponse,
    /// Offers more help and loops back.
    Followup,
}

/// What a step does when the machine reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStepKind {
    /// Emits a fixed bot message and moves on.
    Message,
    /// Parks until the user writes.
    UserInput,
    /// Runs an asynchronous action, then moves on.
    AsyncAction,
}

/// One node of the chat graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatStep {
    /// Node identifier.
    pub id: ChatStepId,
    /// Node behaviour.
    pub kind: ChatStepKind,
    /// Fixed text of a message node.
    pub message: Option<&'static str>,
    /// Node reached when this one completes.
    pub trigger: ChatStepId,
}

/// Every node of the graph, in flow order.
pub const CHAT_GRAPH: [ChatStepId; 5] = [
    ChatStepId::Greeting,
    ChatStepId::Prompt,
    ChatStepId::AwaitUser,
    ChatStepId::FetchBotResponse,
    ChatStepId::Followup,
];

impl ChatStepId {
    /// Node where a fresh conversation begins.
    pub const ENTRY: Self = Self::Greeting;

    /// Looks up this node's definition in the transition table.
    ///
    /// # Examples
    ///
    /// ```
    /// use judgeloop_orchestrator::chat::{ChatStepId, ChatStepKind};
    ///
    /// let followup = ChatStepId::Followup.step();
    /// assert_eq!(followup.kind, ChatStepKind::Message);
    /// assert_eq!(followup.trigger, ChatStepId::AwaitUser);
    /// ```
    #[must_use]
    pub const fn step(self) -> ChatStep {
        let (kind, message, trigger) = match self {
            Self::Greeting => (ChatStepKind::Message, Some("Hey!"), Self::Prompt),
            Self::Prompt => (
                ChatStepKind::Message,
                Some("How can I help you?"),
                Self::AwaitUser,
            ),
            Self::AwaitUser => (ChatStepKind::UserInput, None, Self::FetchBotResponse),
            Self::FetchBotResponse => (ChatStepKind::AsyncAction, None, Self::Followup),
            Self::Followup => (
                ChatStepKind::Message,
                Some("I'm here if you need more help!"),
                Self::AwaitUser,
            ),
        };
        ChatStep {
            id: self,
            kind,
            message,
            trigger,
        }
    }
}

impl std::fmt::Display for ChatStepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Greeting => write!(f, "greeting"),
            Self::Prompt => write!(f, "prompt"),
            Self::AwaitUser => write!(f, "await_user"),
            Self::FetchBotResponse => write!(f, "fetch_bot_response"),
            Self::Followup => write!(f, "followup"),
        }
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The assistant (fixed steps and AI answers).
    Bot,
    /// The person at the keyboard.
    User,
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote it.
    pub speaker: Speaker,
    /// Message text.
    pub text: String,
    /// Step that produced it.
    pub step: ChatStepId,
    /// When it was added.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>, step: ChatStepId) -> Self {
        Self {
            speaker,
            text: text.into(),
            step,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Host seam
// ============================================================================

/// What the assistant is shown about the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatContext {
    /// Display name of the current language.
    pub lang: String,
    /// Current source code.
    pub code: String,
    /// Error text of the last failed run.
    pub error: Option<String>,
}

/// The session side of a conversation.
#[async_trait]
pub trait ChatHost: Send + Sync {
    /// Reads the current code, language and error.
    async fn context(&self) -> ChatContext;

    /// Applies a validated reply: replacement code and/or language switch.
    async fn apply_reply(&self, reply: &ChatReply);

    /// Observes every message added to the transcript.
    fn on_message(&self, _message: &ChatMessage) {}
}

// ============================================================================
// ChatMachine
// ============================================================================

struct Cursor {
    current: Option<ChatStepId>,
    transcript: Vec<ChatMessage>,
}

struct ChatInner {
    ai: Arc<dyn AiBackend>,
    host: Arc<dyn ChatHost>,
    reply_delay: Duration,
    lifetime: CancellationToken,
    cursor: Mutex<Cursor>,
}

/// Handle to one conversation. Clones share the same conversation.
#[derive(Clone)]
pub struct ChatMachine {
    inner: Arc<ChatInner>,
}

impl std::fmt::Debug for ChatMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMachine")
            .field("reply_delay", &self.inner.reply_delay)
            .field("torn_down", &self.inner.lifetime.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ChatMachine {
    /// Creates a machine that has not started yet.
    #[must_use]
    pub fn new(ai: Arc<dyn AiBackend>, host: Arc<dyn ChatHost>, reply_delay: Duration) -> Self {
        Self {
            inner: Arc::new(ChatInner {
                ai,
                host,
                reply_delay,
                lifetime: CancellationToken::new(),
                cursor: Mutex::new(Cursor {
                    current: None,
                    transcript: Vec::new(),
                }),
            }),
        }
    }

    /// Emits the opening messages and parks on `await_user`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the machine already started or
    /// was torn down.
    pub async fn start(&self) -> Result<Vec<ChatMessage>> {
        let mut cursor = self.inner.cursor.lock().await;
        self.ensure_alive(ChatStepId::ENTRY)?;
        if let Some(current) = cursor.current {
            return Err(JudgeLoopError::invalid_transition(current, ChatStepId::ENTRY));
        }
        self.walk(&mut cursor, ChatStepId::ENTRY);
        info!("Chat started");
        Ok(cursor.transcript.clone())
    }

    /// Records the user's text and runs the assistant step.
    ///
    /// Resolves after the bot answered, the display delay elapsed and the
    /// follow-up message was emitted. If the machine is torn down meanwhile,
    /// resolves early and the pending result is dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the machine is parked on
    /// `await_user`.
    pub async fn submit_user_text(&self, text: impl Into<String>) -> Result<Vec<ChatMessage>> {
        let text = text.into();
        {
            let mut cursor = self.inner.cursor.lock().await;
            self.ensure_alive(ChatStepId::FetchBotResponse)?;
            if cursor.current != Some(ChatStepId::AwaitUser) {
                let from = cursor
                    .current
                    .map_or_else(|| "idle".to_string(), |step| step.to_string());
                return Err(JudgeLoopError::invalid_transition(
                    from,
                    ChatStepId::FetchBotResponse,
                ));
            }
            self.push(&mut cursor, Speaker::User, text.clone(), ChatStepId::AwaitUser);
            cursor.current = Some(ChatStepId::AwaitUser.step().trigger);
        }

        let context = self.inner.host.context().await;
        let request = ChatRequest {
            user: text,
            lang: context.lang,
            code: context.code,
            error: context.error,
        };

        let lifetime = &self.inner.lifetime;
        let reply = tokio::select! {
            biased;
            () = lifetime.cancelled() => {
                debug!("Chat torn down while waiting for the assistant");
                return Ok(self.transcript().await);
            }
            reply = self.inner.ai.chat(&request) => reply,
        };

        {
            let mut cursor = self.inner.cursor.lock().await;
            if lifetime.is_cancelled() {
                debug!("Discarding assistant reply after teardown");
                return Ok(cursor.transcript.clone());
            }
            let answer = match reply {
                Ok(reply) => {
                    self.inner.host.apply_reply(&reply).await;
                    reply.chat
                }
                Err(e) => {
                    warn!(error = %e, "Assistant call failed");
                    FALLBACK_REPLY.to_string()
                }
            };
            self.push(&mut cursor, Speaker::Bot, answer, ChatStepId::FetchBotResponse);
        }

        tokio::select! {
            biased;
            () = lifetime.cancelled() => return Ok(self.transcript().await),
            () = tokio::time::sleep(self.inner.reply_delay) => {}
        }

        let mut cursor = self.inner.cursor.lock().await;
        if lifetime.is_cancelled() {
            return Ok(cursor.transcript.clone());
        }
        self.walk(&mut cursor, ChatStepId::FetchBotResponse.step().trigger);
        Ok(cursor.transcript.clone())
    }

    /// Cancels the machine's lifetime token.
    ///
    /// Waits for a reply that is being applied right now, so once this
    /// returns the machine never touches the session again.
    pub async fn teardown(&self) {
        self.inner.lifetime.cancel();
        let _cursor = self.inner.cursor.lock().await;
        info!("Chat torn down");
    }

    /// Returns `true` once [`teardown`](Self::teardown) was called.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.lifetime.is_cancelled()
    }

    /// Node the machine is parked on; `None` before `start`.
    pub async fn current_step(&self) -> Option<ChatStepId> {
        self.inner.cursor.lock().await.current
    }

    /// Copy of the transcript so far.
    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.cursor.lock().await.transcript.clone()
    }

    fn ensure_alive(&self, to: ChatStepId) -> Result<()> {
        if self.inner.lifetime.is_cancelled() {
            return Err(JudgeLoopError::invalid_transition("torn_down", to));
        }
        Ok(())
    }

    fn push(&self, cursor: &mut Cursor, speaker: Speaker, text: String, step: ChatStepId) {
        let message = ChatMessage::new(speaker, text, step);
        self.inner.host.on_message(&message);
        cursor.transcript.push(message);
    }

    /// Emits message nodes from `from` on and parks on the first other node.
    fn walk(&self, cursor: &mut Cursor, from: ChatStepId) {
        let mut id = from;
        loop {
            let step = id.step();
            match (step.kind, step.message) {
                (ChatStepKind::Message, Some(text)) => {
                    self.push(cursor, Speaker::Bot, text.to_string(), id);
                    id = step.trigger;
                }
                _ => {
                    cursor.current = Some(id);
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Session orchestrator.
//!
//! A [`Session`] owns the [`SessionState`] and wires user actions to the
//! judge, the AI backend and the chat machine. Network work runs on spawned
//! tasks; results land in the state through its named mutations and are
//! announced as [`SessionEvent`]s. Failures never escape as errors from those
//! tasks: they become notification events.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::{AiBackend, ChatReply, HttpAiClient};
use crate::chat::{ChatContext, ChatHost, ChatMachine, ChatMessage, ChatStepId};
use crate::config::{Config, NotificationConfig};
use crate::error::{JudgeLoopError, Result};
use crate::events::{CodeSource, EventBroadcaster, NotificationLevel, SessionEvent};
use crate::judge::{HttpJudgeClient, JudgeApi};
use crate::language::{Language, LanguageCatalog, Theme, DEFAULT_SOURCE};
use crate::poller::{self, PollOutcome};
use crate::regen::{self, REGEN_FAILURE_MESSAGE, REGEN_SUCCESS_MESSAGE};
use crate::session_state::{SessionSnapshot, SessionState};

/// Notification shown when a compile chain reaches a terminal report.
pub const COMPILE_SUCCESS_MESSAGE: &str = "Compiled Successfully!";

/// Timing knobs of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Delay between a chat answer and the follow-up message.
    pub chat_reply_delay: Duration,
    /// Notification display durations.
    pub notifications: NotificationConfig,
}

impl SessionSettings {
    /// Extracts the session settings from a configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            chat_reply_delay: config.chat_reply_delay(),
            notifications: config.notifications.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    judge: Arc<dyn JudgeApi>,
    ai: Arc<dyn AiBackend>,
    catalog: LanguageCatalog,
    events: EventBroadcaster,
    settings: SessionSettings,
    chat: Mutex<Option<ChatMachine>>,
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let receivers = self.events.send(event);
        debug!(receivers, "Session event published");
    }

    fn notify_success(&self, message: &str) {
        self.emit(SessionEvent::notification(
            NotificationLevel::Success,
            message,
            self.settings.notifications.success_ms,
        ));
    }

    fn notify_failure(&self, message: &str, duration_ms: u64) {
        self.emit(SessionEvent::notification(
            NotificationLevel::Error,
            message,
            duration_ms,
        ));
    }

    fn notify_error(&self, err: &JudgeLoopError) {
        let duration_ms = if matches!(err, JudgeLoopError::QuotaExceeded) {
            self.settings.notifications.quota_ms
        } else {
            self.settings.notifications.error_ms
        };
        self.notify_failure(err.notification_message(), duration_ms);
    }

    fn emit_output(&self, snapshot: SessionSnapshot) {
        if let Some(output) = snapshot.output {
            self.emit(SessionEvent::output_updated(
                output,
                snapshot.outcome,
                snapshot.error_occurred,
            ));
        }
    }
}

/// One user's compile-and-repair session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("languages", &self.inner.catalog.len())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over the given judge and AI backend.
    ///
    /// Starts with the default program in the configured default language.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` for an invalid language list and
    /// `UnknownLanguage` if the default language is not in it.
    pub fn new(config: &Config, judge: Arc<dyn JudgeApi>, ai: Arc<dyn AiBackend>) -> Result<Self> {
        let catalog = config.catalog()?;
        let language = catalog
            .by_id(config.default_language_id)
            .cloned()
            .ok_or(JudgeLoopError::UnknownLanguage {
                id: config.default_language_id,
            })?;
        let state = SessionState::new(DEFAULT_SOURCE, language, config.theme.clone());

        Ok(Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                judge,
                ai,
                catalog,
                events: EventBroadcaster::default(),
                settings: SessionSettings::from_config(config),
                chat: Mutex::new(None),
            }),
        })
    }

    /// Creates a session talking HTTP to the configured judge and AI backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built or the configuration is
    /// inconsistent.
    pub fn from_config(config: &Config) -> Result<Self> {
        let judge = HttpJudgeClient::new(&config.judge, config.request_timeout())?;
        let ai = HttpAiClient::new(&config.ai, config.request_timeout())?;
        Self::new(config, Arc::new(judge), Arc::new(ai))
    }

    /// The fixed language catalog.
    #[must_use]
    pub fn catalog(&self) -> &LanguageCatalog {
        &self.inner.catalog
    }

    /// The session's event broadcaster.
    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns a copy of the session state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    // ------------------------------------------------------------------------
    // Editor
    // ------------------------------------------------------------------------

    /// Replaces the code buffer with the user's edit.
    ///
    /// A running conversation is restarted first, so a reply still in flight
    /// cannot overwrite the edit.
    pub async fn set_code(&self, code: impl Into<String>) {
        let code = code.into();
        if self.inner.state.lock().await.code() != code {
            self.restart_running_chat().await;
        }
        self.inner.state.lock().await.replace_code(code);
    }

    /// Selects a language by judge id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLanguage` if the id is not in the catalog.
    pub async fn select_language(&self, id: u32) -> Result<Language> {
        let language = self
            .inner
            .catalog
            .by_id(id)
            .cloned()
            .ok_or(JudgeLoopError::UnknownLanguage { id })?;
        if self.inner.state.lock().await.language().value != language.value {
            self.restart_running_chat().await;
        }
        self.inner
            .state
            .lock()
            .await
            .switch_language(language.clone());
        info!(language_id = id, "Language selected");
        self.inner
            .emit(SessionEvent::language_changed(language.clone()));
        Ok(language)
    }

    /// Selects an editor theme.
    pub async fn set_theme(&self, theme: Theme) {
        self.inner.state.lock().await.set_theme(theme);
    }

    // ------------------------------------------------------------------------
    // Compile
    // ------------------------------------------------------------------------

    /// Starts a compile chain for the current code and language.
    ///
    /// Any chain already in flight is superseded and will not write its
    /// result. The returned handle resolves once the chain has applied its
    /// result; dropping it does not stop the chain.
    ///
    /// # Errors
    ///
    /// Returns `EmptySource` if the code buffer is blank.
    pub async fn compile(&self) -> Result<JoinHandle<()>> {
        let (token, language, code) = {
            let mut state = self.inner.state.lock().await;
            if state.code().trim().is_empty() {
                return Err(JudgeLoopError::EmptySource);
            }
            let token = state.begin_processing();
            (token, state.language().clone(), state.code().to_string())
        };

        info!(language_id = language.id, code_len = code.len(), "Compile started");
        self.inner
            .emit(SessionEvent::compile_started(language.id));

        let session = self.clone();
        Ok(tokio::spawn(async move {
            session.drive_compile(token, language, code).await;
        }))
    }

    async fn drive_compile(&self, token: CancellationToken, language: Language, code: String) {
        let inner = &self.inner;
        let result = poller::run(
            inner.judge.as_ref(),
            &language,
            &code,
            inner.settings.poll_interval,
            &token,
        )
        .await;

        match result {
            Ok(PollOutcome::Completed { details, polls }) => {
                let status_id = details.status.id;
                let snapshot = {
                    let mut state = inner.state.lock().await;
                    if !state.finish_processing(&token, Some(details)) {
                        debug!("Compile result arrived after being superseded");
                        return;
                    }
                    state.snapshot()
                };
                info!(status_id, polls, "Compile finished");
                inner.emit_output(snapshot);
                inner.notify_success(COMPILE_SUCCESS_MESSAGE);
            }
            Ok(PollOutcome::Superseded) => {
                debug!("Compile chain superseded");
            }
            Err(e) => {
                if !inner.state.lock().await.finish_processing(&token, None) {
                    debug!(error = %e, "Superseded compile chain failed");
                    return;
                }
                warn!(error = %e, transient = e.is_transient(), "Compile failed");
                inner.notify_error(&e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Regenerate
    // ------------------------------------------------------------------------

    /// Asks the AI backend to fix the last failed run.
    ///
    /// The returned handle resolves once the result has been applied. The
    /// `regenerating` flag is released however the call ends.
    ///
    /// # Errors
    ///
    /// Returns `NothingToRegenerate` if the last run did not fail or carries
    /// no error text, `AlreadyRunning` if a regeneration is in flight, and
    /// `Decode` if the error payload cannot be decoded.
    pub async fn regenerate(&self) -> Result<JoinHandle<()>> {
        let (error_text, code, language) = {
            let mut state = self.inner.state.lock().await;
            let error_text = state
                .failure_text()?
                .ok_or(JudgeLoopError::NothingToRegenerate)?;
            state.begin_regenerating()?;
            (
                error_text,
                state.code().to_string(),
                state.language().clone(),
            )
        };

        info!(language = %language.value, "Regeneration started");
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            let call = regen::regenerate(inner.ai.as_ref(), &error_text, &code, &language);
            let result = AssertUnwindSafe(call).catch_unwind().await;

            let mut state = inner.state.lock().await;
            state.finish_regenerating();
            match result {
                Ok(Ok(fixed)) => {
                    state.replace_code(fixed.clone());
                    state.clear_error_payload();
                    let snapshot = state.snapshot();
                    drop(state);
                    inner.emit(SessionEvent::code_replaced(fixed, CodeSource::Regeneration));
                    inner.emit_output(snapshot);
                    inner.notify_success(REGEN_SUCCESS_MESSAGE);
                }
                Ok(Err(_)) => {
                    drop(state);
                    inner.notify_failure(
                        REGEN_FAILURE_MESSAGE,
                        inner.settings.notifications.error_ms,
                    );
                }
                Err(_) => {
                    drop(state);
                    error!("Regeneration task panicked");
                    inner.notify_failure(
                        REGEN_FAILURE_MESSAGE,
                        inner.settings.notifications.error_ms,
                    );
                }
            }
        }))
    }

    // ------------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------------

    /// Starts a fresh conversation, tearing down the previous one.
    ///
    /// Returns the opening transcript.
    ///
    /// # Errors
    ///
    /// Propagates the machine's start error (not expected for a new machine).
    pub async fn start_chat(&self) -> Result<Vec<ChatMessage>> {
        let machine = self.new_chat_machine();
        let previous = self.inner.chat.lock().await.replace(machine.clone());
        if let Some(previous) = previous {
            previous.teardown().await;
        }
        machine.start().await
    }

    fn new_chat_machine(&self) -> ChatMachine {
        let host = Arc::new(SessionChatHost {
            session: Arc::downgrade(&self.inner),
        });
        ChatMachine::new(
            Arc::clone(&self.inner.ai),
            host,
            self.inner.settings.chat_reply_delay,
        )
    }

    /// Replaces a running conversation with a fresh one.
    ///
    /// The old machine is torn down before this returns. Does nothing when no
    /// conversation is running.
    async fn restart_running_chat(&self) {
        let machine = {
            let mut slot = self.inner.chat.lock().await;
            let Some(previous) = slot.take() else {
                return;
            };
            previous.teardown().await;
            let machine = self.new_chat_machine();
            *slot = Some(machine.clone());
            machine
        };
        debug!("Conversation restarted after an edit");
        if let Err(e) = machine.start().await {
            warn!(error = %e, "Failed to restart conversation");
        }
    }

    /// Sends user text to the current conversation.
    ///
    /// Resolves with the transcript once the bot answered and the follow-up
    /// was shown.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if no conversation is running or it
    /// is not waiting for the user.
    pub async fn send_chat_message(&self, text: impl Into<String>) -> Result<Vec<ChatMessage>> {
        let Some(machine) = self.chat_machine().await else {
            return Err(JudgeLoopError::invalid_transition(
                "idle",
                ChatStepId::FetchBotResponse,
            ));
        };
        machine.submit_user_text(text).await
    }

    /// Tears down the current conversation, if any.
    pub async fn end_chat(&self) {
        let machine = self.inner.chat.lock().await.take();
        if let Some(machine) = machine {
            machine.teardown().await;
        }
    }

    /// Handle to the current conversation.
    pub async fn chat_machine(&self) -> Option<ChatMachine> {
        self.inner.chat.lock().await.clone()
    }

    /// Transcript of the current conversation; empty when there is none.
    pub async fn chat_transcript(&self) -> Vec<ChatMessage> {
        match self.chat_machine().await {
            Some(machine) => machine.transcript().await,
            None => Vec::new(),
        }
    }

    /// Cancels the compile chain in flight and ends the conversation.
    pub async fn shutdown(&self) {
        self.inner.state.lock().await.cancel_processing();
        self.end_chat().await;
        info!("Session shut down");
    }
}

/// The session as seen by its chat machine.
///
/// Holds a weak reference so the machine stored in the session does not keep
/// the session alive.
struct SessionChatHost {
    session: Weak<SessionInner>,
}

#[async_trait]
impl ChatHost for SessionChatHost {
    async fn context(&self) -> ChatContext {
        let Some(inner) = self.session.upgrade() else {
            return ChatContext::default();
        };
        let state = inner.state.lock().await;
        ChatContext {
            lang: state.language().name.clone(),
            code: state.code().to_string(),
            error: state.failure_text().unwrap_or_else(|e| {
                warn!(error = %e, "Error payload is not decodable, sending none");
                None
            }),
        }
    }

    async fn apply_reply(&self, reply: &ChatReply) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        let mut events = Vec::new();
        {
            let mut state = inner.state.lock().await;
            if let Some(code) = &reply.fixed_code {
                state.replace_code(code.clone());
                events.push(SessionEvent::code_replaced(code.clone(), CodeSource::Chat));
            }
            if let Some(value) = &reply.language {
                match inner.catalog.by_value(value) {
                    Some(language) => {
                        state.switch_language(language.clone());
                        events.push(SessionEvent::language_changed(language.clone()));
                    }
                    None => debug!(language = %value, "Assistant picked an unknown language"),
                }
            }
        }
        for event in events {
            inner.emit(event);
        }
    }

    fn on_message(&self, message: &ChatMessage) {
        if let Some(inner) = self.session.upgrade() {
            inner.emit(SessionEvent::chat_message(message.clone()));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

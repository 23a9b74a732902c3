//! Session events, broadcasting and the WebSocket stream.
//!
//! Everything a front end needs to render (notifications, new output, code
//! rewritten by the assistant, chat lines) is published as a
//! [`SessionEvent`] to every subscriber.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the session snapshot
//! - `compile_started` - A compile chain began
//! - `output_updated` - A new judge report was stored (or its error cleared)
//! - `code_replaced` - Regeneration or the chat assistant rewrote the code
//! - `language_changed` - The selected language changed
//! - `notification` - A toast-worthy success or failure
//! - `chat_message` - A line was added to the chat transcript
//!
//! # Example
//!
//! ```no_run
//! use judgeloop_orchestrator::events::{EventBroadcaster, NotificationLevel, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::notification(
//!     NotificationLevel::Success,
//!     "Compiled Successfully!",
//!     1000,
//! ));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::chat::ChatMessage;
use crate::judge::OutputDetails;
use crate::language::Language;
use crate::session::Session;
use crate::session_state::SessionSnapshot;
use crate::status::Outcome;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it is right now.
    pub session: SessionSnapshot,
}

/// Payload for the `compile_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStartedPayload {
    /// Judge id of the language being compiled.
    pub language_id: u32,
    /// When the chain started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `output_updated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputUpdatedPayload {
    /// The stored judge report.
    pub output: OutputDetails,
    /// Its classification, when decodable.
    pub outcome: Option<Outcome>,
    /// The report is not Accepted.
    pub error_occurred: bool,
}

/// Why the code buffer was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    /// The AI fix endpoint.
    Regeneration,
    /// The chat assistant.
    Chat,
}

/// Payload for the `code_replaced` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReplacedPayload {
    /// The new source code.
    pub code: String,
    /// What rewrote it.
    pub source: CodeSource,
}

/// Payload for the `language_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageChangedPayload {
    /// The newly selected language.
    pub language: Language,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Something finished well.
    Success,
    /// Something failed.
    Error,
}

/// Payload for the `notification` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Severity.
    pub level: NotificationLevel,
    /// Text to show.
    pub message: String,
    /// How long to show it.
    pub duration_ms: u64,
    /// When it was raised.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `chat_message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    /// The transcript line.
    pub message: ChatMessage,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published by a session.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a compile chain begins.
    CompileStarted(CompileStartedPayload),
    /// Sent when the judge report changes.
    OutputUpdated(OutputUpdatedPayload),
    /// Sent when the code is rewritten for the user.
    CodeReplaced(CodeReplacedPayload),
    /// Sent when the language changes.
    LanguageChanged(LanguageChangedPayload),
    /// Sent for user-facing notifications.
    Notification(NotificationPayload),
    /// Sent for every chat transcript line.
    ChatMessage(ChatMessagePayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(session: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates a `CompileStarted` event.
    #[must_use]
    pub fn compile_started(language_id: u32) -> Self {
        Self::CompileStarted(CompileStartedPayload {
            language_id,
            timestamp: Utc::now(),
        })
    }

    /// Creates an `OutputUpdated` event.
    #[must_use]
    pub const fn output_updated(
        output: OutputDetails,
        outcome: Option<Outcome>,
        error_occurred: bool,
    ) -> Self {
        Self::OutputUpdated(OutputUpdatedPayload {
            output,
            outcome,
            error_occurred,
        })
    }

    /// Creates a `CodeReplaced` event.
    #[must_use]
    pub fn code_replaced(code: impl Into<String>, source: CodeSource) -> Self {
        Self::CodeReplaced(CodeReplacedPayload {
            code: code.into(),
            source,
        })
    }

    /// Creates a `LanguageChanged` event.
    #[must_use]
    pub const fn language_changed(language: Language) -> Self {
        Self::LanguageChanged(LanguageChangedPayload { language })
    }

    /// Creates a `Notification` event.
    #[must_use]
    pub fn notification(
        level: NotificationLevel,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self::Notification(NotificationPayload {
            level,
            message: message.into(),
            duration_ms,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `ChatMessage` event.
    #[must_use]
    pub const fn chat_message(message: ChatMessage) -> Self {
        Self::ChatMessage(ChatMessagePayload { message })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::CompileStarted(_) => "compile_started",
            Self::OutputUpdated(_) => "output_updated",
            Self::CodeReplaced(_) => "code_replaced",
            Self::LanguageChanged(_) => "language_changed",
            Self::Notification(_) => "notification",
            Self::ChatMessage(_) => "chat_message",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Heartbeat period.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(session): State<Session>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the session snapshot immediately
/// - Forwards every session event to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket(socket: WebSocket, session: Session) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so nothing published after the snapshot is lost
    let mut event_receiver = session.subscribe();

    let connected_event = SessionEvent::connected(session.snapshot().await);
    let connected_json = match serde_json::to_string(&connected_event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent session snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        // Commands go through the HTTP API
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================

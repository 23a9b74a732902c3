//! Scripted judge and AI backends for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::ai::{AiBackend, ChatReply, ChatRequest, RegenRequest};
use crate::error::{Backend, JudgeLoopError, Result};
use crate::judge::{JudgeApi, OutputDetails, SubmissionRequest};

/// Judge double: hands out tokens `T1`, `T2`, ... and answers polls from a
/// per-token script.
#[derive(Default)]
pub struct ScriptedJudge {
    create_errors: Mutex<VecDeque<JudgeLoopError>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<OutputDetails>>>>,
    submitted: Mutex<Vec<SubmissionRequest>>,
    polls: Mutex<Vec<(String, Instant)>>,
    latency: Duration,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every poll takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues poll answers for `token`.
    pub fn with_polls(self, token: &str, answers: Vec<OutputDetails>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_default()
            .extend(answers.into_iter().map(Ok));
        self
    }

    /// Queues a failing poll answer for `token`.
    pub fn with_poll_error(self, token: &str, error: JudgeLoopError) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(token.to_string())
            .or_default()
            .push_back(Err(error));
        self
    }

    /// The next create-submission call fails with `error`.
    pub fn with_create_error(self, error: JudgeLoopError) -> Self {
        self.create_errors.lock().unwrap().push_back(error);
        self
    }

    pub fn submitted(&self) -> Vec<SubmissionRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Instants at which polls for `token` were received.
    pub fn poll_times(&self, token: &str) -> Vec<Instant> {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().unwrap().len()
    }
}

#[async_trait]
impl JudgeApi for ScriptedJudge {
    async fn create_submission(&self, request: &SubmissionRequest) -> Result<String> {
        if let Some(error) = self.create_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("T{}", submitted.len()))
    }

    async fn get_submission(&self, token: &str) -> Result<OutputDetails> {
        self.polls
            .lock()
            .unwrap()
            .push((token.to_string(), Instant::now()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(token)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(JudgeLoopError::transport(
                Backend::Judge,
                Some(404),
                format!("no scripted answer for {token}"),
            ))
        })
    }
}

/// AI double answering from queues, with an optional per-call latency.
#[derive(Default)]
pub struct ScriptedAi {
    chat_replies: Mutex<VecDeque<Result<ChatReply>>>,
    regen_replies: Mutex<VecDeque<Result<String>>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    regen_requests: Mutex<Vec<RegenRequest>>,
    latency: Duration,
    panic_on_regen: bool,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_chat(self, reply: Result<ChatReply>) -> Self {
        self.chat_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_regen(self, reply: Result<String>) -> Self {
        self.regen_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn panicking_regen(mut self) -> Self {
        self.panic_on_regen = true;
        self
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn regen_requests(&self) -> Vec<RegenRequest> {
        self.regen_requests.lock().unwrap().clone()
    }
}

/// Builds a chat reply without optional fields.
pub fn chat_reply(chat: &str) -> ChatReply {
    ChatReply {
        chat: chat.to_string(),
        fixed_code: None,
        language: None,
    }
}

#[async_trait]
impl AiBackend for ScriptedAi {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.chat_requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.chat_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(JudgeLoopError::transport(Backend::Ai, Some(500), "no scripted chat")))
    }

    #[allow(clippy::panic)]
    async fn regenerate(&self, request: &RegenRequest) -> Result<String> {
        self.regen_requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.panic_on_regen {
            panic!("scripted regen panic");
        }
        let next = self.regen_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(JudgeLoopError::transport(Backend::Ai, Some(500), "no scripted regen")))
    }
}

//! Mock judge and AI backends served over real HTTP.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use judgeloop_orchestrator::{create_router, AppState, Config, Session};
use serde_json::{json, Value};

/// API key the mock judge expects.
pub const TEST_API_KEY: &str = "test-key";

/// Serves `router` on an ephemeral local port and returns its address.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    addr
}

/// A judge report in wire format.
pub fn report(status_id: u32, description: &str) -> Value {
    json!({
        "status": { "id": status_id, "description": description },
        "stdout": null,
        "stderr": null,
        "compile_output": null,
        "time": null,
        "memory": null
    })
}

/// A judge report carrying one encoded output field.
pub fn report_with(status_id: u32, description: &str, field: &str, encoded: &str) -> Value {
    let mut value = report(status_id, description);
    value[field] = Value::String(encoded.to_string());
    value
}

// ============================================================================
// Mock judge
// ============================================================================

/// Judge0 stand-in.
///
/// Each submission takes the next queued script; polls walk through it and
/// keep answering with its last report.
#[derive(Default)]
pub struct MockJudge {
    scripts: Mutex<VecDeque<Vec<Value>>>,
    active: Mutex<HashMap<String, VecDeque<Value>>>,
    submissions: Mutex<Vec<Value>>,
    api_keys: Mutex<Vec<Option<String>>>,
    polls: Mutex<Vec<String>>,
    quota_exceeded: Mutex<bool>,
}

impl MockJudge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the reports for the next submission.
    pub fn script(&self, reports: Vec<Value>) {
        self.scripts.lock().unwrap().push_back(reports);
    }

    /// Makes every create-submission call answer 429.
    pub fn exhaust_quota(&self) {
        *self.quota_exceeded.lock().unwrap() = true;
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn api_keys(&self) -> Vec<Option<String>> {
        self.api_keys.lock().unwrap().clone()
    }

    /// Tokens polled, in order.
    pub fn polls(&self) -> Vec<String> {
        self.polls.lock().unwrap().clone()
    }

    /// Serves the judge and returns its base URL.
    pub async fn spawn(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/submissions", post(create_submission))
            .route("/submissions/:token", get(get_submission))
            .with_state(Arc::clone(self));
        format!("http://{}", serve(router).await)
    }
}

async fn create_submission(
    State(judge): State<Arc<MockJudge>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if *judge.quota_exceeded.lock().unwrap() {
        return (StatusCode::TOO_MANY_REQUESTS, "quota").into_response();
    }
    judge.api_keys.lock().unwrap().push(
        headers
            .get("x-rapidapi-key")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
    );

    let mut submissions = judge.submissions.lock().unwrap();
    submissions.push(body);
    let token = format!("tok-{}", submissions.len());
    let script = judge.scripts.lock().unwrap().pop_front().unwrap_or_default();
    judge
        .active
        .lock()
        .unwrap()
        .insert(token.clone(), script.into());

    (StatusCode::CREATED, Json(json!({ "token": token }))).into_response()
}

async fn get_submission(
    State(judge): State<Arc<MockJudge>>,
    Path(token): Path<String>,
) -> Response {
    judge.polls.lock().unwrap().push(token.clone());
    let mut active = judge.active.lock().unwrap();
    let Some(script) = active.get_mut(&token) else {
        return (StatusCode::NOT_FOUND, "unknown token").into_response();
    };
    let next = if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    };
    match next {
        Some(report) => Json(report).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no script").into_response(),
    }
}

// ============================================================================
// Mock AI backend
// ============================================================================

/// AI backend stand-in answering every call with a fixed body.
pub struct MockAi {
    chat_answer: Mutex<Value>,
    regen_answer: Mutex<Value>,
    chat_bodies: Mutex<Vec<Value>>,
    regen_bodies: Mutex<Vec<Value>>,
}

impl MockAi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chat_answer: Mutex::new(json!({ "chat": "Looks fine to me" })),
            regen_answer: Mutex::new(json!({ "response": "console.log(5);" })),
            chat_bodies: Mutex::new(Vec::new()),
            regen_bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn answer_chat(&self, body: Value) {
        *self.chat_answer.lock().unwrap() = body;
    }

    pub fn answer_regen(&self, body: Value) {
        *self.regen_answer.lock().unwrap() = body;
    }

    pub fn chat_bodies(&self) -> Vec<Value> {
        self.chat_bodies.lock().unwrap().clone()
    }

    pub fn regen_bodies(&self) -> Vec<Value> {
        self.regen_bodies.lock().unwrap().clone()
    }

    /// Serves the backend and returns its base URL.
    pub async fn spawn(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/chat/", post(chat))
            .route("/regen/", post(regen))
            .with_state(Arc::clone(self));
        format!("http://{}", serve(router).await)
    }
}

async fn chat(State(ai): State<Arc<MockAi>>, Json(body): Json<Value>) -> Json<Value> {
    ai.chat_bodies.lock().unwrap().push(body);
    Json(ai.chat_answer.lock().unwrap().clone())
}

async fn regen(State(ai): State<Arc<MockAi>>, Json(body): Json<Value>) -> Json<Value> {
    ai.regen_bodies.lock().unwrap().push(body);
    Json(ai.regen_answer.lock().unwrap().clone())
}

// ============================================================================
// Session wiring
// ============================================================================

/// Configuration pointing at the mocks with short timers.
pub fn test_config(judge_url: &str, ai_url: &str) -> Config {
    let mut config = Config::default();
    config.judge.base_url = judge_url.to_string();
    config.judge.api_key = TEST_API_KEY.to_string();
    config.ai.base_url = ai_url.to_string();
    config.poll_interval_ms = 20;
    config.chat_reply_delay_ms = 10;
    config.request_timeout_secs = 5;
    config
}

/// Mocks plus a session talking to them over HTTP.
pub struct Harness {
    pub judge: Arc<MockJudge>,
    pub ai: Arc<MockAi>,
    pub config: Config,
    pub session: Session,
}

impl Harness {
    pub async fn start() -> Self {
        let judge = MockJudge::new();
        let ai = MockAi::new();
        let config = test_config(&judge.spawn().await, &ai.spawn().await);
        let session = Session::from_config(&config).expect("Failed to build session");
        Self {
            judge,
            ai,
            config,
            session,
        }
    }

    /// Serves the session API and returns its address.
    pub async fn serve_api(&self) -> SocketAddr {
        let state = AppState::new(self.session.clone());
        serve(create_router(state)).await
    }
}

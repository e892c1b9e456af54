// Mock Restreamer
// In-memory stand-in for the engine's HTTP API, served on an ephemeral port

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use multistream_control::models::Connection;
use multistream_control::services::{EventSink, RestreamerClient};

#[derive(Debug, Clone)]
pub struct MockOutput {
    pub id: String,
    pub address: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockProcess {
    pub id: String,
    pub input: String,
    pub outputs: Vec<MockOutput>,
    pub running: bool,
}

impl MockProcess {
    fn to_json(&self) -> Value {
        let (exec, order) = if self.running { ("running", "start") } else { ("finished", "stop") };
        json!({
            "id": self.id,
            "reference": self.id,
            "config": {
                "id": self.id,
                "input": [{ "id": "input_0", "address": self.input, "options": [] }],
                "output": self.outputs.iter().map(|o| json!({
                    "id": o.id,
                    "address": o.address,
                    "options": o.options,
                })).collect::<Vec<_>>(),
                "autostart": false,
            },
            "state": { "exec": exec, "order": order },
        })
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub processes: HashMap<String, MockProcess>,
    pub credentials: Option<(String, String)>,
    pub tokens: Vec<String>,
    pub encoding_supported: bool,
    /// Answer 501 instead of a bare 404 when live encoding is off
    pub encoding_not_implemented: bool,
    pub encoding_updates: Vec<(String, String, Value)>,
    pub source_size: (u32, u32),
    /// Reject every output add with a 500
    pub fail_adds: bool,
    /// Reject adds of these output ids with a 500
    pub failing_outputs: Vec<String>,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockRestreamer {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockRestreamer {
    pub async fn start() -> Self {
        Self::launch(MockState {
            source_size: (1920, 1080),
            ..MockState::default()
        })
        .await
    }

    pub async fn start_with_credentials(username: &str, password: &str) -> Self {
        Self::launch(MockState {
            credentials: Some((username.to_string(), password.to_string())),
            source_size: (1920, 1080),
            ..MockState::default()
        })
        .await
    }

    async fn launch(state: MockState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn connection(&self) -> Connection {
        let conn = Connection::new("127.0.0.1", self.addr.port());
        match &self.state.lock().unwrap().credentials {
            Some((user, pass)) => conn.with_credentials(user.clone(), pass.clone()),
            None => conn,
        }
    }

    pub fn client(&self) -> RestreamerClient {
        RestreamerClient::connect(self.connection()).unwrap()
    }

    pub fn process(&self, id: &str) -> Option<MockProcess> {
        self.state.lock().unwrap().processes.get(id).cloned()
    }

    pub fn process_count(&self) -> usize {
        self.state.lock().unwrap().processes.len()
    }

    pub fn output_ids(&self, id: &str) -> Vec<String> {
        self.process(id)
            .map(|p| p.outputs.into_iter().map(|o| o.id).collect())
            .unwrap_or_default()
    }

    /// Simulate an output the engine lost, e.g. after the ingest server hung up
    pub fn drop_output(&self, process_id: &str, output_id: &str) {
        if let Some(process) = self.state.lock().unwrap().processes.get_mut(process_id) {
            process.outputs.retain(|o| o.id != output_id);
        }
    }

    pub fn set_encoding_supported(&self, supported: bool) {
        self.state.lock().unwrap().encoding_supported = supported;
    }

    pub fn set_encoding_not_implemented(&self, not_implemented: bool) {
        self.state.lock().unwrap().encoding_not_implemented = not_implemented;
    }

    pub fn set_fail_adds(&self, fail: bool) {
        self.state.lock().unwrap().fail_adds = fail;
    }

    pub fn fail_adds_for(&self, output_id: &str) {
        self.state.lock().unwrap().failing_outputs.push(output_id.to_string());
    }

    pub fn set_source_size(&self, width: u32, height: u32) {
        self.state.lock().unwrap().source_size = (width, height);
    }

    pub fn encoding_updates(&self) -> Vec<(String, String, Value)> {
        self.state.lock().unwrap().encoding_updates.clone()
    }
}

/// Event sink that remembers every event name
#[derive(Default)]
pub struct CollectingEventSink {
    pub events: Mutex<Vec<(String, Value)>>,
}

impl CollectingEventSink {
    pub fn names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|(n, _)| n == name).count()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &str, payload: Value) {
        self.events.lock().unwrap().push((event.to_string(), payload));
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/api", get(info))
        .route("/api/login", post(login))
        .route("/api/v3/process", get(list_processes).post(create_process))
        .route("/api/v3/process/:id", get(get_process).delete(delete_process))
        .route("/api/v3/process/:id/command", put(command))
        .route("/api/v3/process/:id/state", get(process_state))
        .route("/api/v3/process/:id/probe", get(probe))
        .route("/api/v3/process/:id/config", get(config))
        .route("/api/v3/process/:id/report", get(report))
        .route("/api/v3/process/:id/outputs", get(list_outputs).post(add_output))
        .route("/api/v3/process/:id/outputs/:oid", axum::routing::delete(remove_output))
        .route("/api/v3/process/:id/outputs/:oid/encoding", put(update_encoding))
        .with_state(state)
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    if state.credentials.is_none() {
        return true;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| state.tokens.iter().any(|t| t == token))
}

macro_rules! guard {
    ($state:expr, $headers:expr) => {{
        let state = $state.lock().unwrap();
        if !authorized(&state, &$headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        state
    }};
}

async fn info() -> Json<Value> {
    Json(json!({ "app": "datarhei-core", "version": { "number": "16.14.0" } }))
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let Some((user, pass)) = state.credentials.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if body["username"] != json!(user) || body["password"] != json!(pass) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let token = format!("token-{}", state.tokens.len() + 1);
    state.tokens.push(token.clone());
    Json(json!({ "access_token": token })).into_response()
}

async fn list_processes(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = guard!(state, headers);
    let list: Vec<Value> = state.processes.values().map(MockProcess::to_json).collect();
    Json(json!(list)).into_response()
}

fn parse_output(value: &Value) -> MockOutput {
    MockOutput {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        address: value["address"].as_str().unwrap_or_default().to_string(),
        options: value["options"]
            .as_array()
            .map(|opts| opts.iter().filter_map(|o| o.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    }
}

async fn create_process(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = guard!(state, headers);
    let id = body["id"].as_str().unwrap_or_default().to_string();
    if id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if state.processes.contains_key(&id) {
        return (StatusCode::CONFLICT, "process already exists").into_response();
    }
    let process = MockProcess {
        id: id.clone(),
        input: body["input"][0]["address"].as_str().unwrap_or_default().to_string(),
        outputs: body["output"]
            .as_array()
            .map(|outputs| outputs.iter().map(parse_output).collect())
            .unwrap_or_default(),
        running: false,
    };
    let json = process.to_json();
    state.processes.insert(id, process);
    Json(json).into_response()
}

async fn get_process(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    match state.processes.get(&id) {
        Some(process) => Json(process.to_json()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_process(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let mut state = guard!(state, headers);
    match state.processes.remove(&id) {
        Some(_) => Json(json!("OK")).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn command(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = guard!(state, headers);
    let Some(process) = state.processes.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match body["command"].as_str() {
        Some("start") | Some("restart") => process.running = true,
        Some("stop") => process.running = false,
        _ => return StatusCode::BAD_REQUEST.into_response(),
    }
    Json(json!("OK")).into_response()
}

async fn process_state(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    match state.processes.get(&id) {
        Some(process) => Json(json!({
            "exec": if process.running { "running" } else { "finished" },
            "order": if process.running { "start" } else { "stop" },
            "runtime_seconds": 42,
            "progress": { "frame": 1260, "drop": 3, "fps": 30.0, "bitrate_kbit": 6128.5, "size_kb": 2048 },
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn probe(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    if !state.processes.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let (width, height) = state.source_size;
    Json(json!({
        "format": { "format_name": "flv", "duration": "0.0", "bit_rate": "6000000" },
        "streams": [
            { "codec": "h264", "type": "video", "width": width, "height": height, "r_frame_rate": "30/1" },
            { "codec": "aac", "type": "audio", "sampling_hz": 48000, "channels": 2 },
        ],
    }))
    .into_response()
}

async fn config(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    match state.processes.get(&id) {
        Some(process) => Json(process.to_json()["config"].clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn report(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    if !state.processes.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "log": [
            [1700000000, "ffmpeg version 6.1"],
            ["1700000001", "Output #0, flv"],
        ],
    }))
    .into_response()
}

async fn list_outputs(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let state = guard!(state, headers);
    match state.processes.get(&id) {
        Some(process) => Json(json!({
            "outputs": process.outputs.iter().map(|o| json!({ "id": o.id, "address": o.address })).collect::<Vec<_>>(),
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn add_output(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = guard!(state, headers);
    let output = parse_output(&body);
    if state.fail_adds || state.failing_outputs.contains(&output.id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "ffmpeg refused output").into_response();
    }
    let Some(process) = state.processes.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if process.outputs.iter().any(|o| o.id == output.id) {
        return (StatusCode::CONFLICT, "output already exists").into_response();
    }
    process.outputs.push(output);
    Json(json!("OK")).into_response()
}

async fn remove_output(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((id, oid)): Path<(String, String)>,
) -> Response {
    let mut state = guard!(state, headers);
    let Some(process) = state.processes.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let before = process.outputs.len();
    process.outputs.retain(|o| o.id != oid);
    if process.outputs.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!("OK")).into_response()
}

async fn update_encoding(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((id, oid)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = guard!(state, headers);
    if !state.encoding_supported {
        // Engines without the route answer like any unknown path
        return if state.encoding_not_implemented {
            StatusCode::NOT_IMPLEMENTED.into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        };
    }
    let exists = state
        .processes
        .get(&id)
        .is_some_and(|p| p.outputs.iter().any(|o| o.id == oid));
    if !exists {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.encoding_updates.push((id, oid, body));
    Json(json!("OK")).into_response()
}

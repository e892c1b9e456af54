// Restreamer Client Service
// Typed wrapper over the Restreamer REST API: auth, process CRUD, state, outputs

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::models::{
    Connection, EncodingParams, EngineInfo, LogEntry, ProbeInfo, ProbeStream, ProcessLifecycle,
    ProcessOutput, ProcessState, RemoteProcess,
};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Token lifetime assumed when the engine does not report one
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

const INPUT_ID: &str = "input_0";

/// Errors returned by the Restreamer API
#[derive(Debug, Clone, Error)]
pub enum RestreamerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Restreamer returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Not supported by Restreamer: {0}")]
    Unsupported(String),
}

impl RestreamerError {
    /// Failures callers should log and continue past
    pub fn is_soft(&self) -> bool {
        matches!(self, RestreamerError::Unsupported(_))
    }

    /// Failures that mean the engine could not be reached or trusted at all
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, RestreamerError::Connection(_) | RestreamerError::Auth(_))
    }
}

impl From<reqwest::Error> for RestreamerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RestreamerError::Remote {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: format!("Malformed response: {e}"),
            }
        } else {
            RestreamerError::Connection(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
struct AuthToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AuthToken {
    fn is_valid(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Exponential backoff between failed logins
#[derive(Debug, Clone)]
struct LoginBackoff {
    attempt: u32,
    last_failure: Option<Instant>,
    initial_delay: Duration,
    max_delay: Duration,
}

impl LoginBackoff {
    fn new() -> Self {
        Self {
            attempt: 0,
            last_failure: None,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }

    fn next_delay(&self) -> Duration {
        if self.attempt == 0 {
            return Duration::ZERO;
        }
        // initial * 2^(attempt-1), capped
        let factor = 1u32 << (self.attempt - 1).min(8);
        (self.initial_delay * factor).min(self.max_delay)
    }

    fn remaining(&self) -> Option<Duration> {
        let last = self.last_failure?;
        self.next_delay().checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    fn failed(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        self.last_failure = Some(Instant::now());
    }

    fn reset(&mut self) {
        self.attempt = 0;
        self.last_failure = None;
    }
}

// Wire shapes. The engine's responses are parsed leniently: unknown fields are
// ignored and missing ones default.

#[derive(Debug, Default, Deserialize)]
struct IoWire {
    #[serde(default)]
    id: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigWire {
    #[serde(default)]
    input: Vec<IoWire>,
    #[serde(default)]
    output: Vec<IoWire>,
    #[serde(default)]
    autostart: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ProgressWire {
    #[serde(default, alias = "frame")]
    frames: u64,
    #[serde(default, alias = "drop")]
    dropped_frames: u64,
    #[serde(default)]
    fps: f64,
    #[serde(default, alias = "bitrate_kbit")]
    bitrate: f64,
    #[serde(default)]
    size_kb: u64,
}

#[derive(Debug, Default, Deserialize)]
struct StateWire {
    #[serde(default)]
    exec: String,
    #[serde(default)]
    order: String,
    #[serde(default)]
    running: Option<bool>,
    #[serde(default)]
    runtime_seconds: u64,
    #[serde(default)]
    progress: ProgressWire,
}

impl StateWire {
    fn lifecycle(&self) -> ProcessLifecycle {
        match self.running {
            Some(true) => ProcessLifecycle::Running,
            Some(false) if self.exec.is_empty() => ProcessLifecycle::Stopped,
            _ => ProcessLifecycle::from_engine(&self.exec, &self.order),
        }
    }

    fn into_state(self) -> ProcessState {
        let is_running = self.lifecycle() == ProcessLifecycle::Running;
        ProcessState {
            is_running,
            exec: self.exec,
            fps: self.progress.fps,
            current_bitrate: self.progress.bitrate,
            frames: self.progress.frames,
            dropped_frames: self.progress.dropped_frames,
            size_kb: self.progress.size_kb,
            uptime_secs: self.runtime_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProcessWire {
    id: String,
    #[serde(default)]
    reference: String,
    #[serde(default)]
    config: Option<ConfigWire>,
    #[serde(default)]
    state: Option<StateWire>,
}

impl ProcessWire {
    fn into_process(self) -> RemoteProcess {
        let config = self.config.unwrap_or_default();
        let outputs = config
            .output
            .into_iter()
            .map(|o| ProcessOutput {
                video_filter: filter_from_options(&o.options),
                id: o.id,
                address: o.address,
                options: o.options,
            })
            .collect::<Vec<_>>();
        let video_filter = match outputs.first() {
            Some(first) if outputs.iter().all(|o| o.video_filter == first.video_filter) => {
                first.video_filter.clone()
            }
            _ => None,
        };
        RemoteProcess {
            id: self.id,
            reference: self.reference,
            input_url: config.input.into_iter().next().map(|i| i.address).unwrap_or_default(),
            outputs,
            video_filter,
            state: self.state.map(|s| s.lifecycle()).unwrap_or_default(),
            autostart: config.autostart,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormatWire {
    #[serde(default)]
    format_name: String,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default, alias = "bit_rate")]
    bitrate: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStreamWire {
    #[serde(default, alias = "codec")]
    codec_name: String,
    #[serde(default, alias = "type")]
    codec_type: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    pix_fmt: Option<String>,
    #[serde(default, alias = "sampling_hz")]
    sample_rate: Option<Value>,
    #[serde(default)]
    channels: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeWire {
    #[serde(default)]
    format: ProbeFormatWire,
    #[serde(default)]
    streams: Vec<ProbeStreamWire>,
}

fn value_as_f64(value: &Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse an ffprobe-style "num/den" rate
fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

impl ProbeWire {
    fn into_info(self) -> ProbeInfo {
        ProbeInfo {
            format_name: self.format.format_name,
            duration: value_as_f64(&self.format.duration),
            bitrate: value_as_f64(&self.format.bitrate) as u64,
            streams: self
                .streams
                .into_iter()
                .map(|s| ProbeStream {
                    fps: s
                        .fps
                        .or_else(|| s.r_frame_rate.as_deref().map(parse_frame_rate))
                        .unwrap_or(0.0),
                    sample_rate: match value_as_f64(&s.sample_rate) {
                        rate if rate > 0.0 => Some(rate as u32),
                        _ => None,
                    },
                    codec_name: s.codec_name,
                    codec_type: s.codec_type,
                    width: s.width,
                    height: s.height,
                    pix_fmt: s.pix_fmt,
                    channels: s.channels,
                })
                .collect(),
        }
    }
}

/// Video filter carried in an output's encoder options
fn filter_from_options(options: &[String]) -> Option<String> {
    options
        .iter()
        .position(|opt| opt == "-filter:v" || opt == "-vf")
        .and_then(|i| options.get(i + 1))
        .cloned()
}

/// Options for an output, with `filter` added unless it already carries one
fn output_options(output: &ProcessOutput, filter: Option<&str>) -> Vec<String> {
    let mut options = output.options.clone();
    let filter = output.video_filter.as_deref().or(filter);
    if let Some(filter) = filter {
        if filter_from_options(&options).is_none() {
            options.push("-filter:v".to_string());
            options.push(filter.to_string());
        }
    }
    options
}

/// Timestamps in reports are unix seconds, as a number or a string
fn parse_log_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_log_entries(report: &Value) -> Vec<LogEntry> {
    let Some(lines) = report.get("log").and_then(Value::as_array) else {
        return Vec::new();
    };

    lines
        .iter()
        .filter_map(|line| match line {
            Value::Array(pair) if pair.len() >= 2 => Some(LogEntry {
                timestamp: parse_log_timestamp(&pair[0]),
                message: pair[1].as_str().unwrap_or_default().to_string(),
            }),
            Value::Object(map) => Some(LogEntry {
                timestamp: map.get("timestamp").map(parse_log_timestamp).unwrap_or(0),
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            Value::String(message) => Some(LogEntry {
                timestamp: 0,
                message: message.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Client for one Restreamer instance
pub struct RestreamerClient {
    client: Client,
    connection: Connection,
    base_url: String,
    token: RwLock<Option<AuthToken>>,
    login_backoff: Mutex<LoginBackoff>,
}

impl RestreamerClient {
    /// Bind a client to a connection with the default timeout
    ///
    /// Does not contact the engine; use `test_connection` for that.
    pub fn connect(connection: Connection) -> Result<Self, RestreamerError> {
        Self::connect_with_timeout(connection, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn connect_with_timeout(connection: Connection, timeout: Duration) -> Result<Self, RestreamerError> {
        if connection.host.trim().is_empty() {
            return Err(RestreamerError::Connection("Host cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RestreamerError::Connection(format!("Failed to create HTTP client: {e}")))?;

        let base_url = connection.base_url();
        Ok(Self {
            client,
            connection,
            base_url,
            token: RwLock::new(None),
            login_backoff: Mutex::new(LoginBackoff::new()),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Connection & auth
    // ========================================================================

    /// Whether the engine is reachable and accepts our credentials
    pub async fn test_connection(&self) -> bool {
        match self.try_connection().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Restreamer connection test failed for {}: {e}", self.base_url);
                false
            }
        }
    }

    /// Like `test_connection`, but reports why it failed
    pub async fn try_connection(&self) -> Result<(), RestreamerError> {
        if self.connection.credentials().is_some() {
            self.login().await?;
        }
        match self.get_info().await {
            Ok(info) => {
                log::debug!("Connected to {} {}", info.name, info.version);
                Ok(())
            }
            Err(RestreamerError::NotFound(_)) => self.ping().await,
            Err(e) => Err(e),
        }
    }

    /// `GET /ping`
    pub async fn ping(&self) -> Result<(), RestreamerError> {
        let response = self.send(Method::GET, "/ping", None).await?;
        Self::check_status(response, "/ping").await.map(|_| ())
    }

    /// `GET /api`: engine name and version
    pub async fn get_info(&self) -> Result<EngineInfo, RestreamerError> {
        let value: Value = self.get_json("/api").await?;
        let name = value
            .get("app")
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("restreamer")
            .to_string();
        let version = match value.get("version") {
            Some(Value::String(v)) => v.clone(),
            Some(Value::Object(map)) => map
                .get("number")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        Ok(EngineInfo { name, version })
    }

    /// Obtain a fresh access token
    pub async fn login(&self) -> Result<(), RestreamerError> {
        let Some((username, password)) = self.connection.credentials() else {
            return Ok(());
        };

        let mut backoff = self.login_backoff.lock().await;
        if let Some(wait) = backoff.remaining() {
            return Err(RestreamerError::Auth(format!(
                "Login retry backoff active, next attempt in {}ms",
                wait.as_millis()
            )));
        }

        let response = self
            .client
            .post(format!("{}/api/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            backoff.failed();
            *self.token.write().await = None;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    RestreamerError::Auth(format!("Login rejected for user '{username}'"))
                }
                _ => RestreamerError::Remote {
                    status: status.as_u16(),
                    message: body,
                },
            });
        }

        let login: LoginResponse = response.json().await?;
        let expires_at = login
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

        *self.token.write().await = Some(AuthToken {
            access_token: login.access_token,
            expires_at,
        });
        backoff.reset();
        log::info!("Logged in to Restreamer at {}", self.base_url);
        Ok(())
    }

    async fn bearer(&self) -> Result<Option<String>, RestreamerError> {
        if self.connection.credentials().is_none() {
            return Ok(None);
        }
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_valid() {
                return Ok(Some(token.access_token.clone()));
            }
        }
        self.login().await?;
        Ok(self.token.read().await.as_ref().map(|t| t.access_token.clone()))
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, RestreamerError> {
        let mut request = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = self.bearer().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send a request, logging in again once if the token was rejected
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response, RestreamerError> {
        let response = self.send_once(method.clone(), path, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.connection.credentials().is_some() {
            log::debug!("Token rejected on {path}, logging in again");
            *self.token.write().await = None;
            return self.send_once(method, path, body).await;
        }
        Ok(response)
    }

    async fn check_status(response: Response, what: &str) -> Result<Response, RestreamerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RestreamerError::Auth(format!("{what}: {status}"))
            }
            StatusCode::NOT_FOUND => RestreamerError::NotFound(what.to_string()),
            StatusCode::CONFLICT => RestreamerError::Conflict(format!("{what}: {body}")),
            _ => RestreamerError::Remote {
                status: status.as_u16(),
                message: body,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestreamerError> {
        let response = self.send(Method::GET, path, None).await?;
        let response = Self::check_status(response, path).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(), RestreamerError> {
        let response = self.send(method, path, body).await?;
        Self::check_status(response, path).await.map(|_| ())
    }

    fn process_path(id: &str) -> String {
        format!("/api/v3/process/{}", encode(id))
    }

    // ========================================================================
    // Processes
    // ========================================================================

    pub async fn list_processes(&self) -> Result<Vec<RemoteProcess>, RestreamerError> {
        let processes: Vec<ProcessWire> = self.get_json("/api/v3/process").await?;
        Ok(processes.into_iter().map(ProcessWire::into_process).collect())
    }

    /// Create a process; fails with `Conflict` if the id is taken
    ///
    /// `filter` applies to every output that does not carry its own.
    pub async fn create_process(
        &self,
        id: &str,
        input_url: &str,
        outputs: &[ProcessOutput],
        filter: Option<&str>,
    ) -> Result<(), RestreamerError> {
        let output: Vec<Value> = outputs
            .iter()
            .map(|o| {
                json!({
                    "id": o.id,
                    "address": o.address,
                    "options": output_options(o, filter),
                })
            })
            .collect();

        let body = json!({
            "id": id,
            "reference": id,
            "input": [{ "id": INPUT_ID, "address": input_url, "options": [] }],
            "output": output,
            "options": ["-err_detect", "ignore_err"],
            "reconnect": true,
            "reconnect_delay_seconds": 15,
            "autostart": false,
        });

        self.execute(Method::POST, "/api/v3/process", Some(&body)).await?;
        log::info!("Created process {id} with {} outputs", outputs.len());
        Ok(())
    }

    pub async fn get_process(&self, id: &str) -> Result<RemoteProcess, RestreamerError> {
        let process: ProcessWire = self.get_json(&Self::process_path(id)).await?;
        Ok(process.into_process())
    }

    pub async fn delete_process(&self, id: &str) -> Result<(), RestreamerError> {
        self.execute(Method::DELETE, &Self::process_path(id), None).await?;
        log::info!("Deleted process {id}");
        Ok(())
    }

    async fn command(&self, id: &str, command: &str) -> Result<(), RestreamerError> {
        let path = format!("{}/command", Self::process_path(id));
        self.execute(Method::PUT, &path, Some(&json!({ "command": command })))
            .await
    }

    pub async fn start_process(&self, id: &str) -> Result<(), RestreamerError> {
        self.command(id, "start").await?;
        log::info!("Started process {id}");
        Ok(())
    }

    /// Stop a process; stopping a stopped process succeeds
    pub async fn stop_process(&self, id: &str) -> Result<(), RestreamerError> {
        self.command(id, "stop").await?;
        log::info!("Stopped process {id}");
        Ok(())
    }

    pub async fn restart_process(&self, id: &str) -> Result<(), RestreamerError> {
        self.command(id, "restart").await?;
        log::info!("Restarted process {id}");
        Ok(())
    }

    pub async fn get_process_state(&self, id: &str) -> Result<ProcessState, RestreamerError> {
        let path = format!("{}/state", Self::process_path(id));
        let state: StateWire = self.get_json(&path).await?;
        Ok(state.into_state())
    }

    pub async fn probe_input(&self, id: &str) -> Result<ProbeInfo, RestreamerError> {
        let path = format!("{}/probe", Self::process_path(id));
        let probe: ProbeWire = self.get_json(&path).await?;
        Ok(probe.into_info())
    }

    /// Effective process configuration as reported by the engine
    pub async fn get_process_config(&self, id: &str) -> Result<Value, RestreamerError> {
        self.get_json(&format!("{}/config", Self::process_path(id))).await
    }

    pub async fn get_process_logs(&self, id: &str) -> Result<Vec<LogEntry>, RestreamerError> {
        let report: Value = self.get_json(&format!("{}/report", Self::process_path(id))).await?;
        Ok(parse_log_entries(&report))
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    pub async fn get_process_outputs(&self, id: &str) -> Result<Vec<String>, RestreamerError> {
        let value: Value = self
            .get_json(&format!("{}/outputs", Self::process_path(id)))
            .await?;
        let list: &[Value] = match &value {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => map
                .get("outputs")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        };
        Ok(list
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.clone()),
                Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect())
    }

    /// Add an output to a (possibly running) process
    pub async fn add_process_output(&self, id: &str, output: &ProcessOutput) -> Result<(), RestreamerError> {
        let path = format!("{}/outputs", Self::process_path(id));
        let body = json!({
            "id": output.id,
            "address": output.address,
            "options": output_options(output, None),
            "video_filter": output.video_filter,
        });
        self.execute(Method::POST, &path, Some(&body)).await?;
        log::info!("Added output {} to process {id}", output.id);
        Ok(())
    }

    pub async fn remove_process_output(&self, id: &str, output_id: &str) -> Result<(), RestreamerError> {
        let path = format!("{}/outputs/{}", Self::process_path(id), encode(output_id));
        self.execute(Method::DELETE, &path, None).await?;
        log::info!("Removed output {output_id} from process {id}");
        Ok(())
    }

    /// Change encoding of one output without restarting the process
    ///
    /// Engines that cannot do this answer with `Unsupported`. A process or
    /// output that doesn't exist is `NotFound`.
    pub async fn update_output_encoding(
        &self,
        id: &str,
        output_id: &str,
        params: &EncodingParams,
    ) -> Result<(), RestreamerError> {
        let path = format!("{}/outputs/{}/encoding", Self::process_path(id), encode(output_id));

        let mut body = serde_json::Map::new();
        if params.video_bitrate > 0 {
            body.insert("video_bitrate".into(), json!(params.video_bitrate as u64 * 1000));
        }
        if params.audio_bitrate > 0 {
            body.insert("audio_bitrate".into(), json!(params.audio_bitrate as u64 * 1000));
        }
        if params.width > 0 && params.height > 0 {
            body.insert("resolution".into(), json!({ "width": params.width, "height": params.height }));
        }
        if params.fps_num > 0 && params.fps_den > 0 {
            body.insert("fps".into(), json!({ "num": params.fps_num, "den": params.fps_den }));
        }
        if let Some(preset) = &params.preset {
            body.insert("preset".into(), json!(preset));
        }
        if let Some(profile) = &params.profile {
            body.insert("profile".into(), json!(profile));
        }

        let response = self.send(Method::PUT, &path, Some(&Value::Object(body))).await?;
        let unsupported = || {
            RestreamerError::Unsupported(format!("live encoding update for output {output_id}"))
        };
        match response.status() {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => Err(unsupported()),
            // A 404 is either a missing route or a missing process/output
            StatusCode::NOT_FOUND => {
                if self.get_process_outputs(id).await?.iter().any(|o| o == output_id) {
                    Err(unsupported())
                } else {
                    Err(RestreamerError::NotFound(format!("output {output_id} of process {id}")))
                }
            }
            _ => Self::check_status(response, &path).await.map(|_| ()),
        }
    }
}

// Process Model
// Restreamer transcoding jobs and their runtime snapshots

use serde::{Deserialize, Serialize};

/// Lifecycle of a remote process as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessLifecycle {
    Created,
    Running,
    Stopped,
    Failed,
    #[default]
    Unknown,
}

impl ProcessLifecycle {
    /// Map the engine's `exec` / `order` strings onto a lifecycle state
    pub fn from_engine(exec: &str, order: &str) -> Self {
        match exec {
            "running" | "starting" => ProcessLifecycle::Running,
            "failed" | "killed" => ProcessLifecycle::Failed,
            "finished" | "finishing" => ProcessLifecycle::Stopped,
            _ => match order {
                "start" => ProcessLifecycle::Running,
                "stop" => ProcessLifecycle::Stopped,
                "" => ProcessLifecycle::Created,
                _ => ProcessLifecycle::Unknown,
            },
        }
    }
}

/// One output of a remote process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    pub id: String,
    pub address: String,

    /// Video filter applied to this output only
    #[serde(default)]
    pub video_filter: Option<String>,

    /// Extra encoder arguments for this output
    #[serde(default)]
    pub options: Vec<String>,
}

impl ProcessOutput {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            video_filter: None,
            options: Vec::new(),
        }
    }
}

/// A transcoding job on the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProcess {
    pub id: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub input_url: String,
    #[serde(default)]
    pub outputs: Vec<ProcessOutput>,
    #[serde(default)]
    pub video_filter: Option<String>,
    #[serde(default)]
    pub state: ProcessLifecycle,
    #[serde(default)]
    pub autostart: bool,
}

/// Point-in-time runtime snapshot of a process (never persisted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub is_running: bool,
    pub exec: String,
    pub fps: f64,
    /// Current output bitrate in kbps
    pub current_bitrate: f64,
    pub frames: u64,
    pub dropped_frames: u64,
    pub size_kb: u64,
    pub uptime_secs: u64,
}

/// One elementary stream reported by an input probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStream {
    pub codec_name: String,
    pub codec_type: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pix_fmt: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Input diagnostics for a process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeInfo {
    pub format_name: String,
    pub duration: f64,
    pub bitrate: u64,
    pub streams: Vec<ProbeStream>,
}

impl ProbeInfo {
    /// First video stream, if the input has one
    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }
}

/// One line of a process report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unix timestamp, or 0 when the engine omitted it
    pub timestamp: i64,
    pub message: String,
}

/// Name and version of the engine behind an API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

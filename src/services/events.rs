// Events
// Lifecycle and failover notifications for whoever hosts the control plane

use serde::Serialize;
use serde_json::Value;

pub const EVENT_PROFILE_STARTED: &str = "profile://started";
pub const EVENT_PROFILE_STOPPED: &str = "profile://stopped";
pub const EVENT_PROFILE_ERROR: &str = "profile://error";
pub const EVENT_PREVIEW_STARTED: &str = "preview://started";
pub const EVENT_PREVIEW_LIVE: &str = "preview://live";
pub const EVENT_PREVIEW_EXPIRED: &str = "preview://expired";
pub const EVENT_DESTINATION_DEGRADED: &str = "failover://degraded";
pub const EVENT_FAILOVER_TRIGGERED: &str = "failover://triggered";
pub const EVENT_FAILOVER_RESTORED: &str = "failover://restored";
pub const EVENT_FAILOVER_FAILED: &str = "failover://failed";
pub const EVENT_DESTINATION_RECONNECTING: &str = "failover://reconnecting";
pub const EVENT_DESTINATION_RECONNECTED: &str = "failover://reconnected";
pub const EVENT_DESTINATION_DISABLED: &str = "failover://disabled";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &str, _payload: Value) {}
}

/// Writes every event to the log
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &str, payload: Value) {
        log::info!(target: "events", "{event} {payload}");
    }
}

pub fn emit_event<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    if let Ok(value) = serde_json::to_value(payload) {
        sink.emit(event, value);
    }
}

/// Payload for profile lifecycle events
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEvent {
    pub profile_id: String,
    pub process_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for per-destination events
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationEvent {
    pub profile_id: String,
    pub destination_index: usize,
    pub destination_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_index: Option<usize>,
    pub consecutive_failures: u32,
}

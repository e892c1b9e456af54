// Destination Model
// One stream output target within an output profile

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::EncodingSettings;

/// Supported streaming services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    #[default]
    Custom,
    Twitch,
    Youtube,
    Facebook,
    Kick,
    Tiktok,
    Instagram,
    #[serde(rename = "x")]
    XTwitter,
}

impl Service {
    pub const ALL: [Service; 8] = [
        Service::Custom,
        Service::Twitch,
        Service::Youtube,
        Service::Facebook,
        Service::Kick,
        Service::Tiktok,
        Service::Instagram,
        Service::XTwitter,
    ];

    /// Stable lowercase identifier used in output ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Custom => "custom",
            Service::Twitch => "twitch",
            Service::Youtube => "youtube",
            Service::Facebook => "facebook",
            Service::Kick => "kick",
            Service::Tiktok => "tiktok",
            Service::Instagram => "instagram",
            Service::XTwitter => "x",
        }
    }
}

/// Aspect classification of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
    Square,
}

fn default_enabled() -> bool {
    true
}

fn default_health_check_enabled() -> bool {
    true
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_auto_reconnect() -> bool {
    true
}

/// Longest preview window or health check interval accepted, one day
pub const MAX_TIMER_SECS: u64 = 86_400;

/// `start + secs`, or `None` when that lies beyond what chrono can represent
fn offset_by_secs(start: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    start.checked_add_signed(Duration::try_seconds(secs)?)
}

/// Preview window armed on a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewWindow {
    pub started_at: DateTime<Utc>,
    /// Seconds until the preview lapses (0 = no timeout)
    pub timeout_secs: u64,
    /// The preview switched the destination on; cancelling switches it back off
    pub enabled_by_preview: bool,
}

impl PreviewWindow {
    pub fn new(timeout_secs: u64, enabled_by_preview: bool) -> Self {
        Self {
            started_at: Utc::now(),
            timeout_secs,
            enabled_by_preview,
        }
    }

    /// A window too long to represent never lapses
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.timeout_secs == 0 {
            return false;
        }
        offset_by_secs(self.started_at, self.timeout_secs).is_some_and(|end| now >= end)
    }
}

/// A single output target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDestination {
    /// Stable identifier, survives reordering and restarts
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub service: Service,

    /// Ingest server URL (may contain a `{stream_key}` template)
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub stream_key: String,

    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default)]
    pub encoding: EncodingSettings,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Index of the destination that takes over when this one fails
    #[serde(default)]
    pub backup_index: Option<usize>,

    #[serde(default = "default_health_check_enabled")]
    pub health_check_enabled: bool,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Traffic has been redirected to the backup
    #[serde(default)]
    pub failover_active: bool,

    /// Re-add the output after repeated failures when there is no backup
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(skip)]
    pub consecutive_failures: u32,

    #[serde(skip)]
    pub connected: bool,

    #[serde(skip)]
    pub last_health_check: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub failover_started_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub preview: Option<PreviewWindow>,

    #[serde(skip)]
    pub reconnect_attempts: u32,

    /// Output was dropped for a reconnect and is re-added at this time
    #[serde(skip)]
    pub reconnect_at: Option<DateTime<Utc>>,
}

impl OutputDestination {
    pub fn new(
        service: Service,
        url: impl Into<String>,
        stream_key: impl Into<String>,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            service,
            url: url.into(),
            stream_key: stream_key.into(),
            orientation,
            encoding,
            enabled: true,
            backup_index: None,
            health_check_enabled: true,
            health_check_interval_secs: default_health_check_interval(),
            failover_active: false,
            auto_reconnect: true,
            consecutive_failures: 0,
            connected: false,
            last_health_check: None,
            failover_started_at: None,
            preview: None,
            reconnect_attempts: 0,
            reconnect_at: None,
        }
    }

    /// Identifier of this destination's output inside the remote process
    pub fn output_id(&self) -> String {
        format!("{}-{}", self.service.as_str(), self.id)
    }

    /// Whether the destination should currently have a remote output
    pub fn is_streaming(&self) -> bool {
        self.enabled && !self.failover_active
    }

    /// Whether a health check is due at `now`
    pub fn health_check_due(&self, now: DateTime<Utc>) -> bool {
        if !self.health_check_enabled || !self.is_streaming() || self.reconnect_at.is_some() {
            return false;
        }
        match self.last_health_check {
            Some(last) => offset_by_secs(last, self.health_check_interval_secs)
                .is_some_and(|next| now >= next),
            None => true,
        }
    }

    /// Drop all runtime health state
    pub fn reset_health(&mut self) {
        self.consecutive_failures = 0;
        self.connected = false;
        self.last_health_check = None;
        self.reconnect_attempts = 0;
        self.reconnect_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> OutputDestination {
        OutputDestination::new(
            Service::Twitch,
            "rtmp://live.twitch.tv/app",
            "live_123",
            Orientation::Horizontal,
            EncodingSettings::default(),
        )
    }

    #[test]
    fn test_output_id_is_stable() {
        let dest = destination();
        assert_eq!(dest.output_id(), dest.output_id());
        assert!(dest.output_id().starts_with("twitch-"));
    }

    #[test]
    fn test_health_check_due() {
        let mut dest = destination();
        let now = Utc::now();
        assert!(dest.health_check_due(now));

        dest.last_health_check = Some(now);
        assert!(!dest.health_check_due(now + Duration::seconds(10)));
        assert!(dest.health_check_due(now + Duration::seconds(30)));

        dest.failover_active = true;
        assert!(!dest.health_check_due(now + Duration::seconds(60)));

        dest.failover_active = false;
        dest.reconnect_at = Some(now);
        assert!(!dest.health_check_due(now + Duration::seconds(60)));
    }

    #[test]
    fn test_runtime_fields_not_serialized() {
        let mut dest = destination();
        dest.consecutive_failures = 2;
        dest.connected = true;

        let json = serde_json::to_string(&dest).unwrap();
        assert!(!json.contains("consecutiveFailures"));

        let parsed: OutputDestination = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.consecutive_failures, 0);
        assert!(!parsed.connected);
        assert_eq!(parsed.id, dest.id);
    }

    #[test]
    fn test_preview_window_expiry() {
        let window = PreviewWindow::new(5, false);
        assert!(!window.is_expired(window.started_at));
        assert!(window.is_expired(window.started_at + Duration::seconds(5)));

        let unlimited = PreviewWindow::new(0, false);
        assert!(!unlimited.is_expired(unlimited.started_at + Duration::days(1)));
    }

    #[test]
    fn test_huge_timers_never_fire() {
        let now = Utc::now();
        for secs in [u64::MAX, 1 << 63, i64::MAX as u64] {
            let window = PreviewWindow::new(secs, true);
            assert!(!window.is_expired(window.started_at));
            assert!(!window.is_expired(window.started_at + Duration::days(365)));

            let mut dest = destination();
            dest.health_check_interval_secs = secs;
            dest.last_health_check = Some(now);
            assert!(!dest.health_check_due(now + Duration::days(365)));
        }
    }
}

// OutputProfile Model
// An input source fanned out to an ordered list of destinations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    DestinationTemplate, EncodingSettings, Orientation, OutputDestination, Service, MAX_TIMER_SECS,
};
use crate::services::{PlatformRegistry, RestreamerError};

fn default_input_url() -> String {
    "rtmp://localhost/live/obs_input".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

/// Errors raised by profile operations
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Destination index {index} out of range (profile has {len} destinations)")]
    InvalidIndex { index: usize, len: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Remote(#[from] RestreamerError),
}

/// Aggregate streaming status of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    #[default]
    Idle,
    Preview,
    Live,
    Stopped,
}

/// Generate a fresh profile id (`profile_<unix>_<rand>`)
pub fn generate_profile_id() -> String {
    format!("profile_{}_{:04x}", Utc::now().timestamp(), rand::random::<u16>())
}

/// A named group of destinations sharing one input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputProfile {
    pub id: String,
    pub name: String,

    #[serde(default = "default_input_url")]
    pub input_url: String,

    /// Declared or probed orientation of the input
    #[serde(default)]
    pub source_orientation: Orientation,

    #[serde(default)]
    pub destinations: Vec<OutputDestination>,

    /// Remote process realizing this profile, once created
    #[serde(default)]
    pub process_id: Option<String>,

    #[serde(default)]
    pub auto_start: bool,

    /// Consecutive failed health checks before failing over
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Health check interval given to destinations added to this profile
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Pause between dropping a failed output and adding it back
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Reconnects tried before a destination is disabled (0 = unlimited)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub status: ProfileStatus,

    #[serde(skip)]
    pub last_error: Option<String>,
}

/// Profile summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    pub status: ProfileStatus,
    pub destination_count: usize,
    pub enabled_count: usize,
    pub failover_count: usize,
}

impl OutputProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(generate_profile_id(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input_url: default_input_url(),
            source_orientation: Orientation::default(),
            destinations: Vec::new(),
            process_id: None,
            auto_start: false,
            failure_threshold: default_failure_threshold(),
            health_check_interval_secs: default_health_check_interval(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            created_at: Utc::now(),
            status: ProfileStatus::Idle,
            last_error: None,
        }
    }

    /// Process id used on the engine for this profile
    pub fn remote_process_id(&self) -> String {
        self.process_id
            .clone()
            .unwrap_or_else(|| format!("restream_{}", self.id))
    }

    /// Live or previewing
    pub fn is_active(&self) -> bool {
        matches!(self.status, ProfileStatus::Live | ProfileStatus::Preview)
    }

    pub fn destination(&self, index: usize) -> Result<&OutputDestination, ProfileError> {
        let len = self.destinations.len();
        self.destinations
            .get(index)
            .ok_or(ProfileError::InvalidIndex { index, len })
    }

    pub fn destination_mut(&mut self, index: usize) -> Result<&mut OutputDestination, ProfileError> {
        let len = self.destinations.len();
        self.destinations
            .get_mut(index)
            .ok_or(ProfileError::InvalidIndex { index, len })
    }

    fn check_index(&self, index: usize) -> Result<(), ProfileError> {
        self.destination(index).map(|_| ())
    }

    /// Destinations that should currently have a remote output
    pub fn streaming_destinations(&self) -> impl Iterator<Item = (usize, &OutputDestination)> {
        self.destinations
            .iter()
            .enumerate()
            .filter(|(_, dest)| dest.is_streaming())
    }

    /// Add a destination on a known service, using its default ingest URL
    pub fn add_destination(
        &mut self,
        service: Service,
        stream_key: &str,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Result<usize, ProfileError> {
        let url = PlatformRegistry::default_url(service, orientation);
        self.push_destination(service, url, stream_key, orientation, encoding)
    }

    /// Add a destination with an explicit ingest URL
    pub fn add_custom_destination(
        &mut self,
        url: &str,
        stream_key: &str,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Result<usize, ProfileError> {
        self.push_destination(Service::Custom, url.to_string(), stream_key, orientation, encoding)
    }

    /// Add a destination whose service, orientation and encoding come from a template
    pub fn add_destination_from_template(
        &mut self,
        template: &DestinationTemplate,
        stream_key: &str,
    ) -> Result<usize, ProfileError> {
        let index = self.add_destination(
            template.service,
            stream_key,
            template.orientation,
            template.encoding.clone(),
        )?;
        self.destinations[index].name = template.name.clone();
        Ok(index)
    }

    fn push_destination(
        &mut self,
        service: Service,
        url: String,
        stream_key: &str,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Result<usize, ProfileError> {
        encoding.validate().map_err(ProfileError::InvalidEncoding)?;

        let mut dest = OutputDestination::new(service, url, stream_key, orientation, encoding);
        dest.name = PlatformRegistry::get(service).name.to_string();
        dest.health_check_interval_secs = self.health_check_interval_secs;
        self.destinations.push(dest);
        Ok(self.destinations.len() - 1)
    }

    /// Index of the primary that names `index` as its backup
    pub fn backup_owner(&self, index: usize) -> Option<usize> {
        self.destinations
            .iter()
            .position(|dest| dest.backup_index == Some(index))
    }

    pub fn is_backup(&self, index: usize) -> bool {
        self.backup_owner(index).is_some()
    }

    /// Backup currently carrying traffic for a failed-over primary
    fn is_serving_failover(&self, index: usize) -> bool {
        self.backup_owner(index)
            .map(|primary| self.destinations[primary].failover_active)
            .unwrap_or(false)
    }

    /// Remove a destination, fixing backup links and shifting higher indices down
    pub fn remove_destination(&mut self, index: usize) -> Result<OutputDestination, ProfileError> {
        self.check_index(index)?;

        for dest in self.destinations.iter_mut() {
            match dest.backup_index {
                Some(backup) if backup == index => {
                    dest.backup_index = None;
                    dest.failover_active = false;
                    dest.failover_started_at = None;
                }
                Some(backup) if backup > index => dest.backup_index = Some(backup - 1),
                _ => {}
            }
        }

        Ok(self.destinations.remove(index))
    }

    pub fn set_destination_enabled(&mut self, index: usize, enabled: bool) -> Result<(), ProfileError> {
        self.check_index(index)?;
        if !enabled && self.is_serving_failover(index) {
            return Err(ProfileError::Conflict(format!(
                "Destination {index} is carrying traffic for a failed-over primary"
            )));
        }
        self.destinations[index].enabled = enabled;
        Ok(())
    }

    pub fn update_destination_encoding(
        &mut self,
        index: usize,
        encoding: EncodingSettings,
    ) -> Result<(), ProfileError> {
        self.check_index(index)?;
        encoding.validate().map_err(ProfileError::InvalidEncoding)?;
        self.destinations[index].encoding = encoding;
        Ok(())
    }

    pub fn set_destination_health_check(
        &mut self,
        index: usize,
        enabled: bool,
        interval_secs: u64,
    ) -> Result<(), ProfileError> {
        if interval_secs > MAX_TIMER_SECS {
            return Err(ProfileError::InvalidState(format!(
                "Health check interval {interval_secs}s exceeds {MAX_TIMER_SECS}s"
            )));
        }
        let dest = self.destination_mut(index)?;
        dest.health_check_enabled = enabled;
        if interval_secs > 0 {
            dest.health_check_interval_secs = interval_secs;
        }
        if !enabled {
            dest.consecutive_failures = 0;
        }
        Ok(())
    }

    /// Turn automatic reconnection on or off for every destination
    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        for dest in self.destinations.iter_mut() {
            dest.auto_reconnect = enabled;
            if !enabled {
                dest.reconnect_attempts = 0;
                dest.reconnect_at = None;
            }
        }
    }

    /// Link `backup` as the failover target of `primary`
    ///
    /// The backup starts disabled and only carries traffic once the
    /// primary fails over.
    pub fn set_destination_backup(&mut self, primary: usize, backup: usize) -> Result<(), ProfileError> {
        self.check_index(primary)?;
        self.check_index(backup)?;

        if primary == backup {
            return Err(ProfileError::Conflict(
                "A destination cannot be its own backup".to_string(),
            ));
        }
        if self.destinations[primary].failover_active {
            return Err(ProfileError::InvalidState(format!(
                "Destination {primary} is failed over; restore it before changing its backup"
            )));
        }
        if let Some(owner) = self.backup_owner(backup) {
            if owner != primary {
                return Err(ProfileError::Conflict(format!(
                    "Destination {backup} is already the backup of destination {owner}"
                )));
            }
        }

        // Walk the backup chain from the new backup; reaching the primary means a cycle
        let mut cursor = self.destinations[backup].backup_index;
        let mut steps = 0;
        while let Some(next) = cursor {
            if next == primary {
                return Err(ProfileError::Conflict(format!(
                    "Setting {backup} as backup of {primary} would create a cycle"
                )));
            }
            steps += 1;
            if steps > self.destinations.len() {
                break;
            }
            cursor = self.destinations.get(next).and_then(|dest| dest.backup_index);
        }

        self.destinations[primary].backup_index = Some(backup);
        self.destinations[backup].enabled = false;
        Ok(())
    }

    pub fn remove_destination_backup(&mut self, primary: usize) -> Result<Option<usize>, ProfileError> {
        let dest = self.destination(primary)?;
        if dest.failover_active {
            return Err(ProfileError::InvalidState(format!(
                "Destination {primary} is failed over; restore it before removing its backup"
            )));
        }
        Ok(self.destinations[primary].backup_index.take())
    }

    /// Set `enabled` on every named destination, or none if any index is invalid
    pub fn bulk_enable_destinations(&mut self, indices: &[usize], enabled: bool) -> Result<(), ProfileError> {
        for &index in indices {
            self.check_index(index)?;
            if !enabled && self.is_serving_failover(index) {
                return Err(ProfileError::Conflict(format!(
                    "Destination {index} is carrying traffic for a failed-over primary"
                )));
            }
        }
        for &index in indices {
            self.destinations[index].enabled = enabled;
        }
        Ok(())
    }

    /// Apply one encoding to every named destination
    pub fn bulk_update_encoding(
        &mut self,
        indices: &[usize],
        encoding: &EncodingSettings,
    ) -> Result<(), ProfileError> {
        encoding.validate().map_err(ProfileError::InvalidEncoding)?;
        for &index in indices {
            self.check_index(index)?;
        }
        for &index in indices {
            self.destinations[index].encoding = encoding.clone();
        }
        Ok(())
    }

    /// Delete exactly the named destinations; returns them in deletion order
    pub fn bulk_delete_destinations(&mut self, indices: &[usize]) -> Result<Vec<OutputDestination>, ProfileError> {
        for &index in indices {
            self.check_index(index)?;
        }

        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut removed = Vec::with_capacity(sorted.len());
        for index in sorted {
            removed.push(self.remove_destination(index)?);
        }
        Ok(removed)
    }

    /// Copy under a new id and name, with fresh destination ids and no runtime state
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        let mut copy = Self::new(name);
        copy.input_url = self.input_url.clone();
        copy.source_orientation = self.source_orientation;
        copy.auto_start = self.auto_start;
        copy.failure_threshold = self.failure_threshold;
        copy.health_check_interval_secs = self.health_check_interval_secs;
        copy.reconnect_delay_secs = self.reconnect_delay_secs;
        copy.max_reconnect_attempts = self.max_reconnect_attempts;
        copy.destinations = self
            .destinations
            .iter()
            .map(|dest| {
                let mut dest = dest.clone();
                dest.id = uuid::Uuid::new_v4().to_string();
                dest.failover_active = false;
                dest.failover_started_at = None;
                dest.preview = None;
                dest.reset_health();
                dest
            })
            .collect();
        // Backups stay disabled in the copy
        for index in 0..copy.destinations.len() {
            if let Some(backup) = copy.destinations[index].backup_index {
                if let Some(dest) = copy.destinations.get_mut(backup) {
                    dest.enabled = false;
                }
            }
        }
        copy
    }

    pub fn to_summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            destination_count: self.destinations.len(),
            enabled_count: self.destinations.iter().filter(|d| d.enabled).count(),
            failover_count: self.destinations.iter().filter(|d| d.failover_active).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(services: &[Service]) -> OutputProfile {
        let mut profile = OutputProfile::new("Test");
        for service in services {
            profile
                .add_destination(*service, "key", Orientation::Horizontal, EncodingSettings::default())
                .unwrap();
        }
        profile
    }

    #[test]
    fn test_generate_profile_id_format() {
        let id = generate_profile_id();
        assert!(id.starts_with("profile_"));
        assert_eq!(id.split('_').count(), 3);
    }

    #[test]
    fn test_add_destination_uses_service_url() {
        let profile = profile_with(&[Service::Youtube]);
        assert_eq!(profile.destinations[0].url, "rtmp://a.rtmp.youtube.com/live2");
        assert_eq!(profile.destinations[0].name, "YouTube");
        assert!(profile.destinations[0].enabled);
    }

    #[test]
    fn test_add_destination_rejects_invalid_encoding() {
        let mut profile = OutputProfile::new("Test");
        let mut enc = EncodingSettings::default();
        enc.height = 0;
        let result = profile.add_destination(Service::Twitch, "key", Orientation::Horizontal, enc);
        assert!(matches!(result, Err(ProfileError::InvalidEncoding(_))));
        assert!(profile.destinations.is_empty());
    }

    #[test]
    fn test_add_destination_rejects_oversized_bitrate() {
        let mut profile = OutputProfile::new("Test");
        let result = profile.add_destination(
            Service::Twitch,
            "key",
            Orientation::Horizontal,
            EncodingSettings::new(1920, 1080, 30, u32::MAX),
        );
        assert!(matches!(result, Err(ProfileError::InvalidEncoding(_))));
        assert!(profile.destinations.is_empty());
    }

    #[test]
    fn test_health_check_interval_is_bounded() {
        let mut profile = profile_with(&[Service::Twitch]);
        assert!(matches!(
            profile.set_destination_health_check(0, true, u64::MAX),
            Err(ProfileError::InvalidState(_))
        ));
        assert_eq!(profile.destinations[0].health_check_interval_secs, 30);

        profile.set_destination_health_check(0, true, MAX_TIMER_SECS).unwrap();
        assert_eq!(profile.destinations[0].health_check_interval_secs, MAX_TIMER_SECS);
    }

    #[test]
    fn test_set_backup_rejects_self_and_out_of_range() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube]);
        assert!(matches!(
            profile.set_destination_backup(0, 0),
            Err(ProfileError::Conflict(_))
        ));
        assert!(matches!(
            profile.set_destination_backup(0, 5),
            Err(ProfileError::InvalidIndex { index: 5, len: 2 })
        ));
        assert!(profile.destinations[0].backup_index.is_none());
    }

    #[test]
    fn test_set_backup_rejects_cycle() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube, Service::Kick]);
        profile.set_destination_backup(0, 1).unwrap();
        profile.set_destination_backup(1, 2).unwrap();
        assert!(matches!(
            profile.set_destination_backup(2, 0),
            Err(ProfileError::Conflict(_))
        ));
    }

    #[test]
    fn test_set_backup_disables_backup() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube]);
        profile.set_destination_backup(0, 1).unwrap();
        assert_eq!(profile.destinations[0].backup_index, Some(1));
        assert!(!profile.destinations[1].enabled);
        assert!(profile.is_backup(1));
        assert!(!profile.is_backup(0));
    }

    #[test]
    fn test_remove_backup_clears_reference() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube, Service::Kick]);
        profile.set_destination_backup(0, 1).unwrap();
        profile.destinations[0].failover_active = true;
        profile.destinations[1].enabled = true;

        profile.remove_destination(1).unwrap();
        assert_eq!(profile.destinations.len(), 2);
        assert!(profile.destinations[0].backup_index.is_none());
        assert!(!profile.destinations[0].failover_active);
    }

    #[test]
    fn test_remove_shifts_backup_indices() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube, Service::Kick]);
        profile.set_destination_backup(2, 1).unwrap();
        let kick_id = profile.destinations[2].id.clone();

        profile.remove_destination(0).unwrap();
        assert_eq!(profile.destinations[1].id, kick_id);
        assert_eq!(profile.destinations[1].backup_index, Some(0));
    }

    #[test]
    fn test_bulk_enable_round_trip() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube, Service::Kick]);
        profile.bulk_enable_destinations(&[0, 2], false).unwrap();
        let before: Vec<bool> = profile.destinations.iter().map(|d| d.enabled).collect();

        profile.bulk_enable_destinations(&[0, 2], true).unwrap();
        assert!(profile.destinations.iter().all(|d| d.enabled));

        profile.bulk_enable_destinations(&[0, 2], false).unwrap();
        let after: Vec<bool> = profile.destinations.iter().map(|d| d.enabled).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_bulk_enable_is_all_or_nothing() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube]);
        let result = profile.bulk_enable_destinations(&[0, 7], false);
        assert!(result.is_err());
        assert!(profile.destinations[0].enabled);
    }

    #[test]
    fn test_bulk_delete_reindexes() {
        let mut profile = profile_with(&[
            Service::Twitch,
            Service::Youtube,
            Service::Kick,
            Service::Facebook,
        ]);
        profile.set_destination_backup(3, 2).unwrap();
        let youtube = profile.destinations[1].id.clone();
        let facebook = profile.destinations[3].id.clone();

        let removed = profile.bulk_delete_destinations(&[0, 2, 0]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(profile.destinations.len(), 2);
        assert_eq!(profile.destinations[0].id, youtube);
        assert_eq!(profile.destinations[1].id, facebook);
        assert!(profile.destinations[1].backup_index.is_none());
    }

    #[test]
    fn test_disable_backup_during_failover_conflicts() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube]);
        profile.set_destination_backup(0, 1).unwrap();
        profile.destinations[0].failover_active = true;
        profile.destinations[1].enabled = true;

        assert!(matches!(
            profile.set_destination_enabled(1, false),
            Err(ProfileError::Conflict(_))
        ));
        assert!(profile.destinations[1].enabled);
    }

    #[test]
    fn test_duplicate_gets_fresh_ids() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube]);
        profile.set_destination_backup(0, 1).unwrap();
        profile.destinations[0].consecutive_failures = 2;

        let copy = profile.duplicate("Copy");
        assert_ne!(copy.id, profile.id);
        assert_eq!(copy.destinations.len(), 2);
        assert_ne!(copy.destinations[0].id, profile.destinations[0].id);
        assert_eq!(copy.destinations[0].backup_index, Some(1));
        assert_eq!(copy.destinations[0].consecutive_failures, 0);
        assert!(copy.process_id.is_none());
    }

    #[test]
    fn test_remote_process_id() {
        let profile = OutputProfile::with_id("profile_1_abcd", "Test");
        assert_eq!(profile.remote_process_id(), "restream_profile_1_abcd");
    }

    #[test]
    fn test_summary_counts() {
        let mut profile = profile_with(&[Service::Twitch, Service::Youtube, Service::Kick]);
        profile.set_destination_backup(0, 1).unwrap();
        let summary = profile.to_summary();
        assert_eq!(summary.destination_count, 3);
        assert_eq!(summary.enabled_count, 2);
        assert_eq!(summary.failover_count, 0);
    }
}

// ProfileManager Service
// Registry of output profiles; entry point for starting, stopping and failover

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::models::{OutputProfile, ProfileError, ProfileStatus, ProfileSummary};
use crate::services::{
    apply_template, emit_event, EncodingUpdate, EventSink, FailoverController, FailoverEvent,
    ProfileEvent, ProfileStore, RestreamerClient, TemplateCatalog, DestinationEvent,
    EVENT_PREVIEW_EXPIRED, EVENT_PREVIEW_LIVE, EVENT_PREVIEW_STARTED, EVENT_PROFILE_ERROR,
    EVENT_PROFILE_STARTED, EVENT_PROFILE_STOPPED,
};

/// A profile shared between callers and the health monitor
///
/// Every mutation goes through the mutex, so user actions and failover on
/// the same remote process never interleave.
pub type SharedProfile = Arc<Mutex<OutputProfile>>;

/// Registry slot; the id is cached so lookups never wait on a busy profile
struct ProfileEntry {
    id: String,
    profile: SharedProfile,
}

/// Owns every profile and the template catalog
pub struct ProfileManager {
    client: Arc<RestreamerClient>,
    profiles: RwLock<Vec<ProfileEntry>>,
    templates: TemplateCatalog,
    failover: FailoverController,
    events: Arc<dyn EventSink>,
    failure_threshold: u32,
    health_check_interval_secs: u64,
}

impl ProfileManager {
    pub fn new(client: Arc<RestreamerClient>, templates: TemplateCatalog, events: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            profiles: RwLock::new(Vec::new()),
            templates,
            failover: FailoverController::new(events.clone()),
            events,
            failure_threshold: crate::services::DEFAULT_FAILURE_THRESHOLD,
            health_check_interval_secs: 30,
        }
    }

    /// Health policy applied to profiles created from now on
    pub fn with_health_policy(mut self, failure_threshold: u32, health_check_interval_secs: u64) -> Self {
        self.failure_threshold = failure_threshold;
        self.health_check_interval_secs = health_check_interval_secs;
        self
    }

    pub fn client(&self) -> &RestreamerClient {
        &self.client
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn failover(&self) -> &FailoverController {
        &self.failover
    }

    fn emit_profile(&self, event: &str, profile: &OutputProfile, error: Option<String>) {
        emit_event(
            self.events.as_ref(),
            event,
            &ProfileEvent {
                profile_id: profile.id.clone(),
                process_id: profile.remote_process_id(),
                error,
            },
        );
    }

    fn emit_destination(&self, event: &str, profile: &OutputProfile, index: usize) {
        if let Some(dest) = profile.destinations.get(index) {
            emit_event(
                self.events.as_ref(),
                event,
                &DestinationEvent {
                    profile_id: profile.id.clone(),
                    destination_index: index,
                    destination_id: dest.id.clone(),
                    backup_index: dest.backup_index,
                    consecutive_failures: dest.consecutive_failures,
                },
            );
        }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Create an empty profile with a fresh, unique id
    pub async fn create_profile(&self, name: &str) -> Result<SharedProfile, ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::InvalidState("Profile name cannot be empty".to_string()));
        }

        let mut profiles = self.profiles.write().await;
        let mut profile = OutputProfile::new(name);
        while profiles.iter().any(|entry| entry.id == profile.id) {
            profile = OutputProfile::new(name);
        }
        profile.failure_threshold = self.failure_threshold;
        profile.health_check_interval_secs = self.health_check_interval_secs;

        log::info!("Created profile '{}' ({})", profile.name, profile.id);
        let entry = ProfileEntry {
            id: profile.id.clone(),
            profile: Arc::new(Mutex::new(profile)),
        };
        let shared = entry.profile.clone();
        profiles.push(entry);
        Ok(shared)
    }

    /// Register an existing profile, e.g. one loaded from disk
    pub async fn insert_profile(&self, mut profile: OutputProfile) -> Result<SharedProfile, ProfileError> {
        let mut profiles = self.profiles.write().await;
        if profiles.iter().any(|entry| entry.id == profile.id) {
            return Err(ProfileError::Conflict(format!("Profile '{}' already exists", profile.id)));
        }
        profile.status = ProfileStatus::Idle;

        let entry = ProfileEntry {
            id: profile.id.clone(),
            profile: Arc::new(Mutex::new(profile)),
        };
        let shared = entry.profile.clone();
        profiles.push(entry);
        Ok(shared)
    }

    pub async fn get_profile(&self, id: &str) -> Result<SharedProfile, ProfileError> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.profile.clone())
            .ok_or_else(|| ProfileError::NotFound(format!("Profile '{id}'")))
    }

    /// All profiles in creation order
    pub async fn profiles(&self) -> Vec<SharedProfile> {
        self.profiles
            .read()
            .await
            .iter()
            .map(|entry| entry.profile.clone())
            .collect()
    }

    pub async fn summaries(&self) -> Vec<ProfileSummary> {
        let mut summaries = Vec::new();
        for profile in self.profiles().await {
            summaries.push(profile.lock().await.to_summary());
        }
        summaries
    }

    pub async fn active_count(&self) -> usize {
        let mut count = 0;
        for profile in self.profiles().await {
            if profile.lock().await.is_active() {
                count += 1;
            }
        }
        count
    }

    /// Delete a profile together with its remote process
    ///
    /// If the engine can't be reached the profile is kept.
    pub async fn delete_profile(&self, id: &str) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        {
            let mut profile = shared.lock().await;
            profile.delete_remote(&self.client).await?;
            self.emit_profile(EVENT_PROFILE_STOPPED, &profile, None);
        }

        self.profiles
            .write()
            .await
            .retain(|entry| !Arc::ptr_eq(&entry.profile, &shared));
        log::info!("Deleted profile {id}");
        Ok(())
    }

    /// Copy a profile's destinations into a new, idle profile
    pub async fn duplicate_profile(&self, id: &str, name: &str) -> Result<SharedProfile, ProfileError> {
        let copy = self.get_profile(id).await?.lock().await.duplicate(name);
        self.insert_profile(copy).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn start_profile(&self, id: &str) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        match profile.start(&self.client).await {
            Ok(()) => {
                self.emit_profile(EVENT_PROFILE_STARTED, &profile, None);
                Ok(())
            }
            Err(e) => {
                self.emit_profile(EVENT_PROFILE_ERROR, &profile, Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub async fn stop_profile(&self, id: &str) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        profile.stop(&self.client).await?;
        self.emit_profile(EVENT_PROFILE_STOPPED, &profile, None);
        Ok(())
    }

    pub async fn restart_profile(&self, id: &str) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        profile.restart(&self.client).await?;
        self.emit_profile(EVENT_PROFILE_STARTED, &profile, None);
        Ok(())
    }

    /// Start every profile flagged for auto-start; failures are logged and returned
    pub async fn start_all(&self) -> Vec<(String, ProfileError)> {
        let mut failures = Vec::new();
        for shared in self.profiles().await {
            let mut profile = shared.lock().await;
            if !profile.auto_start || profile.is_active() {
                continue;
            }
            if let Err(e) = profile.start(&self.client).await {
                log::error!("Auto-start of '{}' failed: {e}", profile.name);
                self.emit_profile(EVENT_PROFILE_ERROR, &profile, Some(e.to_string()));
                failures.push((profile.id.clone(), e));
            } else {
                self.emit_profile(EVENT_PROFILE_STARTED, &profile, None);
            }
        }
        failures
    }

    /// Stop every active profile concurrently
    pub async fn stop_all(&self) -> Vec<(String, ProfileError)> {
        let profiles = self.profiles().await;
        let stops = profiles.iter().map(|shared| async move {
            let mut profile = shared.lock().await;
            if !profile.is_active() {
                return None;
            }
            match profile.stop(&self.client).await {
                Ok(()) => {
                    self.emit_profile(EVENT_PROFILE_STOPPED, &profile, None);
                    None
                }
                Err(e) => {
                    log::error!("Failed to stop '{}': {e}", profile.name);
                    Some((profile.id.clone(), e))
                }
            }
        });
        join_all(stops).await.into_iter().flatten().collect()
    }

    // ========================================================================
    // Preview
    // ========================================================================

    pub async fn start_preview(&self, id: &str, index: usize, timeout_secs: u64) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        profile.start_preview(&self.client, index, timeout_secs).await?;
        self.emit_destination(EVENT_PREVIEW_STARTED, &profile, index);
        Ok(())
    }

    pub async fn preview_to_live(&self, id: &str, index: usize) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        profile.preview_to_live(index)?;
        self.emit_destination(EVENT_PREVIEW_LIVE, &profile, index);
        Ok(())
    }

    pub async fn cancel_preview(&self, id: &str, index: usize) -> Result<(), ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        profile.cancel_preview(&self.client, index).await
    }

    // ========================================================================
    // Templates
    // ========================================================================

    /// Overwrite a destination's encoding with a catalog template
    pub async fn apply_template(
        &self,
        id: &str,
        index: usize,
        template_id: &str,
    ) -> Result<EncodingUpdate, ProfileError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| ProfileError::NotFound(format!("Template '{template_id}'")))?;

        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        let mut dest = profile.destination(index)?.clone();
        apply_template(&mut dest, template);
        profile
            .update_destination_encoding_live(&self.client, index, dest.encoding)
            .await
    }

    // ========================================================================
    // Failover
    // ========================================================================

    pub async fn check_failover(&self, id: &str) -> Result<Vec<FailoverEvent>, ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        Ok(self.failover.check_failover(&mut profile, &self.client).await)
    }

    pub async fn check_health(&self, id: &str) -> Result<Vec<FailoverEvent>, ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        Ok(self.failover.check_health(&mut profile, &self.client).await)
    }

    pub async fn trigger_failover(&self, id: &str, index: usize) -> Result<Option<FailoverEvent>, ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        self.failover.trigger_failover(&mut profile, &self.client, index).await
    }

    pub async fn restore_primary(&self, id: &str, index: usize) -> Result<Option<FailoverEvent>, ProfileError> {
        let shared = self.get_profile(id).await?;
        let mut profile = shared.lock().await;
        self.failover.restore_primary(&mut profile, &self.client, index).await
    }

    /// One health monitor pass over every active profile
    pub async fn run_health_checks(&self) {
        for shared in self.profiles().await {
            let mut profile = shared.lock().await;
            if !profile.is_active() {
                continue;
            }

            self.failover.check_health(&mut profile, &self.client).await;

            match profile.check_preview_timeouts(&self.client).await {
                Ok(expired) => {
                    for index in expired {
                        self.emit_destination(EVENT_PREVIEW_EXPIRED, &profile, index);
                    }
                }
                Err(e) => log::warn!("Preview timeout handling for '{}' failed: {e}", profile.name),
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub async fn save(&self, store: &ProfileStore) -> Result<(), ProfileError> {
        let mut order = Vec::new();
        for shared in self.profiles().await {
            let profile = shared.lock().await;
            store.save(&profile).map_err(ProfileError::Storage)?;
            order.push(profile.id.clone());
        }
        store.write_order(&order).map_err(ProfileError::Storage)
    }

    /// Register every stored profile not already known; returns how many were added
    pub async fn load(&self, store: &ProfileStore) -> Result<usize, ProfileError> {
        let mut added = 0;
        for profile in store.load_all().map_err(ProfileError::Storage)? {
            match self.insert_profile(profile).await {
                Ok(_) => added += 1,
                Err(ProfileError::Conflict(e)) => log::debug!("{e}"),
                Err(e) => return Err(e),
            }
        }
        log::info!("Loaded {added} profiles");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, EncodingSettings, Orientation, Service};
    use crate::services::NoopEventSink;

    fn manager() -> ProfileManager {
        let client = RestreamerClient::connect(Connection::new("127.0.0.1", 1)).unwrap();
        ProfileManager::new(Arc::new(client), TemplateCatalog::default(), Arc::new(NoopEventSink))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = manager().with_health_policy(5, 10);
        let a = manager.create_profile("A").await.unwrap();
        let b = manager.create_profile("B").await.unwrap();

        let a_id = a.lock().await.id.clone();
        let b_id = b.lock().await.id.clone();
        assert_ne!(a_id, b_id);
        assert_eq!(a.lock().await.failure_threshold, 5);
        assert_eq!(a.lock().await.health_check_interval_secs, 10);

        let fetched = manager.get_profile(&b_id).await.unwrap();
        assert!(Arc::ptr_eq(&fetched, &b));
        assert!(matches!(manager.get_profile("missing").await, Err(ProfileError::NotFound(_))));
        assert!(manager.create_profile("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_idle_profile() {
        let manager = manager();
        let profile = manager.create_profile("Idle").await.unwrap();
        let id = profile.lock().await.id.clone();

        manager.delete_profile(&id).await.unwrap();
        assert!(manager.get_profile(&id).await.is_err());
        assert!(manager.profiles().await.is_empty());
    }

    #[tokio::test]
    async fn test_insert_duplicate_conflicts() {
        let manager = manager();
        manager.insert_profile(OutputProfile::with_id("profile_x", "X")).await.unwrap();
        let result = manager.insert_profile(OutputProfile::with_id("profile_x", "Y")).await;
        assert!(matches!(result, Err(ProfileError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_profile() {
        let manager = manager();
        let profile = manager.create_profile("Main").await.unwrap();
        let id = {
            let mut p = profile.lock().await;
            p.add_destination(Service::Twitch, "k", Orientation::Horizontal, EncodingSettings::default())
                .unwrap();
            p.id.clone()
        };

        let copy = manager.duplicate_profile(&id, "Copy").await.unwrap();
        let copy = copy.lock().await;
        assert_eq!(copy.name, "Copy");
        assert_eq!(copy.destinations.len(), 1);
        assert_eq!(manager.summaries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_template_to_idle_profile() {
        let manager = manager();
        let profile = manager.create_profile("Main").await.unwrap();
        let id = {
            let mut p = profile.lock().await;
            p.add_destination(Service::Youtube, "k", Orientation::Horizontal, EncodingSettings::new(640, 360, 30, 800))
                .unwrap();
            p.id.clone()
        };

        let update = manager.apply_template(&id, 0, "1080p60").await.unwrap();
        assert_eq!(update, EncodingUpdate::Stored);
        let p = profile.lock().await;
        assert_eq!(p.destinations[0].encoding.width, 1920);
        assert_eq!(p.destinations[0].encoding.video_bitrate, 6000);

        drop(p);
        assert!(manager.apply_template(&id, 0, "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());

        let manager = manager();
        manager.create_profile("First").await.unwrap();
        manager.create_profile("Second").await.unwrap();
        manager.save(&store).await.unwrap();

        let restored = self::manager();
        assert_eq!(restored.load(&store).await.unwrap(), 2);
        let names: Vec<String> = restored.summaries().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["First", "Second"]);

        // Loading again adds nothing
        assert_eq!(restored.load(&store).await.unwrap(), 0);
    }
}

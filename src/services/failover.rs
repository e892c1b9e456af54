// Failover Controller
// Health evaluation and primary/backup switching for one profile's destinations

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{OutputProfile, ProfileError, MAX_TIMER_SECS};
use crate::services::profile_control::destination_output;
use crate::services::{
    emit_event, DestinationEvent, EventSink, RestreamerClient, RestreamerError,
    EVENT_DESTINATION_DEGRADED, EVENT_DESTINATION_DISABLED, EVENT_DESTINATION_RECONNECTED,
    EVENT_DESTINATION_RECONNECTING, EVENT_FAILOVER_FAILED, EVENT_FAILOVER_RESTORED,
    EVENT_FAILOVER_TRIGGERED,
};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Health classification of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationHealth {
    /// Checks pass or are disabled
    Active,
    /// Failing, but below the threshold
    Degraded,
    /// Traffic moved to the backup
    FailedOver,
}

/// Transitions reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverEvent {
    Degraded { index: usize, failures: u32 },
    FailedOver { primary: usize, backup: usize },
    /// The switch to the backup was attempted and did not go through
    FailoverFailed { primary: usize, reason: String },
    Restored { index: usize },
    /// Output dropped, to be re-added after the reconnect delay
    Reconnecting { index: usize, attempt: u32 },
    Reconnected { index: usize },
    /// Out of reconnect attempts; the destination was disabled
    ReconnectExhausted { index: usize },
}

fn effective_threshold(profile: &OutputProfile) -> u32 {
    if profile.failure_threshold == 0 {
        DEFAULT_FAILURE_THRESHOLD
    } else {
        profile.failure_threshold
    }
}

/// Drives failover for profiles; holds no per-profile state of its own
pub struct FailoverController {
    events: Arc<dyn EventSink>,
}

impl FailoverController {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    fn emit(&self, event: &str, profile: &OutputProfile, index: usize) {
        let dest = &profile.destinations[index];
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

    pub fn state_of(profile: &OutputProfile, index: usize) -> Result<DestinationHealth, ProfileError> {
        let dest = profile.destination(index)?;
        Ok(if dest.failover_active {
            DestinationHealth::FailedOver
        } else if dest.health_check_enabled && dest.consecutive_failures > 0 {
            DestinationHealth::Degraded
        } else {
            DestinationHealth::Active
        })
    }

    /// Poll the engine for every destination whose check is due, then recover
    /// the ones that crossed the threshold
    ///
    /// A destination is healthy when the process is running and still has its
    /// output. If the engine can't be read, every due destination counts as failed.
    /// Failing destinations with a backup fail over; those without one are
    /// reconnected when `auto_reconnect` is set.
    pub async fn check_health(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
    ) -> Vec<FailoverEvent> {
        if !profile.is_realized() {
            return Vec::new();
        }

        let now = Utc::now();
        let due: Vec<usize> = profile
            .destinations
            .iter()
            .enumerate()
            .filter(|(_, dest)| dest.health_check_due(now))
            .map(|(i, _)| i)
            .collect();

        let mut events = Vec::new();
        let mut reconnects = Vec::new();
        if !due.is_empty() {
            let process_id = profile.remote_process_id();
            let snapshot = async {
                let state = client.get_process_state(&process_id).await?;
                let outputs = client.get_process_outputs(&process_id).await?;
                Ok::<_, RestreamerError>((state.is_running, outputs))
            }
            .await;

            let (running, outputs) = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log::warn!("Health check for profile '{}' could not reach Restreamer: {e}", profile.name);
                    (false, Vec::new())
                }
            };

            let threshold = effective_threshold(profile);
            for index in due {
                let dest = &mut profile.destinations[index];
                let healthy = running && outputs.contains(&dest.output_id());
                dest.last_health_check = Some(now);
                dest.connected = healthy;

                if healthy {
                    if dest.consecutive_failures > 0 {
                        log::info!("Destination {index} of '{}' recovered", profile.name);
                    }
                    dest.consecutive_failures = 0;
                    dest.reconnect_attempts = 0;
                    continue;
                }

                dest.consecutive_failures = dest.consecutive_failures.saturating_add(1);
                let failures = dest.consecutive_failures;
                log::warn!(
                    "Destination {index} of '{}' failed health check ({failures}/{threshold})",
                    profile.name
                );
                if failures < threshold {
                    events.push(FailoverEvent::Degraded { index, failures });
                    self.emit(EVENT_DESTINATION_DEGRADED, profile, index);
                } else if dest.backup_index.is_none() && dest.auto_reconnect {
                    reconnects.push(index);
                }
            }
        }

        for index in reconnects {
            events.push(self.begin_reconnect(profile, client, index, now).await);
        }
        events.extend(self.check_failover(profile, client).await);
        events.extend(self.finish_reconnects(profile, client, now).await);
        events
    }

    /// Fail over every primary whose failures reached the threshold
    ///
    /// Safe to call repeatedly: destinations already failed over are skipped.
    /// A primary that can't be switched is reported and the rest still run.
    pub async fn check_failover(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
    ) -> Vec<FailoverEvent> {
        let threshold = effective_threshold(profile);
        let candidates: Vec<usize> = profile
            .destinations
            .iter()
            .enumerate()
            .filter(|(_, dest)| {
                dest.enabled
                    && dest.health_check_enabled
                    && !dest.failover_active
                    && dest.backup_index.is_some()
                    && dest.consecutive_failures >= threshold
            })
            .map(|(i, _)| i)
            .collect();

        let mut events = Vec::new();
        for index in candidates {
            match self.trigger_failover(profile, client, index).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    log::error!("Failover of destination {index} of '{}' failed: {e}", profile.name);
                    self.emit(EVENT_FAILOVER_FAILED, profile, index);
                    events.push(FailoverEvent::FailoverFailed {
                        primary: index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        events
    }

    /// Drop a failing output so it can be added back, or disable the
    /// destination once its reconnect attempts are used up
    async fn begin_reconnect(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
        index: usize,
        now: DateTime<Utc>,
    ) -> FailoverEvent {
        let process_id = profile.remote_process_id();
        let max_attempts = profile.max_reconnect_attempts;
        let delay = Duration::seconds(profile.reconnect_delay_secs.min(MAX_TIMER_SECS) as i64);
        let dest = &mut profile.destinations[index];
        let output_id = dest.output_id();

        let exhausted = max_attempts > 0 && dest.reconnect_attempts >= max_attempts;
        match client.remove_process_output(&process_id, &output_id).await {
            Ok(()) | Err(RestreamerError::NotFound(_)) => {}
            Err(e) => log::warn!("Failed to drop output {output_id} for reconnect: {e}"),
        }

        if exhausted {
            dest.enabled = false;
            dest.reset_health();
            log::error!(
                "Destination {index} of '{}' disabled after {max_attempts} reconnect attempts",
                profile.name
            );
            self.emit(EVENT_DESTINATION_DISABLED, profile, index);
            return FailoverEvent::ReconnectExhausted { index };
        }

        dest.reconnect_attempts += 1;
        dest.reconnect_at = Some(now + delay);
        dest.connected = false;
        let attempt = dest.reconnect_attempts;
        log::warn!(
            "Reconnecting destination {index} of '{}' (attempt {attempt})",
            profile.name
        );
        self.emit(EVENT_DESTINATION_RECONNECTING, profile, index);
        FailoverEvent::Reconnecting { index, attempt }
    }

    /// Add back every dropped output whose reconnect delay has passed
    async fn finish_reconnects(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
        now: DateTime<Utc>,
    ) -> Vec<FailoverEvent> {
        let ready: Vec<usize> = profile
            .destinations
            .iter()
            .enumerate()
            .filter(|(_, dest)| dest.reconnect_at.is_some_and(|at| now >= at))
            .map(|(i, _)| i)
            .collect();

        let process_id = profile.remote_process_id();
        let mut events = Vec::new();
        for index in ready {
            let dest = &profile.destinations[index];
            if !dest.is_streaming() {
                profile.destinations[index].reconnect_at = None;
                continue;
            }
            let output = destination_output(dest, profile.source_orientation);
            let result = client.add_process_output(&process_id, &output).await;

            let dest = &mut profile.destinations[index];
            dest.reconnect_at = None;
            match result {
                Ok(()) | Err(RestreamerError::Conflict(_)) => {
                    dest.consecutive_failures = 0;
                    dest.connected = true;
                    dest.last_health_check = Some(now);
                    log::info!("Destination {index} of '{}' reconnected", profile.name);
                    self.emit(EVENT_DESTINATION_RECONNECTED, profile, index);
                    events.push(FailoverEvent::Reconnected { index });
                }
                Err(e) => log::warn!("Reconnect of destination {index} of '{}' failed: {e}", profile.name),
            }
        }
        events
    }

    /// Move a primary's traffic to its backup
    ///
    /// The backup output is added before the primary's is removed, so a failed
    /// add leaves both the engine and the profile as they were.
    /// Returns `None` if the primary is already failed over.
    pub async fn trigger_failover(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
        index: usize,
    ) -> Result<Option<FailoverEvent>, ProfileError> {
        let primary = profile.destination(index)?;
        if primary.failover_active {
            return Ok(None);
        }
        let backup = primary.backup_index.ok_or_else(|| {
            ProfileError::InvalidState(format!("Destination {index} has no backup"))
        })?;
        let backup_dest = profile.destination(backup)?;
        if backup_dest.failover_active {
            return Err(ProfileError::InvalidState(format!(
                "Backup {backup} is itself failed over"
            )));
        }

        if profile.is_realized() {
            let process_id = profile.remote_process_id();
            if !backup_dest.is_streaming() {
                let output = destination_output(backup_dest, profile.source_orientation);
                match client.add_process_output(&process_id, &output).await {
                    Ok(()) | Err(RestreamerError::Conflict(_)) => {}
                    Err(e) => {
                        log::error!("Failover of destination {index} aborted, backup output failed: {e}");
                        return Err(e.into());
                    }
                }
            }
            let primary_output = profile.destinations[index].output_id();
            match client.remove_process_output(&process_id, &primary_output).await {
                Ok(()) | Err(RestreamerError::NotFound(_)) => {}
                Err(e) => log::warn!("Failed to remove failed output {primary_output}: {e}"),
            }
        }

        let now = Utc::now();
        let primary = &mut profile.destinations[index];
        primary.failover_active = true;
        primary.failover_started_at = Some(now);
        primary.connected = false;

        let backup_dest = &mut profile.destinations[backup];
        backup_dest.enabled = true;
        backup_dest.reset_health();

        log::warn!(
            "Failover: destination {index} of '{}' switched to backup {backup}",
            profile.name
        );
        self.emit(EVENT_FAILOVER_TRIGGERED, profile, index);
        Ok(Some(FailoverEvent::FailedOver { primary: index, backup }))
    }

    /// Put a failed-over primary back on air and retire its backup
    ///
    /// Returns `None` if the destination was not failed over.
    pub async fn restore_primary(
        &self,
        profile: &mut OutputProfile,
        client: &RestreamerClient,
        index: usize,
    ) -> Result<Option<FailoverEvent>, ProfileError> {
        let primary = profile.destination(index)?;
        if !primary.failover_active {
            return Ok(None);
        }
        let backup = primary
            .backup_index
            .filter(|&b| b < profile.destinations.len());

        if profile.is_realized() {
            let process_id = profile.remote_process_id();
            let output = destination_output(primary, profile.source_orientation);
            match client.add_process_output(&process_id, &output).await {
                Ok(()) | Err(RestreamerError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(backup) = backup {
                let backup_output = profile.destinations[backup].output_id();
                match client.remove_process_output(&process_id, &backup_output).await {
                    Ok(()) | Err(RestreamerError::NotFound(_)) => {}
                    Err(e) => log::warn!("Failed to remove backup output {backup_output}: {e}"),
                }
            }
        }

        let primary = &mut profile.destinations[index];
        primary.failover_active = false;
        primary.failover_started_at = None;
        primary.reset_health();
        if let Some(backup) = backup {
            profile.destinations[backup].enabled = false;
            profile.destinations[backup].reset_health();
        }

        log::info!("Destination {index} of '{}' restored from backup", profile.name);
        self.emit(EVENT_FAILOVER_RESTORED, profile, index);
        Ok(Some(FailoverEvent::Restored { index }))
    }
}

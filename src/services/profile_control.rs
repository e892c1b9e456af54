// Profile Control
// Realizes an output profile as a Restreamer process and keeps it in sync

use chrono::Utc;

use crate::models::{
    EncodingSettings, Orientation, OutputDestination, OutputProfile, PreviewWindow, ProcessOutput,
    ProfileError, ProfileStatus, Service, MAX_TIMER_SECS,
};
use crate::services::orientation_filter::{build_filter_sized, detect_orientation, FilterSpec};
use crate::services::{PlatformRegistry, RestreamerClient, RestreamerError};

/// Outcome of a live encoding change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingUpdate {
    /// The running output was re-encoded in place
    Applied,
    /// The engine can't update live; the change takes effect on next start
    Deferred,
    /// Nothing was running, only the stored settings changed
    Stored,
}

/// Encoder arguments for one output
fn encoder_options(encoding: &EncodingSettings, filter: &FilterSpec) -> Vec<String> {
    let gop = (encoding.fps().round() as u32).max(1).saturating_mul(2);
    let mut options = vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        encoding.preset.clone().unwrap_or_else(|| "veryfast".to_string()),
    ];
    if let Some(profile) = &encoding.profile {
        options.push("-profile:v".to_string());
        options.push(profile.clone());
    }
    options.extend([
        "-b:v".to_string(),
        format!("{}k", encoding.video_bitrate),
        "-maxrate".to_string(),
        format!("{}k", encoding.video_bitrate),
        "-bufsize".to_string(),
        format!("{}k", encoding.video_bitrate.saturating_mul(2)),
        "-r".to_string(),
        format!("{}/{}", encoding.fps_num, encoding.fps_den),
        "-g".to_string(),
        gop.to_string(),
    ]);
    // Orientation filters already scale; only size the output when there is none
    if filter.is_identity() {
        options.push("-s".to_string());
        options.push(encoding.resolution());
    }
    options.extend([
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", encoding.audio_bitrate),
        "-f".to_string(),
        "flv".to_string(),
    ]);
    options
}

/// Process output for a destination fed from a `source` oriented input
pub fn destination_output(dest: &OutputDestination, source: Orientation) -> ProcessOutput {
    let spec = build_filter_sized(source, dest.orientation, dest.encoding.width, dest.encoding.height);
    let address = PlatformRegistry::build_url_with_key(dest.service, &dest.url, &dest.stream_key);
    let mut output = ProcessOutput::new(dest.output_id(), address);
    output.options = encoder_options(&dest.encoding, &spec);
    output.video_filter = spec.filter;
    output
}

impl OutputProfile {
    /// Outputs for every destination that should be streaming
    pub fn build_outputs(&self) -> Vec<ProcessOutput> {
        self.streaming_destinations()
            .map(|(_, dest)| destination_output(dest, self.source_orientation))
            .collect()
    }

    /// Whether a remote process currently carries this profile's traffic
    pub fn is_realized(&self) -> bool {
        self.process_id.is_some() && self.is_active()
    }

    /// Make the remote output set match the destinations that should be streaming
    pub async fn sync_outputs(&self, client: &RestreamerClient) -> Result<(), ProfileError> {
        let process_id = self.remote_process_id();
        let remote = client.get_process_outputs(&process_id).await?;
        let desired = self.build_outputs();

        // Adds go first; if one fails the earlier adds are undone and nothing is removed
        let mut added: Vec<&str> = Vec::new();
        for output in desired.iter().filter(|o| !remote.contains(&o.id)) {
            match client.add_process_output(&process_id, output).await {
                Ok(()) => added.push(&output.id),
                Err(RestreamerError::Conflict(_)) => {}
                Err(e) => {
                    for output_id in added {
                        if let Err(undo) = client.remove_process_output(&process_id, output_id).await {
                            log::warn!("Failed to undo output {output_id} on {process_id}: {undo}");
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        for output_id in remote.iter() {
            if !desired.iter().any(|o| &o.id == output_id) {
                match client.remove_process_output(&process_id, output_id).await {
                    Ok(()) | Err(RestreamerError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Create the remote process, or bring an existing one up to date
    async fn ensure_process(&mut self, client: &RestreamerClient) -> Result<String, ProfileError> {
        let process_id = self.remote_process_id();

        match client.get_process(&process_id).await {
            Ok(_) => self.sync_outputs(client).await?,
            Err(RestreamerError::NotFound(_)) => {
                let outputs = self.build_outputs();
                match client
                    .create_process(&process_id, &self.input_url, &outputs, None)
                    .await
                {
                    Ok(()) => {}
                    // Someone created it between our lookup and create
                    Err(RestreamerError::Conflict(_)) => self.sync_outputs(client).await?,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.process_id = Some(process_id.clone());
        Ok(process_id)
    }

    /// Start streaming to every enabled destination
    pub async fn start(&mut self, client: &RestreamerClient) -> Result<(), ProfileError> {
        if self.streaming_destinations().next().is_none() {
            return Err(ProfileError::InvalidState(format!(
                "Profile '{}' has no enabled destinations",
                self.name
            )));
        }

        let result = async {
            let process_id = self.ensure_process(client).await?;
            client.start_process(&process_id).await?;
            Ok::<_, ProfileError>(process_id)
        }
        .await;

        match result {
            Ok(process_id) => {
                for dest in self.destinations.iter_mut() {
                    dest.reset_health();
                }
                self.status = ProfileStatus::Live;
                self.last_error = None;
                log::info!(
                    "Profile '{}' live on process {process_id} with {} outputs",
                    self.name,
                    self.streaming_destinations().count()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start profile '{}': {e}", self.name);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the remote process, keeping it so the id survives the next start
    pub async fn stop(&mut self, client: &RestreamerClient) -> Result<(), ProfileError> {
        if let Some(process_id) = self.process_id.clone() {
            match client.stop_process(&process_id).await {
                Ok(()) => {}
                Err(RestreamerError::NotFound(_)) => {
                    log::warn!("Process {process_id} vanished from Restreamer; treating as stopped");
                    self.process_id = None;
                }
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(e.into());
                }
            }
        }

        for dest in self.destinations.iter_mut() {
            dest.preview = None;
            dest.connected = false;
        }
        self.status = ProfileStatus::Stopped;
        log::info!("Profile '{}' stopped", self.name);
        Ok(())
    }

    pub async fn restart(&mut self, client: &RestreamerClient) -> Result<(), ProfileError> {
        if !self.is_realized() {
            return self.start(client).await;
        }
        self.sync_outputs(client).await?;
        client.restart_process(&self.remote_process_id()).await?;
        for dest in self.destinations.iter_mut() {
            dest.reset_health();
        }
        Ok(())
    }

    /// Stop and delete the remote process
    pub async fn delete_remote(&mut self, client: &RestreamerClient) -> Result<(), ProfileError> {
        let Some(process_id) = self.process_id.clone() else {
            self.status = ProfileStatus::Stopped;
            return Ok(());
        };

        for result in [
            client.stop_process(&process_id).await,
            client.delete_process(&process_id).await,
        ] {
            match result {
                Ok(()) | Err(RestreamerError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.process_id = None;
        self.status = ProfileStatus::Stopped;
        Ok(())
    }

    /// Run a local mutation and push it to the engine
    ///
    /// If the push fails the local change is undone and the engine is synced
    /// back to the previous destinations.
    async fn apply_live<T>(
        &mut self,
        client: &RestreamerClient,
        mutate: impl FnOnce(&mut Self) -> Result<T, ProfileError>,
    ) -> Result<T, ProfileError> {
        let snapshot = self.destinations.clone();
        let value = mutate(self)?;
        if self.is_realized() {
            if let Err(e) = self.sync_outputs(client).await {
                self.destinations = snapshot;
                if let Err(resync) = self.sync_outputs(client).await {
                    log::warn!(
                        "Outputs of profile '{}' may not match Restreamer after a failed change: {resync}",
                        self.name
                    );
                }
                return Err(e);
            }
        }
        Ok(value)
    }

    // ========================================================================
    // Live destination changes
    // ========================================================================

    pub async fn add_destination_live(
        &mut self,
        client: &RestreamerClient,
        service: Service,
        stream_key: &str,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Result<usize, ProfileError> {
        self.apply_live(client, |profile| {
            profile.add_destination(service, stream_key, orientation, encoding)
        })
        .await
    }

    pub async fn remove_destination_live(
        &mut self,
        client: &RestreamerClient,
        index: usize,
    ) -> Result<OutputDestination, ProfileError> {
        self.apply_live(client, |profile| profile.remove_destination(index))
            .await
    }

    pub async fn set_destination_enabled_live(
        &mut self,
        client: &RestreamerClient,
        index: usize,
        enabled: bool,
    ) -> Result<(), ProfileError> {
        self.apply_live(client, |profile| profile.set_destination_enabled(index, enabled))
            .await
    }

    pub async fn set_destination_backup_live(
        &mut self,
        client: &RestreamerClient,
        primary: usize,
        backup: usize,
    ) -> Result<(), ProfileError> {
        self.apply_live(client, |profile| profile.set_destination_backup(primary, backup))
            .await
    }

    pub async fn bulk_enable_destinations_live(
        &mut self,
        client: &RestreamerClient,
        indices: &[usize],
        enabled: bool,
    ) -> Result<(), ProfileError> {
        self.apply_live(client, |profile| profile.bulk_enable_destinations(indices, enabled))
            .await
    }

    pub async fn bulk_delete_destinations_live(
        &mut self,
        client: &RestreamerClient,
        indices: &[usize],
    ) -> Result<Vec<OutputDestination>, ProfileError> {
        self.apply_live(client, |profile| profile.bulk_delete_destinations(indices))
            .await
    }

    /// Change a destination's encoding, pushing it to the running output when possible
    ///
    /// An engine that can't re-encode live is not an error: the new settings are
    /// kept and used on the next start.
    pub async fn update_destination_encoding_live(
        &mut self,
        client: &RestreamerClient,
        index: usize,
        encoding: EncodingSettings,
    ) -> Result<EncodingUpdate, ProfileError> {
        let previous = self.destination(index)?.encoding.clone();
        self.update_destination_encoding(index, encoding)?;

        let dest = &self.destinations[index];
        if !self.is_realized() || !dest.is_streaming() {
            return Ok(EncodingUpdate::Stored);
        }

        let params = dest.encoding.to_params();
        let output_id = dest.output_id();
        match client
            .update_output_encoding(&self.remote_process_id(), &output_id, &params)
            .await
        {
            Ok(()) => Ok(EncodingUpdate::Applied),
            Err(e) if e.is_soft() => {
                log::warn!("Encoding for {output_id} will apply on next start: {e}");
                Ok(EncodingUpdate::Deferred)
            }
            Err(e) => {
                self.destinations[index].encoding = previous;
                Err(e.into())
            }
        }
    }

    /// Apply one encoding to several destinations; returns how each update landed
    pub async fn bulk_update_encoding_live(
        &mut self,
        client: &RestreamerClient,
        indices: &[usize],
        encoding: &EncodingSettings,
    ) -> Result<Vec<EncodingUpdate>, ProfileError> {
        self.bulk_update_encoding(indices, encoding)?;

        let mut results = Vec::with_capacity(indices.len());
        for &index in indices {
            let dest = &self.destinations[index];
            if !self.is_realized() || !dest.is_streaming() {
                results.push(EncodingUpdate::Stored);
                continue;
            }
            let output_id = dest.output_id();
            match client
                .update_output_encoding(&self.remote_process_id(), &output_id, &encoding.to_params())
                .await
            {
                Ok(()) => results.push(EncodingUpdate::Applied),
                Err(e) if e.is_soft() => results.push(EncodingUpdate::Deferred),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(results)
    }

    /// Probe the input and record its orientation
    pub async fn refresh_source_orientation(
        &mut self,
        client: &RestreamerClient,
    ) -> Result<Orientation, ProfileError> {
        let Some(process_id) = self.process_id.clone() else {
            return Err(ProfileError::InvalidState(
                "Profile has no remote process to probe".to_string(),
            ));
        };
        let probe = client.probe_input(&process_id).await?;
        let video = probe.video_stream().ok_or_else(|| {
            ProfileError::NotFound(format!("No video stream in input of {process_id}"))
        })?;

        let orientation = detect_orientation(video.width, video.height);
        if orientation != self.source_orientation {
            log::info!(
                "Profile '{}' source orientation {:?} -> {:?}",
                self.name,
                self.source_orientation,
                orientation
            );
            self.source_orientation = orientation;
        }
        Ok(orientation)
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Stream one destination in preview mode, lapsing after `timeout_secs`
    ///
    /// Starts the profile if it isn't running. A profile that is already live
    /// stays live.
    pub async fn start_preview(
        &mut self,
        client: &RestreamerClient,
        index: usize,
        timeout_secs: u64,
    ) -> Result<(), ProfileError> {
        if timeout_secs > MAX_TIMER_SECS {
            return Err(ProfileError::InvalidState(format!(
                "Preview timeout {timeout_secs}s exceeds {MAX_TIMER_SECS}s"
            )));
        }
        self.check_preview_target(index)?;

        let dest = &self.destinations[index];
        let was_enabled = dest.enabled;
        let enabled_by_preview = !was_enabled || dest.preview.as_ref().is_some_and(|p| p.enabled_by_preview);

        if self.is_realized() {
            if !was_enabled {
                self.set_destination_enabled_live(client, index, true).await?;
            }
        } else {
            self.destinations[index].enabled = true;
            if let Err(e) = self.start(client).await {
                self.destinations[index].enabled = was_enabled;
                return Err(e);
            }
            self.status = ProfileStatus::Preview;
        }

        self.destinations[index].preview = Some(PreviewWindow::new(timeout_secs, enabled_by_preview));
        log::info!(
            "Preview started on destination {index} of '{}' ({timeout_secs}s)",
            self.name
        );
        Ok(())
    }

    fn check_preview_target(&self, index: usize) -> Result<(), ProfileError> {
        let dest = self.destination(index)?;
        if dest.failover_active {
            return Err(ProfileError::InvalidState(format!(
                "Destination {index} is failed over"
            )));
        }
        Ok(())
    }

    /// Promote a previewing destination to live; already-live destinations are left alone
    pub fn preview_to_live(&mut self, index: usize) -> Result<(), ProfileError> {
        let dest = self.destination_mut(index)?;
        if dest.preview.take().is_none() {
            return Ok(());
        }

        let still_previewing = self.destinations.iter().any(|d| d.preview.is_some());
        if self.status == ProfileStatus::Preview && !still_previewing {
            self.status = ProfileStatus::Live;
            log::info!("Profile '{}' promoted from preview to live", self.name);
        }
        Ok(())
    }

    /// Abandon a preview. A destination the preview switched on goes back off;
    /// one that was already enabled keeps streaming. A profile that was only
    /// previewing stops entirely.
    pub async fn cancel_preview(&mut self, client: &RestreamerClient, index: usize) -> Result<(), ProfileError> {
        let Some(window) = self.destination(index)?.preview.clone() else {
            return Ok(());
        };

        let others = self
            .destinations
            .iter()
            .enumerate()
            .any(|(i, d)| i != index && d.preview.is_some());

        if self.status == ProfileStatus::Preview && !others {
            self.stop(client).await?;
            if window.enabled_by_preview {
                self.destinations[index].enabled = false;
            }
            return Ok(());
        }
        if window.enabled_by_preview {
            self.set_destination_enabled_live(client, index, false).await?;
        }
        self.destinations[index].preview = None;
        Ok(())
    }

    /// Cancel every preview whose window has lapsed; returns their indices
    pub async fn check_preview_timeouts(&mut self, client: &RestreamerClient) -> Result<Vec<usize>, ProfileError> {
        let now = Utc::now();
        let expired: Vec<usize> = self
            .destinations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.preview.as_ref().is_some_and(|p| p.is_expired(now)))
            .map(|(i, _)| i)
            .collect();

        for &index in expired.iter() {
            log::info!("Preview on destination {index} of '{}' timed out", self.name);
            self.cancel_preview(client, index).await?;
        }
        Ok(expired)
    }
}

// Health Monitor Service
// Background task that drives health checks and preview timeouts

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::services::ProfileManager;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Periodically runs `ProfileManager::run_health_checks`
pub struct HealthMonitor {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the polling loop; no-op if already running
    pub fn start(&self, manager: Arc<ProfileManager>) {
        if self.running.swap(true, Ordering::Relaxed) {
            log::debug!("HealthMonitor already running");
            return;
        }

        let running = self.running.clone();
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            log::info!("HealthMonitor started ({}ms interval)", poll_interval.as_millis());

            let mut ticker = interval(poll_interval);

            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                manager.run_health_checks().await;
            }

            log::info!("HealthMonitor stopped");
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    /// Stop the loop and wait for any in-flight pass to finish
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("HealthMonitor task ended abnormally: {e}");
            }
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

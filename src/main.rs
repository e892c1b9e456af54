// Multistream Control
// Loads profiles, keeps them on air against a Restreamer engine and watches their health

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use tokio::signal;

use multistream_control::models::Settings;
use multistream_control::services::{
    init_logger, prune_logs, HealthMonitor, LogEventSink, ProfileManager, ProfileStore,
    RestreamerClient, SettingsManager, TemplateCatalog,
};

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Environment variables take precedence over settings.json
fn apply_env_overrides(settings: &mut Settings) {
    let connection = &mut settings.connection;
    if let Some(host) = non_empty_env("MULTISTREAM_HOST") {
        connection.host = host;
    }
    if let Some(port) = non_empty_env("MULTISTREAM_PORT").and_then(|value| value.parse().ok()) {
        connection.port = port;
    }
    if let Some(username) = non_empty_env("MULTISTREAM_USERNAME") {
        connection.username = Some(username);
    }
    if let Ok(password) = env::var("MULTISTREAM_PASSWORD") {
        connection.password = Some(password);
    }
    if let Some(tls) = env::var("MULTISTREAM_TLS").ok().and_then(|value| parse_bool(&value)) {
        connection.use_tls = tls;
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, stopping profiles...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = PathBuf::from(non_empty_env("MULTISTREAM_DATA_DIR").unwrap_or_else(|| "data".to_string()));
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&data_dir)?;

    let settings_manager = SettingsManager::new(&data_dir);
    let mut settings = settings_manager.load()?;
    apply_env_overrides(&mut settings);

    init_logger(&log_dir, settings.level_filter())?;
    log::info!("Data directory: {}", data_dir.display());

    match prune_logs(&log_dir, settings.log_retention_days) {
        Ok(0) => {}
        Ok(removed) => log::info!("Pruned {removed} old log file(s)"),
        Err(e) => log::warn!("Log cleanup failed: {e}"),
    }

    let client = RestreamerClient::connect_with_timeout(
        settings.connection.clone(),
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    if client.test_connection().await {
        log::info!("Connected to Restreamer at {}", client.base_url());
    } else {
        log::warn!(
            "Restreamer at {} is not reachable; auto-start profiles that fail now are not retried",
            client.base_url()
        );
    }

    let templates = TemplateCatalog::new(&settings.custom_templates);
    log::info!("{} encoding templates available", templates.len());

    let manager = Arc::new(
        ProfileManager::new(Arc::new(client), templates, Arc::new(LogEventSink))
            .with_health_policy(settings.failure_threshold, settings.health_check_interval_secs),
    );

    let store = ProfileStore::new(&data_dir);
    manager.load(&store).await?;

    for (id, e) in manager.start_all().await {
        log::error!("Profile {id} failed to start: {e}");
    }

    let monitor = HealthMonitor::new(Duration::from_millis(settings.poll_interval_ms));
    monitor.start(Arc::clone(&manager));

    shutdown_signal().await;

    monitor.stop().await;
    for (id, e) in manager.stop_all().await {
        log::warn!("Profile {id} did not stop cleanly: {e}");
    }
    if let Err(e) = manager.save(&store).await {
        log::error!("Failed to save profiles: {e}");
    }

    log::info!("Multistream control shut down");
    Ok(())
}

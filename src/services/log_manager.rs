// LogManager Service
// Process-wide logger, log retention cleanup and reading

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

pub const LOG_FILE_NAME: &str = "multistream-control.log";

/// Writes `[date][time][target][level] message` lines to stderr and a log file
pub struct ControlLogger {
    file: Option<Mutex<File>>,
    level: LevelFilter,
}

impl ControlLogger {
    pub fn new(log_dir: &Path, level: LevelFilter) -> Result<Self, String> {
        fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {e}"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(LOG_FILE_NAME))
            .map_err(|e| format!("Failed to open log file: {e}"))?;
        Ok(Self {
            file: Some(Mutex::new(file)),
            level,
        })
    }

    /// Logger that only writes to stderr
    pub fn stderr(level: LevelFilter) -> Self {
        Self { file: None, level }
    }

    fn format(record: &Record) -> String {
        let timestamp = Local::now();
        let date = timestamp.format("%Y-%m-%d");
        let time = timestamp.format("%H:%M:%S");
        format!(
            "[{date}][{time}][{}][{}] {}",
            record.target(),
            record.level(),
            record.args()
        )
    }
}

impl Log for ControlLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::format(record);
        eprintln!("{line}");

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install `ControlLogger` as the global logger
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> Result<(), String> {
    let logger = ControlLogger::new(log_dir, level)?;
    log::set_boxed_logger(Box::new(logger)).map_err(|e| format!("Failed to set logger: {e}"))?;
    log::set_max_level(level);
    Ok(())
}

/// Delete `.log` files older than `retention_days`; returns how many were removed
pub fn prune_logs(log_dir: &Path, retention_days: u32) -> Result<usize, String> {
    if retention_days == 0 || !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days as u64 * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = fs::read_dir(log_dir).map_err(|e| format!("Failed to read log dir: {e}"))?;
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Last `max_lines` non-empty lines of the newest log file
pub fn read_recent_logs(log_dir: &Path, max_lines: usize) -> Result<Vec<String>, String> {
    let Some(log_file) = find_latest_log_file(log_dir) else {
        return Ok(Vec::new());
    };

    let bytes = fs::read(&log_file).map_err(|e| format!("Failed to read log file: {e}"))?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].to_vec())
}

fn find_latest_log_file(log_dir: &Path) -> Option<PathBuf> {
    fs::read_dir(log_dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("log"))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_recent_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), "one\n\ntwo\nthree\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let lines = read_recent_logs(dir.path(), 2).unwrap();
        assert_eq!(lines, vec!["two", "three"]);
    }

    #[test]
    fn test_read_recent_logs_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_recent_logs(dir.path(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_prune_keeps_fresh_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE_NAME), "fresh").unwrap();

        assert_eq!(prune_logs(dir.path(), 30).unwrap(), 0);
        assert_eq!(prune_logs(dir.path(), 0).unwrap(), 0);
        assert!(dir.path().join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn test_logger_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ControlLogger::new(dir.path(), LevelFilter::Info).unwrap();

        logger.log(
            &Record::builder()
                .args(format_args!("profile started"))
                .level(log::Level::Info)
                .target("multistream_control")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("noisy"))
                .level(log::Level::Debug)
                .target("multistream_control")
                .build(),
        );
        logger.flush();

        let lines = read_recent_logs(dir.path(), 10).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("[multistream_control][INFO] profile started"));
    }
}

// ProfileStore Service
// Persists output profiles as JSON files, one per profile

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::OutputProfile;

const ORDER_FILE: &str = "order.json";

/// Validate profile id to prevent path traversal attacks
fn validate_profile_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("Profile id cannot be empty".to_string());
    }
    if id.contains('/') || id.contains('\\') {
        return Err("Profile id cannot contain path separators".to_string());
    }
    if id.contains("..") {
        return Err("Profile id cannot contain '..'".to_string());
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err("Profile id can only contain letters, numbers, underscores, and hyphens".to_string());
    }
    if id.len() > 100 {
        return Err("Profile id too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Write through a temp file so a crash never leaves a half-written file
fn write_atomic(path: &Path, content: &str) -> Result<(), String> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .map_err(|e| format!("Failed to write {}: {e}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| format!("Failed to replace {}: {e}", path.display()))
}

/// Manages profile storage and retrieval
pub struct ProfileStore {
    profiles_dir: PathBuf,
}

impl ProfileStore {
    /// Create a store rooted at `<app_data_dir>/profiles`
    pub fn new(app_data_dir: &Path) -> Self {
        Self {
            profiles_dir: app_data_dir.join("profiles"),
        }
    }

    pub fn profiles_dir(&self) -> &Path {
        &self.profiles_dir
    }

    fn ensure_dir(&self) -> Result<(), String> {
        std::fs::create_dir_all(&self.profiles_dir)
            .map_err(|e| format!("Failed to create profiles directory: {e}"))
    }

    fn profile_path(&self, id: &str) -> PathBuf {
        self.profiles_dir.join(format!("{id}.json"))
    }

    pub fn save(&self, profile: &OutputProfile) -> Result<(), String> {
        validate_profile_id(&profile.id)?;
        self.ensure_dir()?;

        let content = serde_json::to_string_pretty(profile)
            .map_err(|e| format!("Failed to serialize profile: {e}"))?;
        write_atomic(&self.profile_path(&profile.id), &content)?;

        log::debug!("Saved profile {} ({})", profile.name, profile.id);
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<OutputProfile, String> {
        validate_profile_id(id)?;

        let path = self.profile_path(id);
        if !path.exists() {
            return Err(format!("Profile '{id}' not found"));
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read profile: {e}"))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse profile: {e}"))
    }

    pub fn delete(&self, id: &str) -> Result<(), String> {
        validate_profile_id(id)?;

        let path = self.profile_path(id);
        if !path.exists() {
            log::warn!("Profile not found for deletion: {id}");
            return Err(format!("Profile '{id}' not found"));
        }
        std::fs::remove_file(&path).map_err(|e| format!("Failed to delete profile: {e}"))?;
        log::info!("Profile deleted: {id}");
        Ok(())
    }

    /// Ids of every stored profile, unordered
    pub fn list_ids(&self) -> Result<Vec<String>, String> {
        if !self.profiles_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.profiles_dir).map_err(|e| e.to_string())?;
        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem != "order" && validate_profile_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn read_order(&self) -> Result<Vec<String>, String> {
        let path = self.profiles_dir.join(ORDER_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {ORDER_FILE}: {e}"))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse {ORDER_FILE}: {e}"))
    }

    /// Record the display order of profiles
    pub fn write_order(&self, ids: &[String]) -> Result<(), String> {
        self.ensure_dir()?;
        let content = serde_json::to_string_pretty(ids)
            .map_err(|e| format!("Failed to serialize profile order: {e}"))?;
        write_atomic(&self.profiles_dir.join(ORDER_FILE), &content)
    }

    /// Load every profile; ordered as last written, then by creation time
    ///
    /// Unreadable files are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<OutputProfile>, String> {
        let order: HashMap<String, usize> = self
            .read_order()
            .unwrap_or_else(|e| {
                log::warn!("Ignoring profile order: {e}");
                Vec::new()
            })
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let mut profiles = Vec::new();
        for id in self.list_ids()? {
            match self.load(&id) {
                Ok(profile) => profiles.push(profile),
                Err(e) => log::warn!("Skipping profile {id}: {e}"),
            }
        }

        profiles.sort_by(|a, b| {
            let rank = |p: &OutputProfile| order.get(&p.id).copied().unwrap_or(usize::MAX);
            rank(a).cmp(&rank(b)).then(a.created_at.cmp(&b.created_at))
        });
        Ok(profiles)
    }
}

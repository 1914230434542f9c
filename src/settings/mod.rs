//! Device settings and identity resolution.
//!
//! Effective settings come from a layered precedence applied independently
//! per field: explicit stored value, else environment default, else the
//! hard-coded fallback. Device identity is generated lazily on first
//! absence and never regenerated once present.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::records::Alliance;

/// Hard-coded fallbacks, used only when both the stored value and the
/// environment are empty.
pub const FALLBACK_EVENT_KEY: &str = "2025gaalb";
pub const FALLBACK_SYNC_URL: &str = "https://scouting.example.org/api";
pub const FALLBACK_API_KEY: &str = "change-me-api-key";

/// Environment variable names consulted for deployment defaults.
pub const ENV_SYNC_URL: &str = "FIELDSCOUT_SYNC_URL";
pub const ENV_API_KEY: &str = "FIELDSCOUT_API_KEY";
pub const ENV_EVENT_KEY: &str = "FIELDSCOUT_EVENT_KEY";

/// Effective, fully-resolved device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub scout_name: String,
    pub alliance: Alliance,
    /// Station position within the alliance, 1-3.
    pub station: u8,
    pub match_number: u32,
    pub event_key: String,
    /// Normalized to an `/api` base; never carries an endpoint filename.
    pub sync_url: String,
    pub api_key: String,
    pub device_id: String,
}

/// Partially-populated stored settings, as persisted per device. Blank
/// strings count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub scout_name: Option<String>,
    #[serde(default)]
    pub alliance: Option<Alliance>,
    #[serde(default)]
    pub station: Option<u8>,
    #[serde(default)]
    pub match_number: Option<u32>,
    #[serde(default)]
    pub event_key: Option<String>,
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Environment-provided defaults, read once per resolution.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub sync_url: Option<String>,
    pub api_key: Option<String>,
    pub event_key: Option<String>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self {
            sync_url: std::env::var(ENV_SYNC_URL).ok(),
            api_key: std::env::var(ENV_API_KEY).ok(),
            event_key: std::env::var(ENV_EVENT_KEY).ok(),
        }
    }
}

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

fn is_blank(v: &Option<String>) -> bool {
    match v {
        Some(s) => s.trim().is_empty(),
        None => true,
    }
}

fn pick(current: &Option<String>, env: &Option<String>, fallback: &str) -> String {
    if !is_blank(current) {
        return current.clone().unwrap_or_default();
    }
    if !is_blank(env) {
        return env.clone().unwrap_or_default();
    }
    fallback.to_string()
}

/// Normalize any accepted endpoint spelling (site root, `/api` base, or a
/// full endpoint-file URL) to the canonical `/api` base, so downstream
/// calls can safely append a fixed sub-path.
pub fn to_api_base(url: &str) -> String {
    let clean = url.trim().trim_end_matches('/');
    if clean.is_empty() {
        return "/api".to_string();
    }
    let lower = clean.to_lowercase();
    if lower.ends_with("/sync.php") {
        return clean[..clean.len() - "/sync.php".len()].to_string();
    }
    if lower.ends_with("/api") {
        return clean.to_string();
    }
    format!("{clean}/api")
}

/// Keep an existing device id; otherwise generate `dev_<16 hex>` once for
/// the life of the installation.
pub fn ensure_device_id(existing: &Option<String>) -> String {
    if !is_blank(existing) {
        return existing.clone().unwrap_or_default();
    }
    let id = Uuid::new_v4();
    let hex = &id.simple().to_string()[..16];
    format!("dev_{hex}")
}

/// Resolve effective settings: stored value, else environment default, else
/// hard-coded fallback, independently per field. The sync url is always
/// normalized to the `/api` base form.
pub fn resolve(stored: &StoredSettings, env: &EnvDefaults) -> Settings {
    Settings {
        scout_name: stored.scout_name.clone().unwrap_or_default(),
        alliance: stored.alliance.unwrap_or(Alliance::Red),
        station: stored.station.filter(|s| (1..=3).contains(s)).unwrap_or(1),
        match_number: stored.match_number.filter(|n| *n >= 1).unwrap_or(1),
        event_key: pick(&stored.event_key, &env.event_key, FALLBACK_EVENT_KEY),
        sync_url: to_api_base(&pick(&stored.sync_url, &env.sync_url, FALLBACK_SYNC_URL)),
        api_key: pick(&stored.api_key, &env.api_key, FALLBACK_API_KEY),
        device_id: ensure_device_id(&stored.device_id),
    }
}

/// Get the application data directory.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "fieldscout", "FieldScout")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the settings file path.
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.toml")
}

/// Load stored settings from disk; absent file yields empty settings.
pub fn load_stored() -> Result<StoredSettings, SettingsError> {
    load_stored_from(&settings_path())
}

/// Load stored settings from an explicit path.
pub fn load_stored_from(path: &PathBuf) -> Result<StoredSettings, SettingsError> {
    if !path.exists() {
        return Ok(StoredSettings::default());
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| SettingsError::IoError(e.to_string()))?;
    toml::from_str(&content).map_err(|e| SettingsError::ParseError(e.to_string()))
}

/// Persist resolved settings (called after every resolution so the lazily
/// generated device id survives restarts).
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_to(settings, &settings_path())
}

/// Persist resolved settings to an explicit path.
pub fn save_to(settings: &Settings, path: &PathBuf) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SettingsError::IoError(e.to_string()))?;
    }
    let content =
        toml::to_string_pretty(settings).map_err(|e| SettingsError::SerializeError(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| SettingsError::IoError(e.to_string()))?;
    Ok(())
}

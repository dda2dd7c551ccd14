//! Settings Persistence System
//!
//! Provides persistent client settings with:
//! - Atomic file writes (temp file + rename)
//! - Tolerant normalization instead of rejection
//! - An environment override for the backend address
//!
//! Storage location: {config_dir}/velp/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::backend::ApiBase;
use crate::core::subtitles::DisplayMode;
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Environment variable overriding `api.baseUrl`
pub const API_BASE_ENV: &str = "VELP_API_BASE";

/// Default backend address for a local deployment
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;
pub const MIN_FONT_SIZE: u32 = 12;
pub const MAX_FONT_SIZE: u32 = 72;

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Backend connection
    #[serde(default)]
    pub api: ApiSettings,

    /// Task polling cadence
    #[serde(default)]
    pub polling: PollingSettings,

    /// Viewer defaults
    #[serde(default)]
    pub viewer: ViewerSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            api: ApiSettings::default(),
            polling: PollingSettings::default(),
            viewer: ViewerSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Normalize settings values into supported ranges.
    ///
    /// Corrects bad values instead of failing, so a hand-edited or old file
    /// still loads.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        match ApiBase::parse(&self.api.base_url) {
            Ok(base) => self.api.base_url = base.to_string(),
            Err(e) => {
                warn!("Invalid api.baseUrl '{}': {}", self.api.base_url, e);
                self.api.base_url = default_base_url();
            }
        }
        self.api.request_timeout_secs = self.api.request_timeout_secs.clamp(1, 600);

        self.polling.poll_interval_ms = self.polling.poll_interval_ms.clamp(100, 60_000);
        self.polling.refresh_interval_ms = self.polling.refresh_interval_ms.clamp(500, 600_000);

        self.viewer.playback_rate = clamp_rate(self.viewer.playback_rate);
        self.viewer.font_size = clamp_font_size(self.viewer.font_size);
        self.viewer.loop_tolerance_ms = self.viewer.loop_tolerance_ms.clamp(0, 1_000);
        self.viewer.tick_interval_ms = self.viewer.tick_interval_ms.clamp(10, 1_000);
    }

    /// Applies environment overrides on top of loaded values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(API_BASE_ENV) {
            self.apply_api_base_override(&value);
        }
    }

    fn apply_api_base_override(&mut self, value: &str) {
        if value.trim().is_empty() {
            return;
        }
        match ApiBase::parse(value) {
            Ok(base) => {
                info!("Using {} from {}", base, API_BASE_ENV);
                self.api.base_url = base.to_string();
            }
            Err(e) => warn!("Ignoring {}='{}': {}", API_BASE_ENV, value, e),
        }
    }

    /// Parsed backend address
    pub fn api_base(&self) -> CoreResult<ApiBase> {
        ApiBase::parse(&self.api.base_url)
    }
}

/// Clamps a playback rate into the supported range
pub fn clamp_rate(rate: f64) -> f64 {
    if !rate.is_finite() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Clamps an overlay font size into the supported range
pub fn clamp_font_size(size: u32) -> u32 {
    size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

// =============================================================================
// Sections
// =============================================================================

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    /// API root, e.g. `http://localhost:8080/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request transport timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Task polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollingSettings {
    /// Delay between status polls of one task
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delay between background task list refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            refresh_interval_ms: default_refresh_interval(),
        }
    }
}

impl PollingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_refresh_interval() -> u64 {
    10_000
}

/// Viewer defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSettings {
    #[serde(default)]
    pub display_mode: DisplayMode,

    #[serde(default = "default_playback_rate")]
    pub playback_rate: f64,

    /// Overlay font size in px
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// How close to an entry's end loop mode seeks back
    #[serde(default = "default_loop_tolerance")]
    pub loop_tolerance_ms: u64,

    /// Clock sampling period for the headless viewer
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::default(),
            playback_rate: default_playback_rate(),
            font_size: default_font_size(),
            loop_tolerance_ms: default_loop_tolerance(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl ViewerSettings {
    pub fn loop_tolerance_secs(&self) -> f64 {
        self.loop_tolerance_ms as f64 / 1_000.0
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_playback_rate() -> f64 {
    1.0
}

fn default_font_size() -> u32 {
    24
}

fn default_loop_tolerance() -> u64 {
    100
}

fn default_tick_interval() -> u64 {
    50
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager rooted at the given directory
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            settings_path: config_dir.join(SETTINGS_FILE),
        }
    }

    /// Platform configuration directory for the client
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("velp")
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        // Parent must exist so the lock file can be created.
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::SettingsError(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| {
                CoreError::SettingsError(format!("Failed to open settings lock file: {}", e))
            })?;

        let locked = if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
        } else {
            fs2::FileExt::lock_shared(&lock_file)
        };
        locked.map_err(|e| {
            CoreError::SettingsError(format!("Failed to lock settings file: {}", e))
        })?;

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if missing or unreadable
    pub fn load(&self) -> ClientSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(ClientSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<ClientSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                ClientSettings::default()
            }
        }
    }

    /// Loads settings and applies environment overrides
    pub fn load_effective(&self) -> ClientSettings {
        let mut settings = self.load();
        settings.apply_env_overrides();
        settings
    }

    /// Save settings to disk using atomic write (temp file + rename)
    pub fn save(&self, settings: &ClientSettings) -> CoreResult<ClientSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            if cfg!(windows) && self.settings_path.exists() {
                // rename does not overwrite on Windows
                fs::remove_file(&self.settings_path)?;
            }
            fs::rename(&temp_path, &self.settings_path).map_err(|e| {
                CoreError::SettingsError(format!("Failed to finalize settings file: {}", e))
            })?;

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<ClientSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(ClientSettings::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::default();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.api.base_url, DEFAULT_API_BASE);
        assert_eq!(settings.polling.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.polling.refresh_interval(), Duration::from_secs(10));
        assert_eq!(settings.viewer.font_size, 24);
        assert!((settings.viewer.loop_tolerance_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = ClientSettings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["polling"]["pollIntervalMs"], 2000);
        assert_eq!(json["viewer"]["displayMode"], "both");

        let deserialized: ClientSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings, deserialized);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        assert_eq!(manager.load(), ClientSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        let mut settings = ClientSettings::default();
        settings.api.base_url = "https://velp.example.com/api/".to_string();
        settings.viewer.display_mode = DisplayMode::SecondaryOnly;

        let saved = manager.save(&settings).unwrap();
        assert_eq!(saved.api.base_url, "https://velp.example.com/api");

        let loaded = manager.load();
        assert_eq!(loaded.api.base_url, "https://velp.example.com/api");
        assert_eq!(loaded.viewer.display_mode, DisplayMode::SecondaryOnly);

        // Temp file should not survive a successful write
        assert!(!manager.settings_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_reset_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        manager.save(&ClientSettings::default()).unwrap();
        assert!(manager.settings_path().exists());

        let reset = manager.reset().unwrap();
        assert!(!manager.settings_path().exists());
        assert_eq!(reset, ClientSettings::default());
    }

    #[test]
    fn test_invalid_json_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "invalid json {{{").unwrap();

        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        assert_eq!(manager.load(), ClientSettings::default());
    }

    #[test]
    fn test_partial_json_uses_defaults_for_missing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{"version": 1, "polling": {"pollIntervalMs": 500}, "unknown": true}"#,
        )
        .unwrap();

        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        let settings = manager.load();

        assert_eq!(settings.polling.poll_interval_ms, 500);
        assert_eq!(settings.polling.refresh_interval_ms, 10_000);
        assert_eq!(settings.api, ApiSettings::default());
    }

    #[test]
    fn test_normalization_clamps_values() {
        let mut settings = ClientSettings::default();
        settings.api.base_url = "ftp://nope".to_string();
        settings.api.request_timeout_secs = 0;
        settings.polling.poll_interval_ms = 1;
        settings.viewer.playback_rate = 16.0;
        settings.viewer.font_size = 4;
        settings.viewer.loop_tolerance_ms = 9_999;

        settings.normalize();

        assert_eq!(settings.api.base_url, DEFAULT_API_BASE);
        assert_eq!(settings.api.request_timeout_secs, 1);
        assert_eq!(settings.polling.poll_interval_ms, 100);
        assert_eq!(settings.viewer.playback_rate, MAX_PLAYBACK_RATE);
        assert_eq!(settings.viewer.font_size, MIN_FONT_SIZE);
        assert_eq!(settings.viewer.loop_tolerance_ms, 1_000);
    }

    #[test]
    fn test_rate_clamp_handles_nan() {
        assert_eq!(clamp_rate(f64::NAN), 1.0);
        assert_eq!(clamp_rate(f64::INFINITY), 1.0);
        assert_eq!(clamp_rate(0.1), MIN_PLAYBACK_RATE);
        assert_eq!(clamp_rate(1.5), 1.5);
    }

    #[test]
    fn test_api_base_override() {
        let mut settings = ClientSettings::default();

        settings.apply_api_base_override("not a url");
        assert_eq!(settings.api.base_url, DEFAULT_API_BASE);

        settings.apply_api_base_override("   ");
        assert_eq!(settings.api.base_url, DEFAULT_API_BASE);

        settings.apply_api_base_override("https://velp.example.com/api");
        assert_eq!(settings.api.base_url, "https://velp.example.com/api");
        assert_eq!(
            settings.api_base().unwrap().as_str(),
            "https://velp.example.com/api"
        );
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        let manager = SettingsManager::new(nested);

        manager.save(&ClientSettings::default()).unwrap();
        assert!(manager.settings_path().exists());
    }

    #[test]
    fn test_concurrent_read_write() {
        use std::sync::Arc;
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(SettingsManager::new(temp_dir.path().to_path_buf()));
        manager.save(&ClientSettings::default()).unwrap();

        let mut handles = vec![];
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    let _ = manager.load();
                }
            }));
        }
        for i in 0..3u64 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                for j in 0..5u64 {
                    let mut settings = ClientSettings::default();
                    settings.polling.poll_interval_ms = 1_000 + i * 10 + j;
                    let _ = manager.save(&settings);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        let final_settings = manager.load();
        assert!(final_settings.polling.poll_interval_ms >= 1_000);
    }
}

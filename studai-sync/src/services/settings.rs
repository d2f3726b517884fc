//! Settings service
//!
//! Manages sync settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_API_BASE_URL, DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    MAX_PROBE_INTERVAL_SECS, MAX_REQUEST_TIMEOUT_SECS, MIN_PROBE_INTERVAL_SECS,
    MIN_REQUEST_TIMEOUT_SECS, SETTINGS_FILE,
};
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Settings for talking to the note backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Connectivity assumed before the first probe completes
    #[serde(default = "default_start_online")]
    pub start_online: bool,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

fn default_start_online() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            start_online: default_start_online(),
        }
    }
}

impl SyncSettings {
    /// Reject unusable values and clamp the rest into range
    pub fn validated(mut self) -> Result<Self> {
        let base = self.api_base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SyncError::Settings(format!(
                "api_base_url must be an http(s) URL, got {:?}",
                self.api_base_url
            )));
        }
        self.api_base_url = base.to_string();

        self.request_timeout_secs = self
            .request_timeout_secs
            .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS);
        self.probe_interval_secs = self
            .probe_interval_secs
            .clamp(MIN_PROBE_INTERVAL_SECS, MAX_PROBE_INTERVAL_SECS);

        if self
            .auth_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            self.auth_token = None;
        }

        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

/// Service for loading and saving sync settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join(SETTINGS_FILE),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<SyncSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = SyncSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: SyncSettings = serde_json::from_str(&content)
            .map_err(|e| SyncError::Settings(format!("Failed to parse settings: {}", e)))?;

        settings.validated()
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &SyncSettings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings)?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().to_path_buf());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_default_settings_created_on_load() {
        let (service, temp) = create_test_service();

        let settings = service.load().await.unwrap();

        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(settings.auth_token.is_none());
        assert!(settings.start_online);
        assert!(temp.path().join(SETTINGS_FILE).exists());
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let service = SettingsService::new(temp_dir.path().to_path_buf());
            let settings = SyncSettings {
                api_base_url: "https://studai.example/api".to_string(),
                auth_token: Some("token-123".to_string()),
                probe_interval_secs: 60,
                ..SyncSettings::default()
            };
            service.save(&settings).await.unwrap();
        }

        {
            let service = SettingsService::new(temp_dir.path().to_path_buf());
            let loaded = service.load().await.unwrap();
            assert_eq!(loaded.api_base_url, "https://studai.example/api");
            assert_eq!(loaded.auth_token.as_deref(), Some("token-123"));
            assert_eq!(loaded.probe_interval(), Duration::from_secs(60));
        }
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let (service, temp) = create_test_service();

        fs::write(
            temp.path().join(SETTINGS_FILE),
            r#"{"api_base_url": "http://10.0.0.2:5000/api/"}"#,
        )
        .await
        .unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.api_base_url, "http://10.0.0.2:5000/api");
        assert_eq!(loaded.probe_interval_secs, DEFAULT_PROBE_INTERVAL_SECS);
    }

    #[test]
    fn test_validation_clamps_and_rejects() {
        let clamped = SyncSettings {
            request_timeout_secs: 0,
            probe_interval_secs: 1_000_000,
            auth_token: Some("  ".to_string()),
            ..SyncSettings::default()
        }
        .validated()
        .unwrap();

        assert_eq!(clamped.request_timeout_secs, MIN_REQUEST_TIMEOUT_SECS);
        assert_eq!(clamped.probe_interval_secs, MAX_PROBE_INTERVAL_SECS);
        assert!(clamped.auth_token.is_none());

        let invalid = SyncSettings {
            api_base_url: "ftp://nope".to_string(),
            ..SyncSettings::default()
        };
        assert!(invalid.validated().is_err());
    }
}

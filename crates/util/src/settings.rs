//! Engine settings persistence.
//!
//! Settings live in a small JSON file in the standard configuration
//! directory (`~/.config/solution-builder/settings.json` on most platforms).
//! A missing file yields defaults; a file that fails to parse is reported
//! with a warning and also yields defaults so a stray edit never blocks a run.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::{config_dir, home_dir};
use sb_types::EngineSettings;
use thiserror::Error;
use tracing::warn;

/// Environment variable allowing callers to override the settings file path.
pub const SETTINGS_PATH_ENV: &str = "SB_SETTINGS_PATH";

/// Environment variable overriding the configured subscription id.
pub const SUBSCRIPTION_ID_ENV: &str = "SB_SUBSCRIPTION_ID";

/// Default filename for the JSON payload.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Error surfaced when reading or writing settings fails.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O failure (for example, permissions).
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure while saving.
    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Loads settings from the default location, applying environment overrides.
pub fn load_settings() -> Result<EngineSettings, SettingsError> {
    load_settings_from(&default_settings_path())
}

/// Loads settings from `path`, applying environment overrides.
pub fn load_settings_from(path: &Path) -> Result<EngineSettings, SettingsError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(settings) => settings,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse settings file; using defaults"
                );
                EngineSettings::default()
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => EngineSettings::default(),
        Err(error) => return Err(SettingsError::Io(error)),
    };

    if let Ok(subscription_id) = env::var(SUBSCRIPTION_ID_ENV) {
        let trimmed = subscription_id.trim();
        if !trimmed.is_empty() {
            settings.subscription_id = trimmed.to_string();
        }
    }
    Ok(settings)
}

/// Writes settings to `path`, creating parent directories as needed.
pub fn save_settings(path: &Path, settings: &EngineSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

/// Replaces a leading `~` segment with the home directory, when one is known.
pub fn expand_home(path: &str) -> PathBuf {
    let path = Path::new(path.trim());
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Resolves the settings file path honoring [`SETTINGS_PATH_ENV`].
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(SETTINGS_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_home(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solution-builder")
        .join(SETTINGS_FILE_NAME)
}

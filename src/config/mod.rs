//! Configuration management for the replay engine.
//!
//! Configuration is loaded from a JSON settings document under the "replay"
//! key, merged with defaults and validated, then held in a process-wide
//! singleton that the executor reads when it builds a transport.

pub mod schema;

pub use schema::{ConfigError, ReplayConfig};

use log::warn;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;

/// Key of the replay settings inside a settings document.
pub const SETTINGS_KEY: &str = "replay";

/// Global configuration instance.
static CONFIG: Lazy<RwLock<ReplayConfig>> = Lazy::new(|| RwLock::new(ReplayConfig::default()));

/// Loads configuration from a JSON settings document.
///
/// Reads the "replay" settings, merges them with defaults, validates the
/// result and updates the global configuration. Settings that fail to
/// deserialize are logged and replaced by defaults; settings that
/// deserialize but fail validation are rejected and leave the global
/// configuration untouched.
///
/// # Example
///
/// ```
/// use request_replay::config::{load_config, reset_config};
/// use serde_json::json;
///
/// let settings = json!({
///     "replay": {
///         "timeout": 60000,
///         "validateSsl": false
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.timeout, 60000);
/// # reset_config();
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<ReplayConfig, ConfigError> {
    let mut config = ReplayConfig::default();

    if let Some(replay_settings) = settings_json.as_ref().and_then(|s| s.get(SETTINGS_KEY)) {
        match serde_json::from_value::<ReplayConfig>(replay_settings.clone()) {
            Ok(user_config) => config = user_config,
            Err(e) => {
                warn!("Failed to parse replay settings: {}. Using defaults.", e);
            }
        }
    }

    config.validate()?;

    if let Ok(mut global_config) = CONFIG.write() {
        *global_config = config.clone();
    }

    Ok(config)
}

/// Gets a clone of the current global configuration.
///
/// Returns the defaults if nothing has been loaded yet.
pub fn get_config() -> ReplayConfig {
    CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|_| ReplayConfig::default())
}

/// Updates the global configuration in place.
///
/// If the update leaves the configuration invalid, it reverts to defaults.
pub fn update_config<F>(updater: F)
where
    F: FnOnce(&mut ReplayConfig),
{
    if let Ok(mut config) = CONFIG.write() {
        updater(&mut config);

        if let Err(e) = config.validate() {
            warn!("Configuration validation failed after update: {}", e);
            *config = ReplayConfig::default();
        }
    }
}

/// Resets the configuration to defaults.
pub fn reset_config() {
    if let Ok(mut config) = CONFIG.write() {
        *config = ReplayConfig::default();
    }
}

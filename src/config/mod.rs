//! Configuration management for the traffic workbook extension.
//!
//! Configuration is loaded from the host's JSON settings under the
//! "traffic-workbook" key, merged with defaults, validated, and kept in a
//! process-wide singleton.

pub mod schema;

pub use schema::{DomainRule, OverflowPolicy, WorkbookConfig};

use log::warn;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;

/// Key of this extension's section in the host settings.
pub const SETTINGS_KEY: &str = "traffic-workbook";

/// Global configuration instance.
static CONFIG: Lazy<RwLock<WorkbookConfig>> =
    Lazy::new(|| RwLock::new(WorkbookConfig::default()));

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The merged settings failed validation; the previous configuration stays active.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from host settings.
///
/// Settings that fail to deserialize are ignored with a warning and the
/// defaults are used instead. Settings that deserialize but fail validation
/// are rejected and the global configuration is left untouched.
///
/// # Example
///
/// ```no_run
/// use traffic_workbook::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "traffic-workbook": {
///         "maxBufferEntries": 500,
///         "overflowPolicy": "haltCapture"
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.max_buffer_entries, 500);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<WorkbookConfig, ConfigError> {
    let mut config = WorkbookConfig::default();

    if let Some(section) = settings_json.as_ref().and_then(|s| s.get(SETTINGS_KEY)) {
        match serde_json::from_value::<WorkbookConfig>(section.clone()) {
            Ok(user_config) => config = config.merge(&user_config),
            Err(e) => warn!(
                "Failed to parse {} settings: {}. Using defaults.",
                SETTINGS_KEY, e
            ),
        }
    }

    config.validate().map_err(ConfigError::Invalid)?;

    if let Ok(mut global_config) = CONFIG.write() {
        *global_config = config.clone();
    }

    Ok(config)
}

/// Gets a clone of the current global configuration.
pub fn get_config() -> WorkbookConfig {
    CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|_| WorkbookConfig::default())
}

/// Applies `updater` to the global configuration.
///
/// If the result fails validation the configuration reverts to defaults.
pub fn update_config<F>(updater: F)
where
    F: FnOnce(&mut WorkbookConfig),
{
    if let Ok(mut config) = CONFIG.write() {
        updater(&mut config);

        if let Err(e) = config.validate() {
            warn!("Configuration validation failed after update: {}", e);
            *config = WorkbookConfig::default();
        }
    }
}

/// Resets the configuration to defaults.
pub fn reset_config() {
    if let Ok(mut config) = CONFIG.write() {
        *config = WorkbookConfig::default();
    }
}

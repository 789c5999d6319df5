use std::env;

use serde::Deserialize;

use crate::diagnostics::LogLevel;
use crate::error::FormError;

/// Engine settings.
///
/// Deserializes with every key optional, so it can sit inside a host's own
/// configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Splits field keys into tree segments (`app.region` → `app` / `region`).
    pub key_separator: String,
    /// Field consulted by [`FormEngine::check_default_submit`](crate::FormEngine::check_default_submit).
    pub submit_key: String,
    /// When set, the engine logs to stderr at this level through its own
    /// dispatch instead of the host's default subscriber.
    pub log_level: Option<LogLevel>,
    /// Longest method payload, in bytes, written to a log event.
    pub max_log_content: usize,
}

pub const DEFAULT_SUBMIT_KEY: &str = "can_submit";

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_separator: ".".to_owned(),
            submit_key: DEFAULT_SUBMIT_KEY.to_owned(),
            log_level: None,
            max_log_content: 30 * 1024,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `FORM_KEY_SEP`, `FORM_SUBMIT_KEY`,
    /// `FORM_LOG_LEVEL` and `FORM_LOG_MAX_CONTENT`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Config`] if a variable is set to a value that
    /// does not parse.
    pub fn from_env() -> Result<Self, FormError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FormError> {
        let mut config = Self::default();
        if let Some(sep) = lookup("FORM_KEY_SEP") {
            config.key_separator = sep;
        }
        if let Some(key) = lookup("FORM_SUBMIT_KEY") {
            if key.trim().is_empty() {
                return Err(FormError::Config {
                    message: "FORM_SUBMIT_KEY is empty".to_owned(),
                });
            }
            config.submit_key = key;
        }
        if let Some(level) = lookup("FORM_LOG_LEVEL") {
            let level = level.parse::<LogLevel>().map_err(|message| FormError::Config {
                message: format!("FORM_LOG_LEVEL: {message}"),
            })?;
            config.log_level = Some(level);
        }
        if let Some(max) = lookup("FORM_LOG_MAX_CONTENT") {
            config.max_log_content = max.trim().parse::<usize>().map_err(|e| FormError::Config {
                message: format!("FORM_LOG_MAX_CONTENT: {e}"),
            })?;
        }
        Ok(config)
    }
}

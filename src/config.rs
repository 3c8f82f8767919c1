//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logger::LogLevel;

/// Worker settings, resolved once at startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Extra attempts for a failed task.
    pub max_retries: u32,
    /// Maximum number of tasks executing at once.
    pub max_processes: u32,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Upper bound on how long shutdown waits for each activity.
    pub shutdown_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_processes: 1,
            heartbeat_interval_secs: 2,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Settings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_processes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_processes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat_interval_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level written.
    pub level: LogLevel,
    /// Force colored tags on or off. `None` colors only when stdout is a terminal.
    pub color: Option<bool>,
    /// Scope label printed before every message.
    pub prefix: Option<String>,
    /// Append to this file instead of stdout.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            color: None,
            prefix: None,
            file: None,
        }
    }
}

impl LogConfig {
    /// Read `SYNAPSE_LOG_*` variables from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let level = match get("SYNAPSE_LOG_LEVEL") {
            Some(raw) => raw.parse()?,
            None => LogLevel::Info,
        };

        let color = match get("SYNAPSE_LOG_COLOR") {
            Some(raw) => Some(parse_bool("SYNAPSE_LOG_COLOR", &raw)?),
            None => None,
        };

        Ok(Self {
            level,
            color,
            prefix: get("SYNAPSE_LOG_PREFIX").filter(|p| !p.is_empty()),
            file: get("SYNAPSE_LOG_FILE")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.max_processes, 1);
        assert_eq!(s.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(s.shutdown_timeout(), Duration::from_secs(5));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_processes_rejected() {
        let s = Settings {
            max_processes: 0,
            ..Default::default()
        };
        assert!(matches!(
            s.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "max_processes"
        ));
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let s = Settings {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn log_config_defaults_when_unset() {
        let config = LogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.color, None);
        assert!(config.prefix.is_none());
        assert!(config.file.is_none());
    }

    #[test]
    fn log_config_reads_vars() {
        let config = LogConfig::from_lookup(lookup(&[
            ("SYNAPSE_LOG_LEVEL", "debug"),
            ("SYNAPSE_LOG_COLOR", "off"),
            ("SYNAPSE_LOG_PREFIX", "[bot]"),
            ("SYNAPSE_LOG_FILE", "/tmp/synapse.log"),
        ]))
        .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.color, Some(false));
        assert_eq!(config.prefix.as_deref(), Some("[bot]"));
        assert_eq!(config.file, Some(PathBuf::from("/tmp/synapse.log")));
    }

    #[test]
    fn log_config_rejects_bad_values() {
        assert!(LogConfig::from_lookup(lookup(&[("SYNAPSE_LOG_LEVEL", "chatty")])).is_err());
        assert!(LogConfig::from_lookup(lookup(&[("SYNAPSE_LOG_COLOR", "maybe")])).is_err());
    }
}

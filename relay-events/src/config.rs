//! Event bus configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Event name whose subscribers receive every emission.
pub const DEFAULT_WILDCARD: &str = "*";

/// Deadline used by `wait_for` when none is given.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Enable event logging
    pub enable_logging: bool,

    /// Reserved event name for wildcard subscribers
    pub wildcard: String,

    /// Default `wait_for` deadline in milliseconds
    pub default_wait_timeout_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            wildcard: DEFAULT_WILDCARD.to_string(),
            default_wait_timeout_ms: u64::try_from(DEFAULT_WAIT_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl EventBusConfig {
    /// Create config from environment variables.
    ///
    /// - `RELAY_EVENTS_LOGGING=1|0|true|false`
    /// - `RELAY_EVENTS_WILDCARD=<name>`
    /// - `RELAY_EVENTS_WAIT_TIMEOUT_MS=<millis>`
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let enable_logging = lookup("RELAY_EVENTS_LOGGING")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.enable_logging);

        let wildcard = lookup("RELAY_EVENTS_WILDCARD")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.wildcard);

        let default_wait_timeout_ms = lookup("RELAY_EVENTS_WAIT_TIMEOUT_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.default_wait_timeout_ms);

        Self {
            enable_logging,
            wildcard,
            default_wait_timeout_ms,
        }
    }

    /// Default `wait_for` deadline.
    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EventBusConfig::default();

        assert!(config.enable_logging);
        assert_eq!(config.wildcard, "*");
        assert_eq!(config.default_wait_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_from_lookup() {
        let config = EventBusConfig::from_lookup(lookup(&[
            ("RELAY_EVENTS_LOGGING", "false"),
            ("RELAY_EVENTS_WILDCARD", "**"),
            ("RELAY_EVENTS_WAIT_TIMEOUT_MS", "250"),
        ]));

        assert!(!config.enable_logging);
        assert_eq!(config.wildcard, "**");
        assert_eq!(config.default_wait_timeout_ms, 250);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = EventBusConfig::from_lookup(lookup(&[
            ("RELAY_EVENTS_LOGGING", "maybe"),
            ("RELAY_EVENTS_WILDCARD", "   "),
            ("RELAY_EVENTS_WAIT_TIMEOUT_MS", "soon"),
        ]));

        assert_eq!(config, EventBusConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EventBusConfig =
            serde_json::from_str(r#"{"default_wait_timeout_ms": 100}"#).unwrap();

        assert_eq!(config.default_wait_timeout_ms, 100);
        assert_eq!(config.wildcard, DEFAULT_WILDCARD);
        assert!(config.enable_logging);
    }
}

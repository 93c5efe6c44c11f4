//! Transport configuration with layered loading.
//!
//! Loading flow:
//! 1. Start with compiled [`WebSocketConfig::default()`]
//! 2. If a JSON file is given and exists, deep-merge its values over defaults
//! 3. Apply `OUTPORT_*` environment variable overrides (highest priority)
//!
//! The result is validated before any transport is built from it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ConfigError;

/// Default retry interval between dial / write attempts.
pub const DEFAULT_RETRY_DURATION_SECS: u64 = 5;
/// Default maximum WebSocket message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Which side of the link this process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Dial the configured endpoint.
    Client,
    /// Accept connections on the configured endpoint.
    Server,
}

/// Configuration shared by the client and server roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Endpoint: `host:port` to dial or to bind.
    pub url: String,
    /// Client or server role.
    pub mode: ConnectionMode,
    /// Whether outbound frames request an acknowledgment.
    pub with_acknowledge: bool,
    /// When true, a payload-handler error withholds the acknowledgment.
    pub blocking_ack_on_error: bool,
    /// Retry interval in seconds; must be non-zero.
    pub retry_duration_secs: u64,
    /// Maximum accepted WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "localhost:22111".into(),
            mode: ConnectionMode::Client,
            with_acknowledge: true,
            blocking_ack_on_error: false,
            retry_duration_secs: DEFAULT_RETRY_DURATION_SECS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl WebSocketConfig {
    /// Check the values that must be set for a transport to work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.retry_duration_secs == 0 {
            return Err(ConfigError::ZeroRetryDuration);
        }
        Ok(())
    }

    /// Retry interval as a [`Duration`].
    pub fn retry_duration(&self) -> Duration {
        Duration::from_secs(self.retry_duration_secs)
    }

    /// Load from an optional JSON file, apply env overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file deep-merged over defaults.
    ///
    /// A missing file yields the defaults; invalid JSON is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let defaults = serde_json::to_value(Self::default())?;
        let merged = if path.exists() {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        } else {
            debug!(?path, "config file not found, using defaults");
            defaults
        };
        Ok(serde_json::from_value(merged)?)
    }
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and null
/// values in `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `OUTPORT_*` environment overrides.
pub fn apply_env_overrides(config: &mut WebSocketConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are ignored.
pub fn apply_overrides(config: &mut WebSocketConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("OUTPORT_URL") {
        config.url = v;
    }
    if let Some(v) = read("OUTPORT_MODE") {
        match parse_mode(&v) {
            Some(mode) => config.mode = mode,
            None => warn!(key = "OUTPORT_MODE", value = %v, "invalid mode env var, ignoring"),
        }
    }
    if let Some(v) = read("OUTPORT_WITH_ACK") {
        match parse_bool(&v) {
            Some(b) => config.with_acknowledge = b,
            None => {
                warn!(key = "OUTPORT_WITH_ACK", value = %v, "invalid boolean env var, ignoring");
            }
        }
    }
    if let Some(v) = read("OUTPORT_BLOCKING_ACK_ON_ERROR") {
        match parse_bool(&v) {
            Some(b) => config.blocking_ack_on_error = b,
            None => warn!(
                key = "OUTPORT_BLOCKING_ACK_ON_ERROR",
                value = %v,
                "invalid boolean env var, ignoring"
            ),
        }
    }
    if let Some(v) = read("OUTPORT_RETRY_SECS") {
        match parse_u64_range(&v, 1, 3600) {
            Some(n) => config.retry_duration_secs = n,
            None => warn!(key = "OUTPORT_RETRY_SECS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a connection mode name.
pub fn parse_mode(val: &str) -> Option<ConnectionMode> {
    match val.to_lowercase().as_str() {
        "client" => Some(ConnectionMode::Client),
        "server" => Some(ConnectionMode::Server),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = WebSocketConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.with_acknowledge);
        assert!(!cfg.blocking_ack_on_error);
        assert_eq!(cfg.retry_duration(), Duration::from_secs(5));
    }

    #[test]
    fn empty_url_rejected() {
        let cfg = WebSocketConfig {
            url: "  ".into(),
            ..WebSocketConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::EmptyUrl));
    }

    #[test]
    fn zero_retry_rejected() {
        let cfg = WebSocketConfig {
            retry_duration_secs: 0,
            ..WebSocketConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::ZeroRetryDuration));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WebSocketConfig::load_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg, WebSocketConfig::default());
    }

    #[test]
    fn load_partial_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"url":"10.0.0.1:9000","mode":"server","withAck":null}}"#).unwrap();
        let cfg = WebSocketConfig::load_from_path(file.path()).unwrap();
        assert_eq!(cfg.url, "10.0.0.1:9000");
        assert_eq!(cfg.mode, ConnectionMode::Server);
        assert_eq!(cfg.retry_duration_secs, DEFAULT_RETRY_DURATION_SECS);
    }

    #[test]
    fn load_invalid_json_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_matches!(
            WebSocketConfig::load_from_path(file.path()),
            Err(ConfigError::Json(_))
        );
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OUTPORT_URL", "127.0.0.1:1"),
            ("OUTPORT_MODE", "SERVER"),
            ("OUTPORT_WITH_ACK", "off"),
            ("OUTPORT_BLOCKING_ACK_ON_ERROR", "yes"),
            ("OUTPORT_RETRY_SECS", "2"),
        ]
        .into_iter()
        .collect();
        let mut cfg = WebSocketConfig::default();
        apply_overrides(&mut cfg, |k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(cfg.url, "127.0.0.1:1");
        assert_eq!(cfg.mode, ConnectionMode::Server);
        assert!(!cfg.with_acknowledge);
        assert!(cfg.blocking_ack_on_error);
        assert_eq!(cfg.retry_duration_secs, 2);
    }

    #[test]
    fn invalid_overrides_ignored() {
        let env: HashMap<&str, &str> = [
            ("OUTPORT_URL", ""),
            ("OUTPORT_MODE", "peer"),
            ("OUTPORT_WITH_ACK", "maybe"),
            ("OUTPORT_RETRY_SECS", "0"),
        ]
        .into_iter()
        .collect();
        let mut cfg = WebSocketConfig::default();
        apply_overrides(&mut cfg, |k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(cfg, WebSocketConfig::default());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_u64_range("10", 1, 5), None);
        assert_eq!(parse_u64_range("3", 1, 5), Some(3));
        assert_eq!(parse_mode("client"), Some(ConnectionMode::Client));
        assert_eq!(parse_mode("x"), None);
    }

    #[test]
    fn deep_merge_nested() {
        let a = serde_json::json!({"x": {"a": 1, "b": 2}, "y": [1]});
        let b = serde_json::json!({"x": {"b": 3}, "y": [2, 3], "z": null});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"]["a"], 1);
        assert_eq!(merged["x"]["b"], 3);
        assert_eq!(merged["y"], serde_json::json!([2, 3]));
        assert!(merged.get("z").is_none());
    }
}

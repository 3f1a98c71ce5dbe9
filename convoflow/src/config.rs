//! Engine configuration.

use crate::errors::{ConvoflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What to do with a stored row that cannot be unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptRowPolicy {
    /// Surface the type-resolution or format error.
    #[default]
    Fail,
    /// Log a warning and behave as if no row existed.
    ///
    /// The engine then starts a fresh conversation; if a handler claims the
    /// event, saving it overwrites the corrupt row in place.
    TreatAsMissing,
}

/// Configuration for the conversation store and engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default bounded wait for `fetch`, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Bounded wait for the per-turn lease, in milliseconds.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Idle time after which an unused lock slot may be evicted, in milliseconds.
    #[serde(default = "default_lock_idle_ttl_ms")]
    pub lock_idle_ttl_ms: u64,
    /// Lock-table size that triggers an eviction sweep.
    #[serde(default = "default_lock_sweep_threshold")]
    pub lock_sweep_threshold: usize,
    /// Handling of unreadable rows.
    #[serde(default)]
    pub corrupt_rows: CorruptRowPolicy,
    /// Action installed on newly created conversations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<String>,
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

fn default_turn_timeout_ms() -> u64 {
    5_000
}

fn default_lock_idle_ttl_ms() -> u64 {
    600_000
}

fn default_lock_sweep_threshold() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            turn_timeout_ms: default_turn_timeout_ms(),
            lock_idle_ttl_ms: default_lock_idle_ttl_ms(),
            lock_sweep_threshold: default_lock_sweep_threshold(),
            corrupt_rows: CorruptRowPolicy::default(),
            default_action: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConvoflowError::Config(e.to_string()))
    }

    /// Loads a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConvoflowError::Config(format!("{}: {e}", path.display())))
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Sets the turn timeout.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout_ms = duration_to_ms(timeout);
        self
    }

    /// Sets the lock idle TTL.
    #[must_use]
    pub fn with_lock_idle_ttl(mut self, ttl: Duration) -> Self {
        self.lock_idle_ttl_ms = duration_to_ms(ttl);
        self
    }

    /// Sets the sweep threshold.
    #[must_use]
    pub fn with_lock_sweep_threshold(mut self, threshold: usize) -> Self {
        self.lock_sweep_threshold = threshold;
        self
    }

    /// Sets the corrupt-row policy.
    #[must_use]
    pub fn with_corrupt_rows(mut self, policy: CorruptRowPolicy) -> Self {
        self.corrupt_rows = policy;
        self
    }

    /// Sets the action installed on new conversations.
    #[must_use]
    pub fn with_default_action(mut self, action: impl Into<String>) -> Self {
        self.default_action = Some(action.into());
        self
    }

    /// The fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// The turn timeout.
    #[must_use]
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    /// The lock idle TTL.
    #[must_use]
    pub fn lock_idle_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_idle_ttl_ms)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.turn_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock_idle_ttl(), Duration::from_secs(600));
        assert_eq!(config.lock_sweep_threshold, 1024);
        assert_eq!(config.corrupt_rows, CorruptRowPolicy::Fail);
        assert!(config.default_action.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"fetch_timeout_ms": 250, "corrupt_rows": "treat_as_missing"}"#)
                .unwrap();

        assert_eq!(config.fetch_timeout(), Duration::from_millis(250));
        assert_eq!(config.corrupt_rows, CorruptRowPolicy::TreatAsMissing);
        assert_eq!(config.turn_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = EngineConfig::from_json_str(r#"{"corrupt_rows": "ignore"}"#).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_turn_timeout(Duration::from_millis(40))
            .with_lock_idle_ttl(Duration::from_secs(5))
            .with_default_action("Welcome");

        assert_eq!(config.turn_timeout_ms, 40);
        assert_eq!(config.lock_idle_ttl_ms, 5_000);
        assert_eq!(config.default_action.as_deref(), Some("Welcome"));
    }

    #[test]
    fn test_sub_second_lock_ttl_is_kept() {
        let config = EngineConfig::new().with_lock_idle_ttl(Duration::from_millis(500));
        assert_eq!(config.lock_idle_ttl(), Duration::from_millis(500));

        let parsed = EngineConfig::from_json_str(r#"{"lock_idle_ttl_ms": 250}"#).unwrap();
        assert_eq!(parsed.lock_idle_ttl(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lock_sweep_threshold": 16, "default_action": "Welcome"}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.lock_sweep_threshold, 16);
        assert_eq!(config.default_action.as_deref(), Some("Welcome"));

        let missing = EngineConfig::from_file(file.path().with_extension("absent")).unwrap_err();
        assert_eq!(missing.kind(), "io");
    }
}

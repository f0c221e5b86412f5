//! # Config Loader — streaming session configuration
//!
//! Reads `argus.toml` (or a custom path) and deserializes into a typed
//! config struct. Every field has a default so a missing file or a partial
//! file still yields a runnable session.

use crate::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Streaming session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Push channel endpoint (`ws://` / `wss://`).
    pub push_endpoint: String,
    /// Snapshot endpoint used for initial hydration and polling fallback.
    pub snapshot_endpoint: String,
    /// Whether the push channel is used at all. When false the session runs
    /// in polling mode from the start.
    pub push_enabled: bool,
    /// Promote to polling automatically once reconnect attempts exhaust.
    pub fallback_to_polling: bool,
    pub poll_interval_ms: u64,
    /// Rolling metrics buffer capacity.
    pub max_metric_points: usize,
    pub max_alerts: usize,
    pub max_entities: usize,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            push_endpoint: "ws://127.0.0.1:8787/ws/intel".into(),
            snapshot_endpoint: "http://127.0.0.1:8787/api/intel/snapshot".into(),
            push_enabled: true,
            fallback_to_polling: true,
            poll_interval_ms: 5_000,
            max_metric_points: 50,
            max_alerts: 10,
            max_entities: 10,
            max_reconnect_attempts: 5,
            reconnect_base_ms: 3_000,
            reconnect_cap_ms: 30_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl StreamConfig {
    /// Load from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> StreamResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| StreamError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), "stream config loaded");
        Ok(config)
    }

    /// Write this config as TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> StreamResult<()> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self)
            .map_err(|e| StreamError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, raw)
            .map_err(|e| StreamError::Config(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(StreamError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(StreamError::Config("heartbeat_interval_ms must be > 0".into()));
        }
        if self.reconnect_base_ms == 0 {
            return Err(StreamError::Config("reconnect_base_ms must be > 0".into()));
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(StreamError::Config(
                "reconnect_cap_ms must be >= reconnect_base_ms".into(),
            ));
        }
        if self.max_metric_points == 0 || self.max_alerts == 0 || self.max_entities == 0 {
            return Err(StreamError::Config("registry bounds must be > 0".into()));
        }
        if self.push_enabled && self.push_endpoint.is_empty() {
            return Err(StreamError::Config(
                "push_endpoint required when push_enabled".into(),
            ));
        }
        if !self.push_enabled && self.snapshot_endpoint.is_empty() {
            return Err(StreamError::Config(
                "snapshot_endpoint required in polling mode".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }
}

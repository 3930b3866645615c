//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file, then overridden by
//! environment variables. Extension settings sent by the host are NOT part of
//! this; they travel as opaque `extension.settings` payloads.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Event dispatcher configuration.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Intent correlator configuration.
    #[serde(default)]
    pub intent: IntentConfig,

    /// Worker offload pool configuration.
    #[serde(default)]
    pub offload: OffloadConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Directory handed to resource constructors for model files.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PICTEUS_EXTENSION_CACHE_DIR` and `PICTEUS_OFFLOAD_WORKERS`.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("PICTEUS_EXTENSION_CACHE_DIR") {
            if !dir.is_empty() {
                self.cache_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(workers) = std::env::var("PICTEUS_OFFLOAD_WORKERS") {
            self.offload.max_concurrency = workers.parse().map_err(|_| {
                Error::validation(format!("PICTEUS_OFFLOAD_WORKERS is not a number: {}", workers))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings that would wedge the runtime.
    pub fn validate(&self) -> Result<()> {
        if self.transport.max_frame_bytes == 0 {
            return Err(Error::validation("transport.max_frame_bytes must be > 0"));
        }
        if self.transport.channel_capacity == 0 {
            return Err(Error::validation("transport.channel_capacity must be > 0"));
        }
        if self.dispatcher.max_in_flight == 0 {
            return Err(Error::validation("dispatcher.max_in_flight must be > 0"));
        }
        if self.offload.max_concurrency == 0 {
            return Err(Error::validation("offload.max_concurrency must be > 0"));
        }
        Ok(())
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Bounded capacity of the inbound and outbound message queues.
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
            channel_capacity: 256,
        }
    }
}

/// Event dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum handlers in flight. Events arriving at the cap wait in a
    /// backlog; intent replies keep flowing.
    pub max_in_flight: usize,

    /// How long in-flight handlers may drain after shutdown starts.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Intent correlator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentConfig {
    /// Timeout applied to `send_intent` when the caller gives none.
    /// `None` waits until the reply arrives or the channel closes.
    #[serde(default, with = "humantime_serde")]
    pub default_timeout: Option<Duration>,
}

/// Worker offload pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Concurrent blocking callables. GPU work usually saturates one device.
    pub max_concurrency: usize,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

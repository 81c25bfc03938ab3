//! Engine configuration loading and defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ecat_common::breaker;
use ecat_common::error::{Error, Result};
use ecat_common::rt::RtConfig;

/// Per-engine configuration.
///
/// All fields default, so an empty TOML table produces a working engine
/// running without RT scheduling and without overrun logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overruns are logged only when the cycle exceeds the period by more
    /// than this margin [µs]. Zero disables overrun logging.
    pub max_overrun_us: u64,
    /// Real-time configuration for the cycle thread.
    pub rt: RtConfig,
    /// Retry/backoff parameters for the reconfigure loop.
    pub retry: breaker::Config,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_overrun_us: 0,
            rt: RtConfig::default(),
            retry: breaker::Config {
                name: "ecat_engine".to_string(),
                ..breaker::Config::default()
            },
        }
    }
}

impl EngineConfig {
    /// The overrun logging margin.
    pub fn max_overrun(&self) -> Duration {
        Duration::from_micros(self.max_overrun_us)
    }

    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config file {path:?}: {e}")))
    }
}

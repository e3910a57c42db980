use std::path::Path;

use anyhow::Context;
use biosignal_types::PipelineConfig;
use sensors::MockConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration for the daemon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Processing pipeline settings
    pub pipeline: PipelineConfig,
    /// Synthetic sensor settings
    pub mock: MockConfig,
    /// Payloads buffered between the sensor and the session
    pub payload_queue_capacity: usize,
    /// Events buffered between the session and the output writer
    pub event_queue_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            mock: MockConfig::default(),
            payload_queue_capacity: 64,
            event_queue_capacity: 256,
        }
    }
}

/// Load daemon configuration, falling back to defaults if the file is missing.
///
/// A file that exists but cannot be parsed, or that describes an invalid
/// pipeline, is an error.
pub fn load_config(path: &Path) -> anyhow::Result<DaemonConfig> {
    let config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: DaemonConfig = serde_json::from_str(&contents)
                .with_context(|| format!("could not parse configuration file '{}'", path.display()))?;
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            DaemonConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("could not read configuration file '{}'", path.display()));
        }
    };

    config.pipeline.validate().context("invalid pipeline configuration")?;
    if config.payload_queue_capacity == 0 || config.event_queue_capacity == 0 {
        anyhow::bail!("queue capacities must be at least 1");
    }
    Ok(config)
}

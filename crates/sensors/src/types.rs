//! Common types and traits for sensor sources

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur in sensor sources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The consumer of the payload stream went away before shutdown
    #[error("Payload consumer disconnected")]
    Disconnected,
}

/// A producer of raw sensor payloads.
///
/// Each payload is one notification's worth of packed records in the
/// configured wire layout. Sources keep producing until `shutdown` fires.
#[async_trait]
pub trait SensorSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Stream payloads into `tx` until `shutdown` is cancelled.
    async fn run(&mut self, tx: flume::Sender<Bytes>, shutdown: CancellationToken) -> Result<(), SensorError>;
}

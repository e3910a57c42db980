//! Error types for the pipeline

use biosignal_types::ConfigError;
use thiserror::Error;

/// Reasons a payload is rejected by the packet decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload of {len} bytes is not a multiple of the {record_size}-byte record size")]
    Framing { len: usize, record_size: usize },
}

/// Pipeline-level error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Filter design error for {filter}: {message}")]
    FilterDesign { filter: &'static str, message: String },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

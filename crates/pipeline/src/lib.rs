//! Real-time bio-potential processing pipeline
//!
//! Decodes sensor payloads, filters each channel in arrival order, and feeds
//! two periodic analysis engines: relative EEG band power and ECG heart rate.
//!
//! ```text
//! payload -> PacketDecoder -> FilterBank -> WindowBuffer -+-> SpectralEngine -> BandPower
//!                                                         +-> BeatEngine     -> HeartRate
//! ```
//!
//! [`Session`] wires the ordered ingestion path to the engines, which run as
//! tokio tasks and only ever see copied window snapshots.

pub mod band_power;
pub mod cardiac;
pub mod decoder;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod session;
pub mod spectrum;
pub mod window;

// Re-export commonly used types
pub use band_power::{SpectralEngine, SpectralRequest};
pub use cardiac::{detect_beats, BeatEngine, BeatRequest, BpmSmoother};
pub use decoder::PacketDecoder;
pub use error::*;
pub use filters::FilterBank;
pub use ingest::{IngestOutput, Ingestor};
pub use session::Session;
pub use spectrum::{MagnitudeSpectrum, RustFftSpectrum};
pub use window::WindowBuffer;

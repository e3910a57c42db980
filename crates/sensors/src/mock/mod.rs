//! Synthetic sensor for running the pipeline without hardware.

mod driver;
mod generator;

pub use driver::{MockConfig, MockSensor};
pub use generator::SignalGenerator;

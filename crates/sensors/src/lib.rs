pub mod encode;
pub mod mock;
pub mod types;

// Re-export the main types that users need
pub use encode::encode_records;
pub use mock::{MockConfig, MockSensor};
pub use types::{SensorError, SensorSource};

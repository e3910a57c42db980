//! Shared types for the bio-potential streaming pipeline
//!
//! This crate contains the data model, the events published by a pipeline
//! session, and the configuration types used by every other crate in the
//! workspace.

pub mod config;
pub mod data;
pub mod event;

// Re-export commonly used types
pub use config::*;
pub use data::*;
pub use event::*;

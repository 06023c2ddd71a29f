//! EFV Common Utilities
//!
//! Shared infrastructure for all EFV crates:
//! - Error types and result aliases
//! - Sensor clock and frame pacing for loopback capture
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

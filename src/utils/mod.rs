//! Shared utilities
//!
//! Logging and timing helpers used across the binary.

pub mod logger;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::Timer;

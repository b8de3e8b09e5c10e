//! Core utilities shared across the Accele workspace.
//!
//! This crate provides foundational types used by the application crates:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::{FrameReport, Timer};

//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the configuration provide one.
pub const DEFAULT_LOG_FILTER: &str = "info,accele=debug";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence; otherwise `filter` is used, falling back to
/// [`DEFAULT_LOG_FILTER`] when `filter` is `None` or fails to parse.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
///
/// # Example
/// ```no_run
/// accele_core::init_logging(None);
/// tracing::info!("Logging ready");
/// ```
pub fn init_logging(filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

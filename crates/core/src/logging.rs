//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,multipass=debug,gpu_allocator=warn";

/// Initialize the logging system with tracing.
///
/// Filtering follows `RUST_LOG` when present and falls back to
/// [`DEFAULT_FILTER`]. Calling this twice is harmless: the second
/// registration attempt is ignored.
///
/// # Example
/// ```
/// multipass_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

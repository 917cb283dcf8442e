//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,texquad=debug";

/// Installs the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` when set, otherwise `info` globally and
/// `debug` for the texquad crates. Output goes through the `fmt` layer with
/// target and thread id.
///
/// # Example
/// ```no_run
/// texquad_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

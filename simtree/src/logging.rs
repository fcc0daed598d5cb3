//! Development-time tracing for the engine and CLI.
//!
//! Diagnostics go to stderr so that command output on stdout stays valid JSON.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` when unset.
///
/// # Example
/// ```bash
/// RUST_LOG=simtree=debug simtree continue --case 1 --tree 4
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

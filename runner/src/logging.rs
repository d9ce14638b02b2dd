//! Development-time tracing for debugging the runner.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted, not part of the run's product output.
//!
//! - **Run artifacts (`io::metadata`)**: `runner.log`, `metadata.json`
//!   and summary blocks under the log root. Always written, unaffected by
//!   the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--debug` selects `debug`, else
/// `info`.
pub fn init(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

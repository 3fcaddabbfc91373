//! Diagnostic tracing for the installer.
//!
//! Operator-facing progress goes through `output::TerminalReporter`. This
//! module only wires up `tracing` diagnostics, controlled by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset so diagnostics stay out of
/// the way of the progress spinner. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=metal_os_install=debug metal-os-install --ssh-host 10.0.0.5 ...
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (e.g. in tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

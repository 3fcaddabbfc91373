//! Stable process exit codes.

use crate::domain::{ConfigError, ProvisionError};

/// The VM ran and exited cleanly, or `--version` was printed.
pub const OK: i32 = 0;
/// The workflow aborted in some state (connect, tunnel, or a remote step).
pub const ABORTED: i32 = 1;
/// Flags were missing or failed validation. Matches clap's usage exit code.
pub const USAGE: i32 = 2;
/// The operator pressed Ctrl-C.
pub const INTERRUPTED: i32 = 130;

/// Exit code for an error returned from `Cli::run`.
#[must_use]
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return USAGE;
    }
    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::Cancelled { .. }) => INTERRUPTED,
        _ => ABORTED,
    }
}

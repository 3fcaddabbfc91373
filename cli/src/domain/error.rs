//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use crate::domain::workflow::{WorkflowState, WorkflowStep};

// ── Configuration errors ──────────────────────────────────────────────────────

/// Errors raised while turning CLI flags into a `ProvisionConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    #[error("--qemu-drives must list at least one device (e.g. /dev/sda,/dev/sdb)")]
    NoDrives,

    #[error("--qemu-drives contains an empty entry: '{0}'")]
    EmptyDrive(String),

    #[error("--qemu-cpu must be at least 1")]
    ZeroCpus,

    #[error("invalid --qemu-memory '{0}': expected a size such as 512m or 16g")]
    InvalidMemory(String),

    #[error("invalid --os-iso-url '{0}': expected an http, https or ftp URL")]
    InvalidIsoUrl(String),

    #[error("--ssh-work-dir must be an absolute path (got '{0}')")]
    RelativeWorkDir(String),

    #[error("invalid --ssh-tunnel-mode '{0}': expected 'shared' or 'dial'")]
    InvalidTunnelMode(String),

    #[error("no SSH credentials provided: pass --ssh-private-key or --ssh-password")]
    MissingCredentials,
}

// ── Transport errors ──────────────────────────────────────────────────────────

/// Errors establishing the authenticated SSH transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unable to connect to {host}: {reason}")]
    ConnectionFailure { host: String, reason: String },

    #[error("connection to {host} timed out after {secs}s")]
    ConnectTimedOut { host: String, secs: u64 },

    #[error("server rejected {method} authentication for user '{user}'")]
    AuthenticationFailure { user: String, method: &'static str },

    #[error("unable to load private key {path}: {reason}")]
    InvalidKey { path: String, reason: String },
}

// ── Remote command errors ─────────────────────────────────────────────────────

/// Errors running one command on an established transport.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unable to start new session: {0}")]
    SessionUnavailable(String),

    #[error("{reason}{}", stderr_suffix(.stderr))]
    CommandFailed { reason: String, stderr: String },

    #[error("remote command timed out after {secs}s")]
    TimedOut { secs: u64 },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

// ── Tunnel errors ─────────────────────────────────────────────────────────────

/// Errors raised by the tunnel relay.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("unable to listen on {addr}: {reason}")]
    ListenFailure { addr: String, reason: String },

    #[error("unable to open channel to {target}: {reason}")]
    ChannelFailure { target: String, reason: String },

    #[error("tunnel connection from {peer} dropped: {reason}")]
    Relay { peer: String, reason: String },
}

// ── Workflow errors ───────────────────────────────────────────────────────────

/// Terminal failure of the provisioning workflow. Each variant maps to the
/// `Aborted` state reached from exactly one non-terminal state.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Connect(TransportError),

    #[error("unable to create SSH tunnel: {0}")]
    Tunnel(TunnelError),

    #[error("{}: {source}", .step.failure())]
    Step { step: WorkflowStep, source: ExecError },

    #[error("interrupted by operator during {state}")]
    Cancelled { state: WorkflowState },
}

impl ProvisionError {
    /// The workflow state that was active when the run aborted.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        match self {
            Self::Connect(TransportError::AuthenticationFailure { .. }) => {
                WorkflowState::Authenticate
            }
            Self::Connect(_) => WorkflowState::Connect,
            Self::Tunnel(_) => WorkflowState::TunnelUp,
            Self::Step { step, .. } => step.state(),
            Self::Cancelled { state } => *state,
        }
    }
}

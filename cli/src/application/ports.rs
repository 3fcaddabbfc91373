//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::{Endpoint, ExecError, TransportError, TunnelError};

// ── Remote Command Port ───────────────────────────────────────────────────────

/// Runs one command on the remote host.
#[allow(async_fn_in_trait)]
pub trait RemoteExecutor {
    /// Open a session, run `command` to completion and release the session.
    ///
    /// # Errors
    ///
    /// `SessionUnavailable` when no session can be opened, `CommandFailed`
    /// when the command exits unsuccessfully, `TimedOut` when `timeout`
    /// elapses first.
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<(), ExecError>;
}

// ── Tunnel Channel Port ───────────────────────────────────────────────────────

/// Opens byte streams to a fixed remote address on behalf of the relay.
///
/// Futures must be `Send`: the relay drives each connection on its own
/// spawned task.
pub trait ChannelOpener: Send + Sync + 'static {
    /// Remote end of one relayed connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a channel to `target`. `originator` is the local peer that
    /// triggered it, reported to the SSH server.
    fn open_channel(
        &self,
        target: &Endpoint,
        originator: SocketAddr,
    ) -> impl Future<Output = Result<Self::Stream, TunnelError>> + Send;
}

// ── Transport Ports ───────────────────────────────────────────────────────────

/// Shutdown for an established transport.
#[allow(async_fn_in_trait)]
pub trait TransportLifecycle {
    /// Disconnect. Open channels are torn down with it.
    async fn close(&self);
}

/// Establishes the authenticated transport the workflow runs on.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// The established connection: runs commands and opens tunnel channels.
    type Transport: RemoteExecutor + ChannelOpener + TransportLifecycle;
    /// Channel source that dials a fresh transport per tunnel connection.
    type Dialer: ChannelOpener;

    /// Dial and authenticate.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the host is unreachable, the deadline
    /// passes, or authentication is rejected.
    async fn connect(&self) -> Result<Self::Transport, TransportError>;

    /// A channel source independent of any existing transport.
    fn dialer(&self) -> Self::Dialer;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
}

//! Application service: local tunnel relay.
//!
//! Owns the local listening socket. Every accepted connection gets its own
//! task and its own channel from the injected `ChannelOpener`; connections
//! share nothing with each other.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::application::ports::ChannelOpener;
use crate::domain::{Endpoint, TunnelEndpoints, TunnelError};

/// Pause after a failed `accept` (e.g. out of file descriptors) so the loop
/// does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bytes moved over one relayed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Local client → remote target.
    pub to_remote: u64,
    /// Remote target → local client.
    pub to_local: u64,
}

/// A bound tunnel listener. Binding happens before the relay task is
/// spawned, so once `bind` returns the tunnel accepts connections.
pub struct TunnelRelay {
    listener: TcpListener,
    target: Endpoint,
}

impl TunnelRelay {
    /// Bind the local end of the tunnel.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::ListenFailure` if the address cannot be bound.
    pub async fn bind(endpoints: &TunnelEndpoints) -> Result<Self, TunnelError> {
        let addr = endpoints.local.to_string();
        let listener =
            TcpListener::bind(addr.as_str())
                .await
                .map_err(|e| TunnelError::ListenFailure {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;
        info!(local = %addr, remote = %endpoints.remote, "tunnel listening");
        Ok(Self {
            listener,
            target: endpoints.remote.clone(),
        })
    }

    /// Address the listener is actually bound to (resolves port `0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, relaying each through a channel from
    /// `opener`. Stops only when the task running it is aborted.
    pub async fn serve<O: ChannelOpener>(self, opener: Arc<O>) {
        let Self { listener, target } = self;
        let target = Arc::new(target);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "tunnel connection accepted");
                    let opener = Arc::clone(&opener);
                    let target = Arc::clone(&target);
                    tokio::spawn(async move {
                        match relay_connection(opener.as_ref(), stream, peer, &target).await {
                            Ok(stats) => debug!(
                                %peer,
                                to_remote = stats.to_remote,
                                to_local = stats.to_local,
                                "tunnel connection closed"
                            ),
                            Err(e @ TunnelError::Relay { .. }) => debug!("{e}"),
                            Err(e) => warn!("{e}"),
                        }
                    });
                }
                Err(e) => {
                    warn!("tunnel accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Relay one accepted connection until both directions reach end-of-stream.
///
/// If the remote channel cannot be opened, the local socket is shut down and
/// the error returned; nothing else is affected.
///
/// # Errors
///
/// `ChannelFailure` when the channel cannot be opened, `Relay` when either
/// side fails mid-stream.
pub async fn relay_connection<O: ChannelOpener>(
    opener: &O,
    mut local: TcpStream,
    peer: SocketAddr,
    target: &Endpoint,
) -> Result<RelayStats, TunnelError> {
    let mut remote = match opener.open_channel(target, peer).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = local.shutdown().await;
            return Err(e);
        }
    };

    match tokio::io::copy_bidirectional(&mut local, &mut remote).await {
        Ok((to_remote, to_local)) => Ok(RelayStats {
            to_remote,
            to_local,
        }),
        Err(e) => Err(TunnelError::Relay {
            peer: peer.to_string(),
            reason: e.to_string(),
        }),
    }
}

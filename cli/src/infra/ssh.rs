//! Infrastructure implementation of the transport ports over `russh`.
//!
//! `SshConnector` dials and authenticates, `SshTransport` runs commands and
//! opens `direct-tcpip` channels on one shared session, and `SshDialer`
//! dials a dedicated session per tunnel channel.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, load_secret_key};
use russh::{Channel, ChannelMsg, ChannelStream, Disconnect};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, trace, warn};

use crate::application::ports::{
    ChannelOpener, Connector, RemoteExecutor, TransportLifecycle,
};
use crate::domain::{AuthMethod, ConnectionParams, Endpoint, ExecError, TransportError, TunnelError};

/// Remote stderr kept for error messages. Older bytes are dropped.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Keepalive for long-running sessions (the VM launch holds one open for
/// hours while the operator installs).
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ── Client handler ───────────────────────────────────────────────────────────

/// russh callbacks. Host keys are accepted without verification and only
/// logged; the target is typically a freshly booted rescue system whose key
/// is not known in advance.
pub struct ClientHandler {
    host: String,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting unverified host key"
        );
        Ok(true)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────────

/// Auth material resolved up front, so a bad key file fails before any
/// network traffic.
#[derive(Clone)]
enum Identity {
    Key(Arc<PrivateKey>),
    Password(String),
}

impl Identity {
    fn load(auth: &AuthMethod) -> Result<Self, TransportError> {
        match auth {
            AuthMethod::PrivateKey { path, passphrase } => {
                info!(path = %path.display(), "loading provided SSH private key");
                let key = load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                    TransportError::InvalidKey {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Self::Key(Arc::new(key)))
            }
            AuthMethod::Password(password) => {
                info!("using provided SSH password");
                Ok(Self::Password(password.clone()))
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Key(_) => "public key",
            Self::Password(_) => "password",
        }
    }
}

// ── Connector ────────────────────────────────────────────────────────────────

/// Dials and authenticates SSH sessions for one set of `ConnectionParams`.
#[derive(Clone)]
pub struct SshConnector {
    target: Endpoint,
    user: String,
    identity: Identity,
    connect_timeout: Duration,
}

impl SshConnector {
    /// Build a connector, loading the private key if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidKey` if the key cannot be read or
    /// decrypted.
    pub fn new(params: &ConnectionParams, connect_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            target: params.target.clone(),
            user: params.user.clone(),
            identity: Identity::load(&params.auth)?,
            connect_timeout,
        })
    }

    /// Dial, then authenticate, under the connect deadline.
    async fn dial(&self) -> Result<Handle<ClientHandler>, TransportError> {
        let host = self.target.to_string();
        tokio::time::timeout(self.connect_timeout, self.dial_unbounded())
            .await
            .map_err(|_| TransportError::ConnectTimedOut {
                host,
                secs: self.connect_timeout.as_secs(),
            })?
    }

    async fn dial_unbounded(&self) -> Result<Handle<ClientHandler>, TransportError> {
        let host = self.target.to_string();
        let failure = |e: russh::Error| TransportError::ConnectionFailure {
            host: host.clone(),
            reason: e.to_string(),
        };

        let config = Arc::new(client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });
        let handler = ClientHandler {
            host: host.clone(),
        };
        debug!(%host, "dialing");
        let mut handle = client::connect(config, (self.target.host.as_str(), self.target.port), handler)
            .await
            .map_err(failure)?;

        debug!(%host, user = %self.user, method = self.identity.label(), "authenticating");
        let result = match &self.identity {
            Identity::Key(key) => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(failure)?
                    .flatten();
                handle
                    .authenticate_publickey(
                        self.user.clone(),
                        PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                    )
                    .await
            }
            Identity::Password(password) => {
                handle
                    .authenticate_password(self.user.clone(), password.clone())
                    .await
            }
        }
        .map_err(failure)?;

        if !result.success() {
            return Err(TransportError::AuthenticationFailure {
                user: self.user.clone(),
                method: self.identity.label(),
            });
        }
        Ok(handle)
    }
}

impl Connector for SshConnector {
    type Transport = SshTransport;
    type Dialer = SshDialer;

    async fn connect(&self) -> Result<SshTransport, TransportError> {
        let handle = self.dial().await?;
        info!(host = %self.target, user = %self.user, "SSH transport established");
        Ok(SshTransport { handle })
    }

    fn dialer(&self) -> SshDialer {
        SshDialer {
            connector: self.clone(),
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// One authenticated SSH session. Channels are multiplexed on it, so it is
/// shared by the workflow and the tunnel relay behind an `Arc`.
pub struct SshTransport {
    handle: Handle<ClientHandler>,
}

impl RemoteExecutor for SshTransport {
    async fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<(), ExecError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::SessionUnavailable(e.to_string()))?;

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, run_to_completion(&mut channel, command))
                .await
                .unwrap_or(Err(ExecError::TimedOut {
                    secs: limit.as_secs(),
                })),
            None => run_to_completion(&mut channel, command).await,
        };

        // The server may already have closed its side.
        let _ = channel.close().await;
        outcome
    }
}

impl ChannelOpener for SshTransport {
    type Stream = ChannelStream<Msg>;

    async fn open_channel(
        &self,
        target: &Endpoint,
        originator: SocketAddr,
    ) -> Result<Self::Stream, TunnelError> {
        let channel = open_direct_tcpip(&self.handle, target, originator).await?;
        Ok(channel.into_stream())
    }
}

impl TransportLifecycle for SshTransport {
    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "provisioning finished", "en")
            .await
        {
            debug!("disconnect: {e}");
        }
    }
}

async fn open_direct_tcpip(
    handle: &Handle<ClientHandler>,
    target: &Endpoint,
    originator: SocketAddr,
) -> Result<Channel<Msg>, TunnelError> {
    handle
        .channel_open_direct_tcpip(
            target.host.clone(),
            u32::from(target.port),
            originator.ip().to_string(),
            u32::from(originator.port()),
        )
        .await
        .map_err(|e| TunnelError::ChannelFailure {
            target: target.to_string(),
            reason: e.to_string(),
        })
}

/// Send the exec request and drain the channel until the server closes it.
async fn run_to_completion(channel: &mut Channel<Msg>, command: &str) -> Result<(), ExecError> {
    channel
        .exec(true, command)
        .await
        .map_err(|e| ExecError::CommandFailed {
            reason: format!("exec request failed: {e}"),
            stderr: String::new(),
        })?;

    let mut stderr = StderrTail::default();
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => {
                trace!(target: "remote::stdout", "{}", String::from_utf8_lossy(data).trim_end());
            }
            ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                trace!(target: "remote::stderr", "{}", String::from_utf8_lossy(data).trim_end());
                stderr.push(data);
            }
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            ChannelMsg::ExitSignal { signal_name, .. } => {
                return Err(ExecError::CommandFailed {
                    reason: format!("killed by signal {signal_name:?}"),
                    stderr: stderr.into_string(),
                });
            }
            ChannelMsg::Failure => {
                return Err(ExecError::CommandFailed {
                    reason: "server refused to execute the command".to_string(),
                    stderr: stderr.into_string(),
                });
            }
            _ => {}
        }
    }

    match exit_status {
        Some(0) => Ok(()),
        Some(code) => Err(ExecError::CommandFailed {
            reason: format!("exit status {code}"),
            stderr: stderr.into_string(),
        }),
        None => Err(ExecError::CommandFailed {
            reason: "channel closed without an exit status".to_string(),
            stderr: stderr.into_string(),
        }),
    }
}

/// Bounded buffer keeping the last `STDERR_TAIL_BYTES` of remote stderr.
#[derive(Default)]
struct StderrTail {
    buf: Vec<u8>,
}

impl StderrTail {
    fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > STDERR_TAIL_BYTES {
            let excess = self.buf.len() - STDERR_TAIL_BYTES;
            self.buf.drain(..excess);
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

// ── Dialer ───────────────────────────────────────────────────────────────────

/// Tunnel channel source that authenticates a dedicated session for every
/// local connection.
pub struct SshDialer {
    connector: SshConnector,
}

impl ChannelOpener for SshDialer {
    type Stream = DialedChannel;

    async fn open_channel(
        &self,
        target: &Endpoint,
        originator: SocketAddr,
    ) -> Result<Self::Stream, TunnelError> {
        let session = self
            .connector
            .dial()
            .await
            .map_err(|e| TunnelError::ChannelFailure {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        let channel = open_direct_tcpip(&session, target, originator).await?;
        Ok(DialedChannel {
            stream: channel.into_stream(),
            _session: session,
        })
    }
}

/// A channel stream that keeps its dedicated session alive.
pub struct DialedChannel {
    stream: ChannelStream<Msg>,
    _session: Handle<ClientHandler>,
}

impl AsyncRead for DialedChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for DialedChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

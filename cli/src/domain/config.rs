//! Domain types and validators for the provisioning configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access. The CLI
//! layer collects raw flag values; everything here turns them into the
//! immutable `ProvisionConfig` the rest of the program is handed.

use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::domain::error::ConfigError;
use crate::domain::qemu::{Firmware, QemuSpec};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const ISO_FILE_NAME: &str = "os.iso";

/// QEMU `-m` size: a number with an optional binary-unit suffix.
pub static MEMORY_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // Pattern is a compile-time constant
    Regex::new(r"^[0-9]+[kKmMgGtT]?$").expect("valid regex")
});

const ISO_URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://"];

// ── Endpoint ─────────────────────────────────────────────────────────────────

/// A `host:port` pair. IPv6 literals are written in brackets (`[::1]:22`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port`, or a bare host when `default_port` is given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` when the host is empty, the
    /// port is missing (and no default applies) or not a valid `u16`.
    pub fn parse(input: &str, default_port: Option<u16>) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidEndpoint(input.to_string());
        let input_trimmed = input.trim();

        if let Some(rest) = input_trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| invalid())?,
                None if tail.is_empty() => default_port.ok_or_else(invalid)?,
                None => return Err(invalid()),
            };
            host.parse::<Ipv6Addr>().map_err(|_| invalid())?;
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        if input_trimmed.parse::<Ipv6Addr>().is_ok() {
            let port = default_port.ok_or_else(invalid)?;
            return Ok(Self {
                host: input_trimmed.to_string(),
                port,
            });
        }

        let (host, port) = match input_trimmed.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (input_trimmed, default_port.ok_or_else(invalid)?),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ── Connection parameters ────────────────────────────────────────────────────

/// How the SSH user authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Private key file, with an optional passphrase.
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
    Password(String),
}

impl AuthMethod {
    /// Pick the authentication method from the supplied material.
    ///
    /// A private key wins over a password when both are present. Empty
    /// strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredentials` when neither is supplied.
    pub fn select(
        private_key: Option<PathBuf>,
        passphrase: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = private_key.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self::PrivateKey {
                path,
                passphrase: passphrase.filter(|p| !p.is_empty()),
            });
        }
        match password.filter(|p| !p.is_empty()) {
            Some(password) => Ok(Self::Password(password)),
            None => Err(ConfigError::MissingCredentials),
        }
    }

    /// Short label for logs and error messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::PrivateKey { .. } => "public key",
            Self::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Everything needed to dial and authenticate the SSH transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub target: Endpoint,
    pub user: String,
    pub auth: AuthMethod,
}

// ── Tunnel ───────────────────────────────────────────────────────────────────

/// Local listen address and the remote address it forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEndpoints {
    pub local: Endpoint,
    pub remote: Endpoint,
}

/// Where the relay gets its SSH channels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelMode {
    /// Dial and authenticate a fresh transport for every local connection.
    #[default]
    Dial,
    /// Open channels on the workflow's own transport.
    Shared,
}

impl FromStr for TunnelMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "dial" => Ok(Self::Dial),
            _ => Err(ConfigError::InvalidTunnelMode(s.to_string())),
        }
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Dial => "dial",
        })
    }
}

// ── VM settings ──────────────────────────────────────────────────────────────

/// Resources for the rescue VM, before the boot image path is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSettings {
    pub cpus: u32,
    pub memory: String,
    pub firmware: Firmware,
    pub drives: Vec<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Immutable configuration for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub connection: ConnectionParams,
    pub tunnel: TunnelEndpoints,
    pub tunnel_mode: TunnelMode,
    /// Remote working directory, without trailing slash.
    pub work_dir: String,
    pub iso_url: String,
    /// Trusted operator input, executed verbatim.
    pub packages_command: String,
    pub vm: VmSettings,
    pub connect_timeout: Duration,
    /// Deadline for every step except the VM launch.
    pub command_timeout: Option<Duration>,
}

impl ProvisionConfig {
    /// Remote path the installer image is downloaded to.
    #[must_use]
    pub fn iso_path(&self) -> String {
        format!("{}/{ISO_FILE_NAME}", self.work_dir.trim_end_matches('/'))
    }

    /// QEMU launch parameters for this run.
    #[must_use]
    pub fn qemu_spec(&self) -> QemuSpec {
        QemuSpec {
            boot_image: self.iso_path(),
            cpus: self.vm.cpus,
            memory: self.vm.memory.clone(),
            firmware: self.vm.firmware,
            drives: self.vm.drives.clone(),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Split the comma-separated `--qemu-drives` value.
///
/// # Errors
///
/// Returns an error if the list is empty or has an empty entry.
pub fn parse_drive_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::NoDrives);
    }
    raw.split(',')
        .map(|d| {
            let d = d.trim();
            if d.is_empty() {
                Err(ConfigError::EmptyDrive(raw.to_string()))
            } else {
                Ok(d.to_string())
            }
        })
        .collect()
}

/// Validate a QEMU memory size such as `512m`, `16G` or `2048`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidMemory` for anything else.
pub fn validate_memory(value: &str) -> Result<(), ConfigError> {
    if MEMORY_SIZE_RE.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidMemory(value.to_string()))
    }
}

/// Validate a vCPU count.
///
/// # Errors
///
/// Returns `ConfigError::ZeroCpus` for zero.
pub fn validate_cpus(cpus: u32) -> Result<(), ConfigError> {
    if cpus == 0 {
        return Err(ConfigError::ZeroCpus);
    }
    Ok(())
}

/// Validate the installer image URL scheme.
///
/// # Errors
///
/// Returns `ConfigError::InvalidIsoUrl` if the URL has no supported scheme
/// or nothing after it.
pub fn validate_iso_url(url: &str) -> Result<(), ConfigError> {
    let lower = url.to_ascii_lowercase();
    let ok = ISO_URL_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme) && url.len() > scheme.len());
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidIsoUrl(url.to_string()))
    }
}

/// Normalise the remote working directory: absolute, no trailing slash.
///
/// # Errors
///
/// Returns `ConfigError::RelativeWorkDir` for relative paths.
pub fn normalize_work_dir(raw: &str) -> Result<String, ConfigError> {
    if !raw.starts_with('/') {
        return Err(ConfigError::RelativeWorkDir(raw.to_string()));
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────

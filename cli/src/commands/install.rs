//! Install command: provision a bare-metal host through an SSH-driven rescue VM.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args};
use tracing::warn;

use crate::application::services::provision::{ProvisionOptions, provision};
use crate::domain::config::{
    DEFAULT_SSH_PORT, normalize_work_dir, parse_drive_list, validate_cpus, validate_iso_url,
    validate_memory,
};
use crate::domain::workflow::plan;
use crate::domain::{
    AuthMethod, ConfigError, ConnectionParams, Endpoint, Firmware, ProvisionConfig,
    TunnelEndpoints, TunnelMode, VmSettings, WorkflowState,
};
use crate::infra::SshConnector;
use crate::output::{OutputContext, TerminalReporter};

/// Flags describing one provisioning run.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// SSH user
    #[arg(long, env = "METAL_SSH_USER", default_value = "root")]
    pub ssh_user: String,

    /// SSH password (ignored when --ssh-private-key is set)
    #[arg(long, env = "METAL_SSH_PASSWORD", hide_env_values = true)]
    pub ssh_password: Option<String>,

    /// SSH server address, host[:port]
    #[arg(long, env = "METAL_SSH_HOST")]
    pub ssh_host: String,

    /// Path to an SSH private key
    #[arg(long, env = "METAL_SSH_PRIVATE_KEY")]
    pub ssh_private_key: Option<PathBuf>,

    /// Passphrase for an encrypted --ssh-private-key
    #[arg(long, env = "METAL_SSH_PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
    pub ssh_private_key_passphrase: Option<String>,

    /// URL of the OS installer ISO
    #[arg(long, env = "METAL_OS_ISO_URL")]
    pub os_iso_url: String,

    /// Remote working directory
    #[arg(long, env = "METAL_SSH_WORK_DIR", default_value = "/tmp/os-install")]
    pub ssh_work_dir: String,

    /// Block devices handed to the VM, comma separated (e.g. /dev/sda,/dev/sdb)
    #[arg(long, env = "METAL_QEMU_DRIVES")]
    pub qemu_drives: String,

    /// Number of virtual CPUs
    #[arg(long, env = "METAL_QEMU_CPU", default_value_t = 1)]
    pub qemu_cpu: u32,

    /// VM memory size (e.g. 512m, 16g)
    #[arg(long, env = "METAL_QEMU_MEMORY", default_value = "512m")]
    pub qemu_memory: String,

    /// Command that installs curl, QEMU and OVMF on the remote host
    #[arg(
        long,
        env = "METAL_PACKAGES_INSTALL_COMMAND",
        default_value = "apt-get install -y curl qemu-system-x86 ovmf"
    )]
    pub packages_install_command: String,

    /// Local end of the VNC tunnel
    #[arg(long, env = "METAL_SSH_TUNNEL_LOCAL_ENDPOINT", default_value = "127.0.0.1:53001")]
    pub ssh_tunnel_local_endpoint: String,

    /// Remote address the tunnel forwards to
    #[arg(long, env = "METAL_SSH_TUNNEL_REMOTE_ENDPOINT", default_value = "127.0.0.1:5901")]
    pub ssh_tunnel_remote_endpoint: String,

    /// Where tunnel channels come from: dial (a fresh SSH connection per viewer) or shared (the workflow's connection)
    #[arg(long, env = "METAL_SSH_TUNNEL_MODE", default_value_t = TunnelMode::Dial)]
    pub ssh_tunnel_mode: TunnelMode,

    /// Boot the VM with UEFI firmware (true/false; a bare flag means true)
    #[arg(
        long,
        env = "METAL_USE_UEFI",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub use_uefi: bool,

    /// Seconds allowed for connecting and authenticating
    #[arg(long, env = "METAL_CONNECT_TIMEOUT", default_value_t = 30)]
    pub connect_timeout: u64,

    /// Seconds allowed for each remote step except the VM launch
    #[arg(long, env = "METAL_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,
}

impl InstallArgs {
    /// A private key takes precedence, so a password given alongside one is
    /// never sent.
    #[must_use]
    pub fn password_ignored(&self) -> bool {
        self.ssh_private_key.is_some() && self.ssh_password.is_some()
    }

    /// Validate the flags and freeze them into a `ProvisionConfig`.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found. Nothing touches the network.
    pub fn into_config(self) -> Result<ProvisionConfig, ConfigError> {
        let auth = AuthMethod::select(
            self.ssh_private_key,
            self.ssh_private_key_passphrase,
            self.ssh_password,
        )?;
        let target = Endpoint::parse(&self.ssh_host, Some(DEFAULT_SSH_PORT))?;
        let tunnel = TunnelEndpoints {
            local: self.ssh_tunnel_local_endpoint.parse()?,
            remote: self.ssh_tunnel_remote_endpoint.parse()?,
        };

        validate_iso_url(&self.os_iso_url)?;
        validate_cpus(self.qemu_cpu)?;
        validate_memory(&self.qemu_memory)?;
        let drives = parse_drive_list(&self.qemu_drives)?;
        let work_dir = normalize_work_dir(&self.ssh_work_dir)?;

        Ok(ProvisionConfig {
            connection: ConnectionParams {
                target,
                user: self.ssh_user,
                auth,
            },
            tunnel,
            tunnel_mode: self.ssh_tunnel_mode,
            work_dir,
            iso_url: self.os_iso_url,
            packages_command: self.packages_install_command,
            vm: VmSettings {
                cpus: self.qemu_cpu,
                memory: self.qemu_memory,
                firmware: Firmware::from_uefi_flag(self.use_uefi),
                drives,
            },
            connect_timeout: Duration::from_secs(self.connect_timeout),
            command_timeout: self.command_timeout.map(Duration::from_secs),
        })
    }
}

/// Entry point for the install workflow.
///
/// Runs until the remote VM exits, the workflow aborts, or `shutdown`
/// resolves.
///
/// # Errors
///
/// Returns the key-loading `TransportError` or the `ProvisionError` that
/// aborted the run.
pub async fn run<F>(ctx: &OutputContext, config: &ProvisionConfig, shutdown: F) -> Result<WorkflowState>
where
    F: Future<Output = ()>,
{
    print_summary(ctx, config);

    let connector = SshConnector::new(&config.connection, config.connect_timeout)?;
    let reporter = TerminalReporter::new(ctx);
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &config.tunnel,
        tunnel_mode: config.tunnel_mode,
        steps: plan(config),
    };

    let outcome = provision(&connector, opts, shutdown).await;
    if outcome.is_err() {
        reporter.fail();
    }
    outcome.map_err(anyhow::Error::from)
}

fn print_summary(ctx: &OutputContext, config: &ProvisionConfig) {
    let conn = &config.connection;
    ctx.kv("target", &format!("{}@{}", conn.user, conn.target));
    ctx.kv("auth", conn.auth.label());
    ctx.kv("image", &config.iso_url);
    ctx.kv("drives", &config.vm.drives.join(", "));
    let firmware = match config.vm.firmware {
        Firmware::Uefi => "UEFI",
        Firmware::Legacy => "legacy BIOS",
    };
    ctx.kv(
        "vm",
        &format!("{} cpu, {} memory, {firmware}", config.vm.cpus, config.vm.memory),
    );
    ctx.kv("vnc", &config.tunnel.local.to_string());
}

/// Resolve on the first Ctrl-C. If the handler cannot be installed the
/// future never resolves and the run simply cannot be interrupted.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("unable to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

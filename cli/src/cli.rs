//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};

use crate::commands;
use crate::commands::install::InstallArgs;
use crate::domain::WorkflowState;
use crate::output::OutputContext;

/// Install an operating system on a bare-metal server from its rescue system.
///
/// Connects over SSH, downloads the installer ISO, and boots it in a QEMU VM
/// that owns the server's disks. The VM console is forwarded to a local VNC
/// port through the SSH connection.
#[derive(Parser, Debug)]
#[command(name = "metal-os-install", version, disable_version_flag = true)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)] // clap exits before the value is ever read
    version: Option<bool>,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output (also set by a truthy `NO_COLOR`)
    #[arg(
        long,
        env = "NO_COLOR",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub no_color: bool,

    #[command(flatten)]
    pub install: InstallArgs,
}

impl Cli {
    /// Validate the flags and run the install workflow.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for invalid flags, otherwise whatever aborted
    /// the workflow.
    pub async fn run(self, ctx: &OutputContext) -> Result<WorkflowState> {
        if self.install.password_ignored() {
            ctx.warn("--ssh-password is ignored because --ssh-private-key is set");
        }
        let config = self.install.into_config()?;
        commands::install::run(ctx, &config, commands::install::ctrl_c()).await
    }
}

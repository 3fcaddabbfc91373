//! Provisioning workflow: states, steps and the remote commands they run.
//!
//! Steps are data. The driver in `application::services::provision` walks
//! the list returned by `plan` in order and stops at the first failure.

use std::fmt;
use std::time::Duration;

use shell_escape::unix::escape;

use crate::domain::config::ProvisionConfig;

/// States of one provisioning run. `Aborted` is not listed: it is reached
/// through `ProvisionError`, which records the state it aborted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Connect,
    Authenticate,
    TunnelUp,
    EnsureWorkDir,
    InstallPackages,
    DownloadImage,
    LaunchVirtualization,
    Done,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Authenticate => "authenticate",
            Self::TunnelUp => "tunnel-up",
            Self::EnsureWorkDir => "ensure-work-dir",
            Self::InstallPackages => "install-packages",
            Self::DownloadImage => "download-image",
            Self::LaunchVirtualization => "launch-virtualization",
            Self::Done => "done",
        })
    }
}

/// One remote-command step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    EnsureWorkDir,
    InstallPackages,
    DownloadImage,
    LaunchVirtualization,
}

impl WorkflowStep {
    pub const ALL: [Self; 4] = [
        Self::EnsureWorkDir,
        Self::InstallPackages,
        Self::DownloadImage,
        Self::LaunchVirtualization,
    ];

    /// Matching workflow state.
    #[must_use]
    pub fn state(self) -> WorkflowState {
        match self {
            Self::EnsureWorkDir => WorkflowState::EnsureWorkDir,
            Self::InstallPackages => WorkflowState::InstallPackages,
            Self::DownloadImage => WorkflowState::DownloadImage,
            Self::LaunchVirtualization => WorkflowState::LaunchVirtualization,
        }
    }

    /// Operator-facing progress message.
    #[must_use]
    pub fn progress(self) -> &'static str {
        match self {
            Self::EnsureWorkDir => "ensuring working dir exists on the remote server...",
            Self::InstallPackages => "ensuring packages are installed...",
            Self::DownloadImage => "downloading OS ISO, please be patient...",
            Self::LaunchVirtualization => "starting QEMU VM...",
        }
    }

    /// What went wrong when this step does not succeed.
    #[must_use]
    pub fn failure(self) -> &'static str {
        match self {
            Self::EnsureWorkDir => "unable to create working dir",
            Self::InstallPackages => "unable to install packages",
            Self::DownloadImage => "unable to download OS ISO",
            Self::LaunchVirtualization => "unable to start QEMU VM",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state().fmt(f)
    }
}

/// A step paired with the exact command it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub step: WorkflowStep,
    pub command: String,
    /// `None` waits for the command however long it takes.
    pub timeout: Option<Duration>,
}

/// Build the fixed step sequence for `config`.
///
/// The VM launch never gets a timeout: it only returns when the VM shuts
/// down.
#[must_use]
pub fn plan(config: &ProvisionConfig) -> Vec<StepCommand> {
    WorkflowStep::ALL
        .into_iter()
        .map(|step| StepCommand {
            step,
            command: command_for(step, config),
            timeout: match step {
                WorkflowStep::LaunchVirtualization => None,
                _ => config.command_timeout,
            },
        })
        .collect()
}

fn command_for(step: WorkflowStep, config: &ProvisionConfig) -> String {
    match step {
        WorkflowStep::EnsureWorkDir => {
            format!("mkdir -p {}", escape(config.work_dir.as_str().into()))
        }
        WorkflowStep::InstallPackages => config.packages_command.clone(),
        WorkflowStep::DownloadImage => format!(
            "curl -fSL -o {} {}",
            escape(config.iso_path().into()),
            escape(config.iso_url.as_str().into())
        ),
        WorkflowStep::LaunchVirtualization => config.qemu_spec().invocation(),
    }
}

//! Application service: the provisioning workflow driver.
//!
//! Imports only from `crate::domain` and `crate::application`. All I/O is
//! routed through injected port traits, so the whole state machine runs
//! against fakes in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::ports::{Connector, ProgressReporter, RemoteExecutor, TransportLifecycle};
use crate::application::services::tunnel::TunnelRelay;
use crate::domain::{
    ProvisionError, StepCommand, TunnelEndpoints, TunnelMode, WorkflowState, WorkflowStep,
};

pub struct ProvisionOptions<'a, R: ProgressReporter> {
    pub reporter: &'a R,
    pub tunnel: &'a TunnelEndpoints,
    pub tunnel_mode: TunnelMode,
    /// Steps in execution order, normally `domain::workflow::plan(config)`.
    pub steps: Vec<StepCommand>,
}

/// Run the workflow: connect, bring the tunnel up, then every step in
/// order.
///
/// The driver owns the transport. It disconnects it, after stopping the
/// relay, once the run reaches `Done` or aborts. `shutdown` resolving at
/// any point aborts the run with `ProvisionError::Cancelled`.
///
/// # Errors
///
/// Returns the `ProvisionError` for the first state that fails; no later
/// state is attempted.
pub async fn provision<C, R, F>(
    connector: &C,
    opts: ProvisionOptions<'_, R>,
    shutdown: F,
) -> Result<WorkflowState, ProvisionError>
where
    C: Connector,
    R: ProgressReporter,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let reporter = opts.reporter;

    enter(WorkflowState::Connect);
    reporter.step("establishing a connection to the server...");
    let transport = tokio::select! {
        result = connector.connect() => Arc::new(result.map_err(ProvisionError::Connect)?),
        () = &mut shutdown => {
            return Err(ProvisionError::Cancelled { state: WorkflowState::Connect });
        }
    };
    reporter.success("connected");

    let outcome = run_on_transport(connector, &transport, opts, shutdown).await;

    transport.close().await;
    debug!("transport closed");
    outcome
}

async fn run_on_transport<C, R, F>(
    connector: &C,
    transport: &Arc<C::Transport>,
    opts: ProvisionOptions<'_, R>,
    mut shutdown: Pin<&mut F>,
) -> Result<WorkflowState, ProvisionError>
where
    C: Connector,
    R: ProgressReporter,
    F: Future<Output = ()>,
{
    let ProvisionOptions {
        reporter,
        tunnel,
        tunnel_mode,
        steps,
    } = opts;

    enter(WorkflowState::TunnelUp);
    reporter.step("creating SSH port-forwarding for VNC...");
    let relay = TunnelRelay::bind(tunnel)
        .await
        .map_err(ProvisionError::Tunnel)?;
    let listening = relay
        .local_addr()
        .map_or_else(|_| tunnel.local.to_string(), |addr| addr.to_string());
    let relay_task = match tunnel_mode {
        TunnelMode::Shared => tokio::spawn(relay.serve(Arc::clone(transport))),
        TunnelMode::Dial => tokio::spawn(relay.serve(Arc::new(connector.dialer()))),
    };
    reporter.success(&format!(
        "tunnel ready: {listening} -> {} ({tunnel_mode} channels)",
        tunnel.remote
    ));

    let outcome = run_steps(
        transport.as_ref(),
        &steps,
        reporter,
        &listening,
        &mut shutdown,
    )
    .await;

    relay_task.abort();
    outcome
}

async fn run_steps<T, R, F>(
    transport: &T,
    steps: &[StepCommand],
    reporter: &R,
    listening: &str,
    shutdown: &mut Pin<&mut F>,
) -> Result<WorkflowState, ProvisionError>
where
    T: RemoteExecutor,
    R: ProgressReporter,
    F: Future<Output = ()>,
{
    for cmd in steps {
        let state = cmd.step.state();
        enter(state);
        if cmd.step == WorkflowStep::LaunchVirtualization {
            reporter.success(&format!(
                "now you can connect to the VM's VNC display: {listening}"
            ));
        }
        reporter.step(cmd.step.progress());
        debug!(step = %cmd.step, command = %cmd.command, "running remote command");

        tokio::select! {
            result = transport.execute(&cmd.command, cmd.timeout) => {
                result.map_err(|source| ProvisionError::Step { step: cmd.step, source })?;
            }
            () = shutdown.as_mut() => {
                return Err(ProvisionError::Cancelled { state });
            }
        }
    }

    enter(WorkflowState::Done);
    reporter.success("QEMU VM exited, provisioning finished");
    Ok(WorkflowState::Done)
}

fn enter(state: WorkflowState) {
    info!(%state, "workflow state");
}

//! Workflow driver tests against the recording fake transport.

#![allow(clippy::expect_used)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use metal_os_install::application::services::provision::{ProvisionOptions, provision};
use metal_os_install::domain::workflow::plan;
use metal_os_install::domain::{
    ExecError, ProvisionError, TransportError, TunnelError, TunnelMode, WorkflowState,
    WorkflowStep,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::helpers::{ephemeral_tunnel, round_trip, sample_config, wait_for};
use crate::mocks::{FakeConnector, RecordingReporter, Script};

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

#[tokio::test]
async fn runs_every_step_in_order_and_reaches_done() {
    let config = sample_config();
    let expected: Vec<String> = plan(&config).into_iter().map(|s| s.command).collect();
    let connector = FakeConnector::new(Script::default());
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();

    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };
    let state = provision(&connector, opts, never()).await.expect("workflow");

    assert_eq!(state, WorkflowState::Done);
    assert_eq!(connector.transport.command_lines(), expected);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert!(connector.transport.is_closed());
    assert_eq!(
        reporter.events().last().map(String::as_str),
        Some("success: QEMU VM exited, provisioning finished")
    );
}

#[tokio::test]
async fn launch_step_runs_without_deadline() {
    let config = sample_config();
    let connector = FakeConnector::new(Script::default());
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();

    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };
    provision(&connector, opts, never()).await.expect("workflow");

    let timeouts: Vec<Option<Duration>> = connector
        .transport
        .commands
        .lock()
        .expect("commands lock")
        .iter()
        .map(|(_, t)| *t)
        .collect();
    let deadline = Some(Duration::from_secs(600));
    assert_eq!(timeouts, vec![deadline, deadline, deadline, None]);
}

#[tokio::test]
async fn session_unavailable_aborts_the_step() {
    let config = sample_config();
    let connector = FakeConnector::new(Script {
        session_unavailable_at: Some(1),
        ..Script::default()
    });
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };

    let err = provision(&connector, opts, never())
        .await
        .expect_err("missing session must abort");

    assert!(matches!(
        err,
        ProvisionError::Step {
            step: WorkflowStep::InstallPackages,
            source: ExecError::SessionUnavailable(_),
        }
    ));
    assert_eq!(err.state(), WorkflowState::InstallPackages);
    assert!(
        err.to_string()
            .contains("unable to start new session: channel open refused by peer"),
        "got {err}"
    );
    assert_eq!(connector.transport.command_lines().len(), 2);
    assert!(connector.transport.is_closed());
}

#[tokio::test]
async fn failure_at_each_step_stops_the_run_there() {
    let config = sample_config();

    for (index, step) in WorkflowStep::ALL.into_iter().enumerate() {
        let connector = FakeConnector::new(Script {
            fail_at: Some(index),
            ..Script::default()
        });
        let reporter = RecordingReporter::default();
        let tunnel = ephemeral_tunnel();
        let opts = ProvisionOptions {
            reporter: &reporter,
            tunnel: &tunnel,
            tunnel_mode: TunnelMode::Shared,
            steps: plan(&config),
        };

        let err = provision(&connector, opts, never())
            .await
            .expect_err("step failure must abort");

        match &err {
            ProvisionError::Step {
                step: failed,
                source: ExecError::CommandFailed { stderr, .. },
            } => {
                assert_eq!(*failed, step);
                assert!(stderr.contains("simulated failure"));
            }
            other => panic!("unexpected error at {step}: {other:?}"),
        }
        assert_eq!(err.state(), step.state());
        assert!(err.to_string().starts_with(step.failure()));
        assert_eq!(
            connector.transport.command_lines().len(),
            index + 1,
            "no command may run after {step} fails"
        );
        assert!(connector.transport.is_closed());
    }
}

#[tokio::test]
async fn connect_failure_runs_no_commands() {
    let config = sample_config();
    let connector = FakeConnector::refusing(|| TransportError::ConnectionFailure {
        host: "203.0.113.10:22".to_string(),
        reason: "connection refused".to_string(),
    });
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };

    let err = provision(&connector, opts, never())
        .await
        .expect_err("connect must fail");

    assert_eq!(err.state(), WorkflowState::Connect);
    assert!(err.to_string().contains("connection refused"));
    assert!(connector.transport.command_lines().is_empty());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_credentials_abort_in_authenticate() {
    let config = sample_config();
    let connector = FakeConnector::refusing(|| TransportError::AuthenticationFailure {
        user: "root".to_string(),
        method: "password",
    });
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };

    let err = provision(&connector, opts, never())
        .await
        .expect_err("auth must fail");

    assert_eq!(err.state(), WorkflowState::Authenticate);
    assert!(connector.transport.command_lines().is_empty());
}

#[tokio::test]
async fn occupied_tunnel_port_aborts_before_any_step() {
    let squatter = TcpListener::bind("127.0.0.1:0").await.expect("bind squatter");
    let port = squatter.local_addr().expect("addr").port();
    let mut tunnel = ephemeral_tunnel();
    tunnel.local.port = port;

    let config = sample_config();
    let connector = FakeConnector::new(Script::default());
    let reporter = RecordingReporter::default();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };

    let err = provision(&connector, opts, never())
        .await
        .expect_err("bind must fail");

    assert!(matches!(
        err,
        ProvisionError::Tunnel(TunnelError::ListenFailure { .. })
    ));
    assert_eq!(err.state(), WorkflowState::TunnelUp);
    assert!(connector.transport.command_lines().is_empty());
    assert!(connector.transport.is_closed());
}

#[tokio::test]
async fn shutdown_interrupts_the_running_step() {
    let config = sample_config();
    let connector = FakeConnector::new(Script {
        hang_at: Some(2),
        ..Script::default()
    });
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: TunnelMode::Shared,
        steps: plan(&config),
    };

    let (tx, rx) = oneshot::channel::<()>();
    let transport = &connector.transport;
    let (result, ()) = tokio::join!(
        provision(&connector, opts, async {
            let _ = rx.await;
        }),
        async move {
            wait_for(|| (transport.command_lines().len() == 3).then_some(())).await;
            let _ = tx.send(());
        }
    );

    let err = result.expect_err("shutdown must abort");
    assert!(matches!(
        err,
        ProvisionError::Cancelled {
            state: WorkflowState::DownloadImage
        }
    ));
    assert_eq!(connector.transport.command_lines().len(), 3);
    assert!(connector.transport.is_closed());
}

/// Reach the launch step, push bytes through the tunnel while the VM
/// "runs", then interrupt.
async fn relay_during_launch(mode: TunnelMode) -> FakeConnector {
    let config = sample_config();
    let connector = FakeConnector::new(Script {
        hang_at: Some(3),
        ..Script::default()
    });
    let reporter = RecordingReporter::default();
    let tunnel = ephemeral_tunnel();
    let opts = ProvisionOptions {
        reporter: &reporter,
        tunnel: &tunnel,
        tunnel_mode: mode,
        steps: plan(&config),
    };

    let (tx, rx) = oneshot::channel::<()>();
    let reporter_ref = &reporter;
    let (result, ()) = tokio::join!(
        provision(&connector, opts, async {
            let _ = rx.await;
        }),
        async move {
            let addr = wait_for(|| reporter_ref.vnc_address()).await;
            let mut viewer = TcpStream::connect(addr.as_str())
                .await
                .expect("tunnel accepts once announced");
            assert_eq!(round_trip(&mut viewer, b"RFB 003.008\n").await, b"RFB 003.008\n");
            let _ = tx.send(());
        }
    );

    let err = result.expect_err("shutdown must abort");
    assert_eq!(err.state(), WorkflowState::LaunchVirtualization);
    connector
}

#[tokio::test]
async fn shared_mode_relays_over_the_workflow_transport() {
    let connector = relay_during_launch(TunnelMode::Shared).await;
    assert_eq!(connector.transport.channels.load(Ordering::SeqCst), 1);
    assert_eq!(connector.dialer.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dial_mode_relays_over_fresh_connections() {
    let connector = relay_during_launch(TunnelMode::Dial).await;
    assert_eq!(connector.transport.channels.load(Ordering::SeqCst), 0);
    assert_eq!(connector.dialer.opened.load(Ordering::SeqCst), 1);
}

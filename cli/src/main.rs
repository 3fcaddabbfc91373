//! metal-os-install - install an OS on bare metal through an SSH rescue VM

#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use tracing::debug;

use metal_os_install::cli::Cli;
use metal_os_install::domain::ProvisionError;
use metal_os_install::output::OutputContext;
use metal_os_install::{exit_codes, logging};

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let ctx = OutputContext::new(cli.no_color, cli.quiet);

    match cli.run(&ctx).await {
        Ok(state) => debug!(%state, "workflow finished"),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<ProvisionError>() {
                debug!(state = %err.state(), "workflow aborted");
            }
            ctx.error(&e.to_string());
            std::process::exit(exit_codes::for_error(&e));
        }
    }
}

//! `ProgressReporter` for the terminal.

use std::sync::Mutex;

use indicatif::ProgressBar;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Renders workflow progress for the operator.
///
/// On a terminal each step is a spinner: the next step or a success ticks it
/// off with `✓`, and [`fail`](Self::fail) freezes it with `✗`. Without a
/// terminal steps are plain `→` lines. `quiet` silences both.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    running: Mutex<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            running: Mutex::new(None),
        }
    }

    /// Mark the running step, if any, as the one the workflow aborted in.
    pub fn fail(&self) {
        if let Some(pb) = self.take_running() {
            progress::finish_failed(&pb);
        }
    }

    fn complete_running(&self) {
        if let Some(pb) = self.take_running() {
            progress::finish_ok(&pb);
        }
    }

    fn take_running(&self) -> Option<ProgressBar> {
        self.running.lock().ok().and_then(|mut running| running.take())
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if !self.ctx.spinners_enabled() {
            self.ctx.step(message);
            return;
        }
        self.complete_running();
        if let Ok(mut running) = self.running.lock() {
            *running = Some(progress::step_spinner(message));
        }
    }

    fn success(&self, message: &str) {
        self.complete_running();
        self.ctx.success(message);
    }
}

/// A spinner still running when the reporter goes away belongs to a run that
/// never reached its next step.
impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        self.fail();
    }
}

//! Spinners for remote steps of unknown length.

#![allow(clippy::expect_used)] // Templates are compile-time constants

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Braille frames; the trailing blank is the finished frame.
const FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";
const TICK: Duration = Duration::from_millis(100);

/// Start a ticking spinner labelled `msg`, with elapsed time on the right.
#[must_use]
pub fn step_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .expect("valid template")
            .tick_chars(FRAMES),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// Freeze the spinner as a completed step, keeping its message.
pub fn finish_ok(pb: &ProgressBar) {
    freeze(pb, "  {prefix:.green} {msg}", "✓");
}

/// Freeze the spinner as the step the run died in.
pub fn finish_failed(pb: &ProgressBar) {
    freeze(pb, "  {prefix:.red.bold} {msg}", "✗");
}

fn freeze(pb: &ProgressBar, template: &str, mark: &'static str) {
    pb.set_style(ProgressStyle::with_template(template).expect("valid template"));
    pb.set_prefix(mark);
    pb.finish();
}

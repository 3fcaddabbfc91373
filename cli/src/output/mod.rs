//! Terminal output: status lines, the run summary and per-step spinners.

pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::{OwoColorize as _, Style};
pub use reporter::TerminalReporter;
pub use styles::Styles;

/// Width the summary keys are padded to.
const KEY_WIDTH: usize = 8;

/// Where and how the installer talks to the operator.
pub struct OutputContext {
    /// Stylesheet; plain when colors are off.
    pub styles: Styles,
    /// Whether stdout is attached to a terminal.
    pub interactive: bool,
    /// Whether to suppress everything except errors.
    pub quiet: bool,
}

impl OutputContext {
    /// Build the context from the `--no-color` and `--quiet` switches.
    ///
    /// `no_color` already folds in the `NO_COLOR` environment variable.
    /// Colors are also dropped when stdout is not a terminal.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let interactive = Term::stdout().is_term();
        let mut styles = Styles::default();
        if interactive && !no_color {
            styles.colorize();
        }
        Self {
            styles,
            interactive,
            quiet,
        }
    }

    /// Spinners need a terminal and an operator who wants to see them.
    #[must_use]
    pub fn spinners_enabled(&self) -> bool {
        self.interactive && !self.quiet
    }

    pub fn success(&self, msg: &str) {
        self.emit(&status_line("✓", self.styles.ok, msg));
    }

    pub fn warn(&self, msg: &str) {
        self.emit(&status_line("⚠", self.styles.warning, msg));
    }

    pub fn step(&self, msg: &str) {
        self.emit(&status_line("→", self.styles.running, msg));
    }

    /// Errors go to stderr and ignore `quiet`.
    pub fn error(&self, msg: &str) {
        eprintln!("{}", status_line("✗", self.styles.failure, msg));
    }

    /// One line of the pre-flight summary, key dimmed and padded.
    pub fn kv(&self, key: &str, value: &str) {
        self.emit(&summary_line(key, self.styles.label, value));
    }

    fn emit(&self, line: &str) {
        if !self.quiet {
            println!("{line}");
        }
    }
}

/// `"  <mark> <msg>"` with only the mark styled.
#[must_use]
pub fn status_line(mark: &str, style: Style, msg: &str) -> String {
    format!("  {} {msg}", mark.style(style))
}

fn summary_line(key: &str, style: Style, value: &str) -> String {
    let padded = format!("{key:<KEY_WIDTH$}");
    format!("  {}  {value}", padded.style(style))
}

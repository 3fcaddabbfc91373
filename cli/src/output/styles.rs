//! Colors for the installer's status marks.

use owo_colors::Style;

/// One style per kind of line. `Default` is the plain, colorless sheet.
#[derive(Default, Clone, Copy)]
pub struct Styles {
    /// `✓` on a finished step.
    pub ok: Style,
    /// `⚠` on an operator warning.
    pub warning: Style,
    /// `✗` on an aborted step or the final error.
    pub failure: Style,
    /// `→` on a step that has started.
    pub running: Style,
    /// Summary keys.
    pub label: Style,
}

impl Styles {
    pub fn colorize(&mut self) {
        *self = Self {
            ok: Style::new().green(),
            warning: Style::new().yellow(),
            failure: Style::new().red().bold(),
            running: Style::new().cyan(),
            label: Style::new().dimmed(),
        };
    }
}

//! Subcommand handlers.

pub mod config_cmd;
pub mod inspect;
pub mod run;

use owo_colors::OwoColorize;

/// Optional terminal styling for command output.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn ok(self, text: &str) -> String {
        if self.enabled {
            text.green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn warn(self, text: &str) -> String {
        if self.enabled {
            text.yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn value(self, text: &str) -> String {
        if self.enabled {
            text.bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(self, text: &str) -> String {
        if self.enabled {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

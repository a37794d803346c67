// src/display/mod.rs
//! Operator-facing output

pub mod terminal;

pub use terminal::TerminalDisplay;

/// Key commands the operator can issue from the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    Arm,
    Reset,
    Quit,
}

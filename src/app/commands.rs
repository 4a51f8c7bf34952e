//! Inbound commands to the controller.
//!
//! These represent actions requested by the outside world (operator
//! console, UI, tests) that the [`Controller`](super::service::Controller)
//! interprets and acts upon.

use crate::classify::Disambiguation;
use crate::config::SystemConfig;

/// Operator actions on the item workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorInput {
    Begin,
    /// Confirm the action for the classified item.
    Confirm,
    /// Used/unused answer for an ambiguous item.
    Disambiguate(Disambiguation),
    Continue,
    End,
    AcknowledgeWarning,
    /// Leave the workflow: stop streams, drop any pending command.
    Cancel,
}

impl OperatorInput {
    /// Parse an operator keyword (case-insensitive).
    pub fn parse(word: &str) -> Option<Self> {
        let input = match word.trim().to_ascii_lowercase().as_str() {
            "begin" | "start" => Self::Begin,
            "confirm" | "act" | "throw" | "sterilize" => Self::Confirm,
            "used" => Self::Disambiguate(Disambiguation::Used),
            "unused" => Self::Disambiguate(Disambiguation::Unused),
            "continue" | "next" => Self::Continue,
            "end" => Self::End,
            "ack" | "acknowledge" => Self::AcknowledgeWarning,
            "cancel" => Self::Cancel,
            _ => return None,
        };
        Some(input)
    }
}

/// Commands that adapters can send into the controller.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Operator(OperatorInput),

    /// Manual (re)connect; restarts the retry budget.
    Reconnect,

    /// Hot-reload configuration.
    UpdateConfig(SystemConfig),
}

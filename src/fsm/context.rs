//! Shared mutable context threaded through every FSM handler.
//!
//! `SessionContext` is the single struct that phase handlers read from and
//! write to: the per-item [`SessionState`] record, the command dispatcher,
//! the outbox of backend commands, the operator status line, and the
//! configuration.  Only the FSM engine hands out `&mut SessionContext`, so
//! every mutation of the session goes through a phase handler.

use core::fmt::Write as _;

use log::warn;

use crate::classify::WasteCategory;
use crate::channel::messages::OutboundCommand;
use crate::config::SystemConfig;
use crate::dispatch::{ActionCommand, CommandDispatcher};
use crate::error::ControlError;

use super::PhaseId;

/// Commands a single input can queue (cancel queues two, begin two).
pub const OUTBOX_CAP: usize = 8;

/// Status line capacity in bytes.
pub const STATUS_CAP: usize = 192;

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// The per-item workflow record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionState {
    pub phase: PhaseId,
    pub current_category: Option<WasteCategory>,
    /// Confidence of the latest detection, 0–100.
    pub last_confidence: f32,
    /// Controller time of the latest accepted detection.
    pub last_detection_ms: Option<u64>,
    pub pending_command: Option<ActionCommand>,
    pub awaiting_disambiguation: bool,
    pub awaiting_continuation_choice: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: PhaseId::Idle,
            current_category: None,
            last_confidence: 0.0,
            last_detection_ms: None,
            pending_command: None,
            awaiting_disambiguation: false,
            awaiting_continuation_choice: false,
        }
    }

    /// Forget the current item.  The phase is left to the engine.
    pub fn clear_item(&mut self) {
        self.current_category = None;
        self.last_confidence = 0.0;
        self.pending_command = None;
        self.awaiting_disambiguation = false;
        self.awaiting_continuation_choice = false;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Severity of the operator status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusKind {
    #[default]
    Normal,
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

pub struct SessionContext {
    // -- Workflow --
    pub session: SessionState,
    pub dispatcher: CommandDispatcher,

    // -- Outputs --
    /// Commands queued by handlers, drained onto the channel by the service.
    pub outbox: heapless::Vec<OutboundCommand, OUTBOX_CAP>,
    pub status: heapless::String<STATUS_CAP>,
    pub status_kind: StatusKind,
    /// Set by a handler that refused its input.  Cleared by the service
    /// before every input.
    pub rejection: Option<ControlError>,

    // -- Environment (written by the service before each input) --
    pub link_up: bool,
    pub now_ms: u64,

    // -- Configuration --
    pub config: SystemConfig,
}

impl SessionContext {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            session: SessionState::new(),
            dispatcher: CommandDispatcher::new(config.completion),
            outbox: heapless::Vec::new(),
            status: heapless::String::new(),
            status_kind: StatusKind::Normal,
            rejection: None,
            link_up: false,
            now_ms: 0,
            config,
        }
    }

    /// Queue a backend command.  Dropped (and logged) if the outbox is full.
    pub fn queue(&mut self, command: OutboundCommand) {
        if self.outbox.push(command).is_err() {
            warn!("FSM: outbox full, {} dropped", command.event_name());
        }
    }

    /// Replace the status line, truncating on a char boundary.
    pub fn set_status(&mut self, kind: StatusKind, text: &str) {
        self.status.clear();
        for ch in text.chars() {
            if self.status.push(ch).is_err() {
                break;
            }
        }
        self.status_kind = kind;
    }

    /// Replace the status line with formatted text.
    pub fn set_status_fmt(&mut self, kind: StatusKind, args: core::fmt::Arguments<'_>) {
        self.status.clear();
        // Overflow only truncates the status line.
        let _ = self.status.write_fmt(args);
        self.status_kind = kind;
    }

    pub fn reject(&mut self, error: impl Into<ControlError>) {
        self.rejection = Some(error.into());
    }

    /// Category of the current item, `None` when nothing is recorded.
    pub fn category(&self) -> WasteCategory {
        self.session.current_category.unwrap_or(WasteCategory::None)
    }
}

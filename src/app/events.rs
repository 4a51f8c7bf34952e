//! Outbound controller events.
//!
//! The [`Controller`](super::service::Controller) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log them, render them, forward them to a UI.

use crate::alerts::AlertKind;
use crate::bins::BinLevelSnapshot;
use crate::channel::LinkState;
use crate::channel::messages::{OutboundCommand, ServerMessageKind};
use crate::error::ControlError;
use crate::fsm::PhaseId;
use crate::fsm::context::StatusKind;

/// Structured events emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The controller has started (carries the initial phase).
    Started(PhaseId),

    /// The session moved between phases.
    PhaseChanged { from: PhaseId, to: PhaseId },

    /// The operator status line changed.
    StatusChanged { kind: StatusKind, text: String },

    /// Backend link state changed.
    LinkChanged(LinkState),

    /// A command was written to the backend.
    CommandSent(OutboundCommand),

    /// Message relayed from the backend.
    BackendMessage { kind: ServerMessageKind, message: String },

    /// New telemetry applied; `full_mask` is the bitmask of full bins.
    BinLevels { levels: BinLevelSnapshot, full_mask: u8 },

    AlertRaised { kind: AlertKind, message: String },

    /// A non-fatal error: rejected input, refused command, bad payload.
    Error(ControlError),
}

//! Command dispatcher.
//!
//! Turns a resolved [`WasteCategory`] into the single matching
//! [`ActionCommand`] and tracks it until the actuator is done.  Only one
//! command may be in flight; a second request is refused and logged as a
//! policy violation rather than queued.
//!
//! Each command carries an expected completion window.  The window is
//! a fallback: the backend's own completion signal normally arrives first,
//! and whichever of the two comes first clears the in-flight slot.

use log::{info, warn};

use crate::classify::WasteCategory;
use crate::config::CompletionWindows;

/// Actuation commands understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCommand {
    ThrowSyringe,
    ThrowHazardous,
    ThrowNonHazardous,
    SterilizeEquipment,
}

impl ActionCommand {
    pub fn for_category(category: WasteCategory) -> Option<Self> {
        match category {
            WasteCategory::Syringe => Some(Self::ThrowSyringe),
            WasteCategory::Hazardous => Some(Self::ThrowHazardous),
            WasteCategory::NonHazardous => Some(Self::ThrowNonHazardous),
            WasteCategory::Equipment => Some(Self::SterilizeEquipment),
            WasteCategory::AmbiguousCotton | WasteCategory::Unrecognized | WasteCategory::None => {
                None
            }
        }
    }

    /// Event name on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::ThrowSyringe => "THROW_SYRINGE",
            Self::ThrowHazardous => "THROW_HAZARDOUS",
            Self::ThrowNonHazardous => "THROW_NONHAZARDOUS",
            Self::SterilizeEquipment => "STERILIZE_EQUIPMENTS",
        }
    }

    /// Status text shown while the actuator runs.
    pub fn progress_text(self) -> &'static str {
        match self {
            Self::SterilizeEquipment => "Sterilizing equipments...",
            _ => "Throwing waste...",
        }
    }

    /// Status text shown once the command is done.
    pub fn done_text(self) -> &'static str {
        match self {
            Self::SterilizeEquipment => "Equipments sterilized successfully.",
            _ => "Waste successfully thrown.",
        }
    }
}

/// The command currently being executed by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub command: ActionCommand,
    pub issued_at_ms: u64,
    /// Fallback completion time.
    pub deadline_ms: u64,
}

/// Why a dispatch request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The category has no actuator command.
    NotDispatchable(WasteCategory),
    /// Another command has not completed yet.
    CommandInFlight(ActionCommand),
    /// The backend link is down; nothing can be sent.
    LinkDown,
}

impl core::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotDispatchable(c) => write!(f, "{c:?} has no actuator command"),
            Self::CommandInFlight(c) => write!(f, "{} still in flight", c.wire_name()),
            Self::LinkDown => write!(f, "backend link is down"),
        }
    }
}

/// Single-slot command tracker.
#[derive(Debug)]
pub struct CommandDispatcher {
    windows: CompletionWindows,
    in_flight: Option<InFlight>,
}

impl CommandDispatcher {
    pub fn new(windows: CompletionWindows) -> Self {
        Self {
            windows,
            in_flight: None,
        }
    }

    /// Claim the in-flight slot for `category`.
    ///
    /// The caller is responsible for actually writing the returned command
    /// onto the channel.
    pub fn dispatch(
        &mut self,
        category: WasteCategory,
        now_ms: u64,
        link_up: bool,
    ) -> Result<ActionCommand, DispatchError> {
        if let Some(current) = self.in_flight {
            warn!(
                "POLICY | dispatch for {:?} refused, {} still in flight",
                category,
                current.command.wire_name()
            );
            return Err(DispatchError::CommandInFlight(current.command));
        }
        let command =
            ActionCommand::for_category(category).ok_or(DispatchError::NotDispatchable(category))?;
        if !link_up {
            warn!("DISPATCH | {} rejected: link down", command.wire_name());
            return Err(DispatchError::LinkDown);
        }

        let window = self.windows.for_command(command);
        self.in_flight = Some(InFlight {
            command,
            issued_at_ms: now_ms,
            deadline_ms: now_ms.saturating_add(window),
        });
        info!("DISPATCH | {} (fallback in {}ms)", command.wire_name(), window);
        Ok(command)
    }

    /// Completion signal from the backend.  Returns the finished command,
    /// or `None` when nothing was in flight (late/duplicate signal).
    pub fn complete(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }

    /// Drop the in-flight command without completion (error, disconnect,
    /// cancellation).
    pub fn cancel(&mut self) -> Option<InFlight> {
        let cancelled = self.in_flight.take();
        if let Some(f) = cancelled {
            info!("DISPATCH | {} cancelled", f.command.wire_name());
        }
        cancelled
    }

    /// True once the fallback window of the in-flight command has elapsed.
    pub fn expired(&self, now_ms: u64) -> bool {
        self.in_flight.is_some_and(|f| now_ms >= f.deadline_ms)
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    pub fn set_windows(&mut self, windows: CompletionWindows) {
        self.windows = windows;
    }
}

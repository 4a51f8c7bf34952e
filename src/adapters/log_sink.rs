//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured controller events to the
//! `log` facade (rendered by whatever subscriber the binary installs).
//! A UI bridge would implement the same trait.

use log::{Level, info, log, warn};

use crate::app::events::ControllerEvent;
use crate::app::ports::EventSink;
use crate::error::ControlError;
use crate::channel::messages::ServerMessageKind;
use crate::fsm::context::StatusKind;

/// Adapter that logs every [`ControllerEvent`].
#[derive(Default)]
pub struct LogEventSink {
    emitted: u64,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events written since construction.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ControllerEvent) {
        self.emitted += 1;
        match event {
            ControllerEvent::Started(phase) => {
                info!("START | initial_phase={:?}", phase);
            }
            ControllerEvent::PhaseChanged { from, to } => {
                info!("PHASE | {:?} -> {:?}", from, to);
            }
            ControllerEvent::StatusChanged { kind, text } => match kind {
                StatusKind::Normal => info!("STATUS | {}", text),
                StatusKind::Warning | StatusKind::Error => warn!("STATUS | [{:?}] {}", kind, text),
            },
            ControllerEvent::LinkChanged(state) => {
                info!("LINK | {}", state.label());
            }
            ControllerEvent::CommandSent(command) => {
                info!("SEND | {}", command.event_name());
            }
            ControllerEvent::BackendMessage { kind, message } => match kind {
                ServerMessageKind::Status => info!("BACKEND | {}", message),
                _ => warn!("BACKEND | [{:?}] {}", kind, message),
            },
            ControllerEvent::BinLevels { levels, full_mask } => {
                info!(
                    "BINS | syringe={:.1}% hazardous={:.1}% non_hazardous={:.1}% | full=0b{:03b}",
                    levels.syringe_pct, levels.hazardous_pct, levels.non_hazardous_pct, full_mask,
                );
            }
            ControllerEvent::AlertRaised { kind, message } => {
                warn!("ALERT | {:?}: {}", kind, message);
            }
            ControllerEvent::Error(e) => {
                log!(error_level(e), "ERROR | {}", e);
            }
        }
    }
}

/// Backend failures abort an actuation and log at `error!`; the rest are
/// recoverable refusals.
fn error_level(e: &ControlError) -> Level {
    match e {
        ControlError::Backend => Level::Error,
        _ => Level::Warn,
    }
}

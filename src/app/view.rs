//! Operator-facing snapshot of the controller.
//!
//! Rendering technology is not the controller's concern; this is the data
//! a screen or console needs, taken in one piece.

use crate::alerts::Alert;
use crate::bins::{Bin, BinTier};
use crate::channel::LinkState;
use crate::classify::WasteCategory;
use crate::fsm::PhaseId;
use crate::fsm::context::StatusKind;

/// Which operator decision is currently open, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Used or unused cotton.
    Disambiguation,
    /// Continue with the next item or end.
    Continuation,
    /// Multiple items on the tray; acknowledge to resume.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinView {
    pub bin: Bin,
    pub pct: f32,
    pub tier: BinTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorView {
    pub phase: PhaseId,
    pub status: String,
    pub status_kind: StatusKind,
    pub category: Option<WasteCategory>,
    /// Label of the operator's action button.
    pub action_label: &'static str,
    pub confidence: f32,
    pub last_detection_ms: Option<u64>,
    pub link: LinkState,
    /// Successful connects since startup; above 1 means the link has dropped.
    pub link_connects: u32,
    /// Camera frames relayed by the backend.
    pub frames_seen: u64,
    pub bins: [BinView; 3],
    pub alerts: Vec<Alert>,
    pub prompt: Option<Prompt>,
}

impl Prompt {
    pub fn for_phase(phase: PhaseId) -> Option<Self> {
        match phase {
            PhaseId::AwaitingDisambiguation => Some(Self::Disambiguation),
            PhaseId::AwaitingContinuation => Some(Self::Continuation),
            PhaseId::MultipleWasteWarning => Some(Self::Warning),
            _ => None,
        }
    }
}

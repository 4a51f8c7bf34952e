//! Function-pointer finite state machine engine for the item session.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  PhaseTable                                                           │
//! │  ┌────────────────────────┬──────────┬──────────┬───────────────────┐ │
//! │  │ PhaseId                │ on_enter │ on_exit  │ on_input          │ │
//! │  ├────────────────────────┼──────────┼──────────┼───────────────────┤ │
//! │  │ Idle                   │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  │ Detecting              │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  │ Classified             │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  │ AwaitingDisambiguation │ fn(ctx)  │ fn(ctx)  │ fn(ctx,in)->Opt<> │ │
//! │  │ PendingAction          │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  │ ActionInProgress       │ fn(ctx)  │ fn(ctx)  │ fn(ctx,in)->Opt<> │ │
//! │  │ AwaitingContinuation   │ fn(ctx)  │ fn(ctx)  │ fn(ctx,in)->Opt<> │ │
//! │  │ Ended                  │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  │ MultipleWasteWarning   │ fn(ctx)  │          │ fn(ctx,in)->Opt<> │ │
//! │  └────────────────────────┴──────────┴──────────┴───────────────────┘ │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every input is handed to `on_input` of the **current** phase.  If it
//! returns `Some(next)`, the engine runs `on_exit` for the current phase,
//! then `on_enter` for the next, and updates the current pointer.  After a
//! transition the new phase receives a synthetic [`SessionInput::Entered`]
//! so transient phases (e.g. `PendingAction`) can move on immediately.

pub mod context;
pub mod states;

use context::SessionContext;
use log::info;

use crate::app::commands::OperatorInput;
use crate::channel::messages::DetectionEvent;

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Enumeration of all workflow phases.
/// Must stay in sync with the table built in [`states::build_phase_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PhaseId {
    Idle = 0,
    Detecting = 1,
    Classified = 2,
    AwaitingDisambiguation = 3,
    PendingAction = 4,
    ActionInProgress = 5,
    AwaitingContinuation = 6,
    Ended = 7,
    MultipleWasteWarning = 8,
}

impl PhaseId {
    /// Total number of phases, used to size the table array.
    pub const COUNT: usize = 9;

    /// Convert an index back to `PhaseId`.  Panics on out-of-range in debug
    /// builds; returns `Idle` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Detecting,
            2 => Self::Classified,
            3 => Self::AwaitingDisambiguation,
            4 => Self::PendingAction,
            5 => Self::ActionInProgress,
            6 => Self::AwaitingContinuation,
            7 => Self::Ended,
            8 => Self::MultipleWasteWarning,
            _ => {
                debug_assert!(false, "invalid phase index: {idx}");
                Self::Idle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// How the backend reported that an actuator command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// `choice_prompt` event.
    ChoicePrompt,
    /// Status message announcing the command completed.
    StatusMessage,
}

/// Everything that can drive a phase change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Delivered by the engine right after a phase is entered.
    Entered,
    /// Periodic timer tick (completion window checks).
    Tick,
    Detection(DetectionEvent),
    Operator(OperatorInput),
    Completion(CompletionSignal),
    /// `server_message{type:error}`.
    BackendError,
    /// `server_message{type:warning}` or `multiple_waste_warning`.
    BackendWarning,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type PhaseActionFn = fn(&mut SessionContext);

/// Signature for the input handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type PhaseInputFn = fn(&mut SessionContext, &SessionInput) -> Option<PhaseId>;

/// Static descriptor for a single phase.
pub struct PhaseDescriptor {
    pub id: PhaseId,
    pub name: &'static str,
    pub on_enter: Option<PhaseActionFn>,
    pub on_exit: Option<PhaseActionFn>,
    pub on_input: PhaseInputFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `PhaseId as usize`.
    table: [PhaseDescriptor; PhaseId::COUNT],
    current: usize,
    transitions: u64,
}

impl Fsm {
    pub fn new(table: [PhaseDescriptor; PhaseId::COUNT], initial: PhaseId) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first input.
    pub fn start(&mut self, ctx: &mut SessionContext) {
        info!("FSM starting in phase: {}", self.table[self.current].name);
        ctx.session.phase = self.current_phase();
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
        self.settle(ctx);
    }

    /// Deliver one input.  Returns `true` if the phase changed.
    pub fn handle(&mut self, input: &SessionInput, ctx: &mut SessionContext) -> bool {
        let before = self.current;
        if let Some(next) = (self.table[self.current].on_input)(ctx, input) {
            self.transition(next, ctx);
            self.settle(ctx);
        }
        before != self.current
    }

    /// Jump to `next` regardless of the current handler (disconnect).
    pub fn force_transition(&mut self, next: PhaseId, ctx: &mut SessionContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
            self.settle(ctx);
        }
    }

    pub fn current_phase(&self) -> PhaseId {
        PhaseId::from_index(self.current)
    }

    /// Total transitions since start.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Offer `Entered` to each newly entered phase until one stays put.
    /// Bounded so a cycle of transient phases cannot spin.
    fn settle(&mut self, ctx: &mut SessionContext) {
        for _ in 0..PhaseId::COUNT {
            match (self.table[self.current].on_input)(ctx, &SessionInput::Entered) {
                Some(next) if next as usize != self.current => self.transition(next, ctx),
                _ => return,
            }
        }
    }

    fn transition(&mut self, next_id: PhaseId, ctx: &mut SessionContext) {
        let next_idx = next_id as usize;
        if next_idx == self.current {
            return;
        }

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.transitions += 1;
        ctx.session.phase = next_id;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

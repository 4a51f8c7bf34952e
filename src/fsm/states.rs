//! Concrete phase handler functions and table builder.
//!
//! Each phase is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch.
//!
//! ```text
//!  IDLE ──[begin]──▶ DETECTING ──[concrete/unrecognized]──▶ CLASSIFIED ──[confirm | auto-act]──▶ PENDING_ACTION
//!   ▲                  │  ▲                                   ▲                                      │
//!   │           [cotton]  │                              [used/unused]                        [dispatched]
//!   │                  ▼  │                                   │                                      ▼
//!   │   AWAITING_DISAMBIGUATION ──────────────────────────────┘                           ACTION_IN_PROGRESS
//!   │                     │                                                                          │
//!   │                     └──[continue]── AWAITING_CONTINUATION ◀──[signal | timer]──────────────────┘
//!   │                                           │
//!   └────────────[begin]────── ENDED ◀──[end]───┘
//!
//!  DETECTING / CLASSIFIED / AWAITING_* ──[warning]──▶ MULTIPLE_WASTE_WARNING ──[ack]──▶ DETECTING
//!  Any phase ──[cancel | disconnect]──▶ IDLE
//! ```

use super::context::{SessionContext, StatusKind};
use super::{CompletionSignal, PhaseDescriptor, PhaseId, SessionInput};
use crate::app::commands::OperatorInput;
use crate::channel::messages::OutboundCommand;
use crate::classify::{WasteCategory, classify};
use crate::error::{ControlError, PolicyViolation};
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static phase table.  Called once at startup.
pub fn build_phase_table() -> [PhaseDescriptor; PhaseId::COUNT] {
    [
        // Index 0: Idle
        PhaseDescriptor {
            id: PhaseId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_input: idle_input,
        },
        // Index 1: Detecting
        PhaseDescriptor {
            id: PhaseId::Detecting,
            name: "Detecting",
            on_enter: Some(detecting_enter),
            on_exit: None,
            on_input: detecting_input,
        },
        // Index 2: Classified
        PhaseDescriptor {
            id: PhaseId::Classified,
            name: "Classified",
            on_enter: Some(classified_enter),
            on_exit: None,
            on_input: classified_input,
        },
        // Index 3: AwaitingDisambiguation
        PhaseDescriptor {
            id: PhaseId::AwaitingDisambiguation,
            name: "AwaitingDisambiguation",
            on_enter: Some(disambiguation_enter),
            on_exit: Some(disambiguation_exit),
            on_input: disambiguation_input,
        },
        // Index 4: PendingAction
        PhaseDescriptor {
            id: PhaseId::PendingAction,
            name: "PendingAction",
            on_enter: None,
            on_exit: None,
            on_input: pending_input,
        },
        // Index 5: ActionInProgress
        PhaseDescriptor {
            id: PhaseId::ActionInProgress,
            name: "ActionInProgress",
            on_enter: Some(in_progress_enter),
            on_exit: Some(in_progress_exit),
            on_input: in_progress_input,
        },
        // Index 6: AwaitingContinuation
        PhaseDescriptor {
            id: PhaseId::AwaitingContinuation,
            name: "AwaitingContinuation",
            on_enter: Some(continuation_enter),
            on_exit: Some(continuation_exit),
            on_input: continuation_input,
        },
        // Index 7: Ended
        PhaseDescriptor {
            id: PhaseId::Ended,
            name: "Ended",
            on_enter: Some(ended_enter),
            on_exit: None,
            on_input: ended_input,
        },
        // Index 8: MultipleWasteWarning
        PhaseDescriptor {
            id: PhaseId::MultipleWasteWarning,
            name: "MultipleWasteWarning",
            on_enter: Some(warning_enter),
            on_exit: None,
            on_input: warning_input,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared guards
// ═══════════════════════════════════════════════════════════════════════════

/// Operator cancel: stop both streams, drop any in-flight command.
fn cancel(ctx: &mut SessionContext) -> Option<PhaseId> {
    ctx.dispatcher.cancel();
    ctx.queue(OutboundCommand::EndDetection);
    ctx.queue(OutboundCommand::UnsubscribeUltrasonic);
    info!("SESSION: cancelled by operator");
    Some(PhaseId::Idle)
}

/// Any operator input a phase has no use for.
fn out_of_phase(ctx: &mut SessionContext, input: &OperatorInput) -> Option<PhaseId> {
    warn!(
        "POLICY | {:?} not accepted in {:?}",
        input, ctx.session.phase
    );
    ctx.reject(PolicyViolation::InputOutOfPhase);
    None
}

/// Record a detection on the session and classify it.
fn record_detection(ctx: &mut SessionContext, label: Option<&str>, confidence: f32) -> WasteCategory {
    let category = classify(label, &ctx.config.labels);
    ctx.session.last_confidence = confidence;
    ctx.session.last_detection_ms = Some(ctx.now_ms);
    if category == WasteCategory::Unrecognized {
        info!("SESSION: unrecognized label {:?}, treated as other waste", label);
    }
    category
}

/// Route a classified detection.  `None` stays in the calling phase.
fn route_category(ctx: &mut SessionContext, category: WasteCategory) -> Option<PhaseId> {
    match category {
        WasteCategory::None => None,
        WasteCategory::AmbiguousCotton => Some(PhaseId::AwaitingDisambiguation),
        concrete => {
            ctx.session.current_category = Some(concrete);
            Some(PhaseId::Classified)
        }
    }
}

/// Start a session.  Refused while the backend link is down.
fn begin(ctx: &mut SessionContext) -> Option<PhaseId> {
    if !ctx.link_up {
        warn!("SESSION: begin refused, backend link down");
        ctx.set_status(StatusKind::Error, "Disconnected. Attempting to reconnect...");
        ctx.reject(ControlError::ConnectivityLost);
        return None;
    }
    ctx.queue(OutboundCommand::SubscribeUltrasonic);
    Some(PhaseId::Detecting)
}

fn no_waste_status(ctx: &mut SessionContext) {
    ctx.set_status(
        StatusKind::Normal,
        "No waste detected. Please place waste in front of camera.",
    );
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut SessionContext) {
    ctx.dispatcher.cancel();
    ctx.session.clear_item();
    ctx.set_status(StatusKind::Normal, "Idle. Press BEGIN to start detection.");
}

fn idle_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Operator(OperatorInput::Begin) => begin(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        // Backend warnings: alert only, there is no session to pause.
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DETECTING
// ═══════════════════════════════════════════════════════════════════════════

fn detecting_enter(ctx: &mut SessionContext) {
    ctx.session.clear_item();
    ctx.queue(OutboundCommand::StartDetection);
    ctx.set_status(StatusKind::Normal, "Waiting for detection...");
}

fn detecting_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Detection(ev) => {
            let category = record_detection(ctx, ev.label.as_deref(), ev.confidence);
            if category == WasteCategory::None {
                no_waste_status(ctx);
            }
            route_category(ctx, category)
        }
        SessionInput::BackendWarning => Some(PhaseId::MultipleWasteWarning),
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLASSIFIED: category known, waiting for confirmation
// ═══════════════════════════════════════════════════════════════════════════

fn classified_enter(ctx: &mut SessionContext) {
    let category = ctx.category();
    let confidence = ctx.session.last_confidence;
    if category == WasteCategory::Unrecognized {
        ctx.set_status(
            StatusKind::Warning,
            "Unrecognized waste detected. Confirm to handle it as other waste.",
        );
    } else {
        ctx.set_status_fmt(
            StatusKind::Normal,
            format_args!(
                "{} detected ({:.0}% confidence). Press {}.",
                category.display_name(),
                confidence,
                category.action_label()
            ),
        );
    }
}

fn auto_act(ctx: &SessionContext) -> bool {
    ctx.config.auto_act && ctx.category().is_dispatchable() && ctx.rejection.is_none()
}

fn classified_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Entered if auto_act(ctx) => {
            info!("SESSION: auto-act for {:?}", ctx.category());
            Some(PhaseId::PendingAction)
        }
        SessionInput::Operator(OperatorInput::Confirm) => {
            if ctx.category() == WasteCategory::Unrecognized {
                ctx.set_status(
                    StatusKind::Warning,
                    "Please remove the item manually. CONTINUE or END?",
                );
                return Some(PhaseId::AwaitingContinuation);
            }
            Some(PhaseId::PendingAction)
        }
        // Latest detection wins until the operator confirms.
        SessionInput::Detection(ev) => {
            let category = record_detection(ctx, ev.label.as_deref(), ev.confidence);
            match route_category(ctx, category) {
                Some(PhaseId::Classified) => {
                    classified_enter(ctx);
                    auto_act(ctx).then_some(PhaseId::PendingAction)
                }
                other => other,
            }
        }
        SessionInput::BackendWarning => Some(PhaseId::MultipleWasteWarning),
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_DISAMBIGUATION: used or unused cotton?
// ═══════════════════════════════════════════════════════════════════════════

fn disambiguation_enter(ctx: &mut SessionContext) {
    ctx.session.current_category = Some(WasteCategory::AmbiguousCotton);
    ctx.session.awaiting_disambiguation = true;
    let confidence = ctx.session.last_confidence;
    ctx.set_status_fmt(
        StatusKind::Warning,
        format_args!("Cotton detected ({:.0}% confidence). Is it USED or UNUSED?", confidence),
    );
}

fn disambiguation_exit(ctx: &mut SessionContext) {
    ctx.session.awaiting_disambiguation = false;
}

fn disambiguation_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Operator(OperatorInput::Disambiguate(choice)) => {
            let resolved = choice.resolve();
            info!("SESSION: cotton resolved as {:?} -> {:?}", choice, resolved);
            ctx.session.current_category = Some(resolved);
            Some(PhaseId::Classified)
        }
        SessionInput::BackendWarning => Some(PhaseId::MultipleWasteWarning),
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PENDING_ACTION: transient, dispatches on entry
// ═══════════════════════════════════════════════════════════════════════════

fn pending_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Entered => {
            let (category, now_ms, link_up) = (ctx.category(), ctx.now_ms, ctx.link_up);
            match ctx.dispatcher.dispatch(category, now_ms, link_up) {
                Ok(command) => {
                    ctx.session.pending_command = Some(command);
                    ctx.queue(OutboundCommand::Action(command));
                    Some(PhaseId::ActionInProgress)
                }
                Err(e) => {
                    warn!("SESSION: dispatch for {:?} rejected: {}", category, e);
                    ctx.set_status_fmt(
                        StatusKind::Error,
                        format_args!("Command not sent: {}.", e),
                    );
                    ctx.reject(e);
                    Some(PhaseId::Classified)
                }
            }
        }
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACTION_IN_PROGRESS: paused while the actuator runs
// ═══════════════════════════════════════════════════════════════════════════

fn in_progress_enter(ctx: &mut SessionContext) {
    if let Some(command) = ctx.session.pending_command {
        ctx.set_status(StatusKind::Normal, command.progress_text());
    }
}

fn in_progress_exit(ctx: &mut SessionContext) {
    ctx.session.pending_command = None;
}

fn complete(ctx: &mut SessionContext, source: &str) -> Option<PhaseId> {
    let finished = ctx.dispatcher.complete()?;
    info!(
        "ACTION: {} complete via {} after {}ms",
        finished.command.wire_name(),
        source,
        ctx.now_ms.saturating_sub(finished.issued_at_ms)
    );
    ctx.set_status_fmt(
        StatusKind::Normal,
        format_args!("{} CONTINUE or END?", finished.command.done_text()),
    );
    Some(PhaseId::AwaitingContinuation)
}

fn in_progress_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Completion(CompletionSignal::ChoicePrompt) => complete(ctx, "choice prompt"),
        SessionInput::Completion(CompletionSignal::StatusMessage) => complete(ctx, "status"),
        SessionInput::Tick if ctx.dispatcher.expired(ctx.now_ms) => complete(ctx, "timer"),
        SessionInput::Detection(ev) => {
            warn!(
                "POLICY | detection {:?} dropped while actuating",
                ev.label
            );
            ctx.reject(PolicyViolation::DetectionWhilePaused);
            None
        }
        SessionInput::BackendError => {
            warn!("ACTION: backend error, resuming detection");
            ctx.dispatcher.cancel();
            Some(PhaseId::Detecting)
        }
        // Second dispatch attempt: the dispatcher refuses and logs it.
        SessionInput::Operator(OperatorInput::Confirm) => {
            let (category, now_ms, link_up) = (ctx.category(), ctx.now_ms, ctx.link_up);
            if let Err(e) = ctx.dispatcher.dispatch(category, now_ms, link_up) {
                ctx.reject(e);
            }
            None
        }
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        // Includes backend warnings.  The tray is locked until the command
        // completes, so the warning surfaces as the alert only and no modal
        // opens mid-actuation.
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_CONTINUATION: continue with the next item or end?
// ═══════════════════════════════════════════════════════════════════════════

fn continuation_enter(ctx: &mut SessionContext) {
    ctx.session.awaiting_continuation_choice = true;
}

fn continuation_exit(ctx: &mut SessionContext) {
    ctx.session.awaiting_continuation_choice = false;
}

fn continuation_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Operator(OperatorInput::Continue) => Some(PhaseId::Detecting),
        SessionInput::Operator(OperatorInput::End) => Some(PhaseId::Ended),
        SessionInput::BackendWarning => Some(PhaseId::MultipleWasteWarning),
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ENDED
// ═══════════════════════════════════════════════════════════════════════════

fn ended_enter(ctx: &mut SessionContext) {
    ctx.session.clear_item();
    ctx.queue(OutboundCommand::EndDetection);
    ctx.queue(OutboundCommand::UnsubscribeUltrasonic);
    ctx.set_status(StatusKind::Normal, "Detection ended. Press BEGIN to start again.");
}

fn ended_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Operator(OperatorInput::Begin) => begin(ctx),
        // Streams are already stopped.
        SessionInput::Operator(OperatorInput::Cancel) => Some(PhaseId::Idle),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        // Backend warnings: alert only, the session is over.
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  MULTIPLE_WASTE_WARNING: needs acknowledgement
// ═══════════════════════════════════════════════════════════════════════════

fn warning_enter(ctx: &mut SessionContext) {
    ctx.session.clear_item();
    ctx.set_status(
        StatusKind::Warning,
        "Multiple waste items detected. Place one item at a time, then ACKNOWLEDGE.",
    );
}

fn warning_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<PhaseId> {
    match input {
        SessionInput::Operator(OperatorInput::AcknowledgeWarning) => Some(PhaseId::Detecting),
        SessionInput::Operator(OperatorInput::Cancel) => cancel(ctx),
        SessionInput::Operator(other) => out_of_phase(ctx, other),
        _ => None,
    }
}

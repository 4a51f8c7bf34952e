//! End-to-end session flows: operator input and backend events through the
//! controller, FSM and dispatcher, down to the frames on the wire.

use sterisort::alerts::AlertKind;
use sterisort::app::commands::OperatorInput;
use sterisort::app::events::ControllerEvent;
use sterisort::app::service::Controller;
use sterisort::app::view::Prompt;
use sterisort::bins::{Bin, BinTier};
use sterisort::classify::{Disambiguation, WasteCategory};
use sterisort::config::SystemConfig;
use sterisort::dispatch::ActionCommand;
use sterisort::error::{ControlError, PolicyViolation};
use sterisort::fsm::PhaseId;

use crate::mock_channel::{MockLink, RecordingSink};

fn make_controller(config: SystemConfig) -> (Controller<MockLink>, RecordingSink) {
    let mut sink = RecordingSink::new();
    let mut ctl = Controller::new(config, MockLink::new());
    ctl.start(0, &mut sink);
    (ctl, sink)
}

fn link(ctl: &mut Controller<MockLink>) -> &mut MockLink {
    ctl.channel_mut().transport_mut()
}

/// Begin and wait for a detection.
fn detecting() -> (Controller<MockLink>, RecordingSink) {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    ctl.handle_operator(OperatorInput::Begin, 10, &mut sink)
        .expect("begin accepted");
    (ctl, sink)
}

// ── Scenario A: gloves → hazardous → throw → continue ─────────

#[test]
fn gloves_are_thrown_as_hazardous_then_operator_continues() {
    let (mut ctl, mut sink) = detecting();
    assert_eq!(ctl.phase(), PhaseId::Detecting);

    link(&mut ctl).detection("gloves", 88.0);
    ctl.tick(100, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::Classified);
    assert_eq!(ctl.session().current_category, Some(WasteCategory::Hazardous));

    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);
    assert_eq!(link(&mut ctl).count_written("THROW_HAZARDOUS"), 1);
    assert_eq!(ctl.status(), "Throwing waste...");

    ctl.channel_mut()
        .transport_mut()
        .push_event("choice_prompt", "{}");
    ctl.tick(3_000, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::AwaitingContinuation);
    assert_eq!(ctl.view().prompt, Some(Prompt::Continuation));
    assert!(ctl.in_flight().is_none());

    ctl.handle_operator(OperatorInput::Continue, 3_100, &mut sink)
        .expect("continue accepted");
    assert_eq!(ctl.phase(), PhaseId::Detecting);
    assert_eq!(ctl.session().current_category, None);
}

// ── Scenario B: cotton needs the operator ─────────────────────

#[test]
fn used_cotton_resolves_to_hazardous() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("cotton", 80.0);
    ctl.tick(100, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::AwaitingDisambiguation);
    assert!(ctl.session().awaiting_disambiguation);
    assert_eq!(ctl.view().prompt, Some(Prompt::Disambiguation));

    ctl.handle_operator(
        OperatorInput::Disambiguate(Disambiguation::Used),
        200,
        &mut sink,
    )
    .expect("used accepted");
    assert_eq!(ctl.phase(), PhaseId::Classified);
    assert_eq!(ctl.session().current_category, Some(WasteCategory::Hazardous));
    assert!(!ctl.session().awaiting_disambiguation);
}

#[test]
fn unused_cotton_resolves_to_non_hazardous() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("Cotton ", 75.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(
        OperatorInput::Disambiguate(Disambiguation::Unused),
        200,
        &mut sink,
    )
    .expect("unused accepted");
    assert_eq!(
        ctl.session().current_category,
        Some(WasteCategory::NonHazardous)
    );
}

// ── Scenario C: bin full regardless of phase ──────────────────

#[test]
fn full_syringe_bin_alerts_mid_actuation() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("syringe", 95.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);

    link(&mut ctl).push_event("ultrasonic_update", r#"{"syringe_pct":100}"#);
    ctl.tick(300, &mut sink);

    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);
    assert!(ctl.bins().is_full(Bin::Syringe));
    assert_eq!(ctl.bins().tier_of(Bin::Syringe), BinTier::Full);
    assert!(ctl.alerts().get(AlertKind::BinFull).is_some());
    assert!(sink.contains(&ControllerEvent::AlertRaised {
        kind: AlertKind::BinFull,
        message: "BIN IS FULL - IMMEDIATE DISPOSAL REQUIRED".into(),
    }));
}

#[test]
fn bin_full_alert_is_level_triggered_and_expires() {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    let dwell = ctl.config().alert_dwell_ms;

    link(&mut ctl).push_event("ultrasonic_update", r#"{"hazardous_pct":100}"#);
    ctl.tick(100, &mut sink);
    assert!(ctl.alerts().get(AlertKind::BinFull).is_some());

    ctl.tick(100 + dwell, &mut sink);
    assert!(ctl.alerts().get(AlertKind::BinFull).is_none());

    // Still full on the next reading: raised again.
    link(&mut ctl).push_event("ultrasonic_update", r#"{"hazardous_pct":100}"#);
    ctl.tick(200 + dwell, &mut sink);
    assert!(ctl.alerts().get(AlertKind::BinFull).is_some());
}

// ── Dispatcher and pause policy ───────────────────────────────

#[test]
fn second_confirm_while_actuating_is_refused() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("bandage", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("first confirm accepted");

    let second = ctl.handle_operator(OperatorInput::Confirm, 250, &mut sink);
    assert_eq!(
        second,
        Err(ControlError::PolicyViolation(PolicyViolation::CommandInFlight))
    );
    assert_eq!(link(&mut ctl).count_written("THROW_NONHAZARDOUS"), 1);
    assert_eq!(
        ctl.in_flight().map(|f| f.command),
        Some(ActionCommand::ThrowNonHazardous)
    );
}

#[test]
fn detections_are_ignored_while_actuating() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("scissor", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");
    assert_eq!(link(&mut ctl).count_written("STERILIZE_EQUIPMENTS"), 1);

    sink.clear();
    for (i, label) in ["syringe", "gloves", "syringe"].into_iter().enumerate() {
        link(&mut ctl).detection(label, 99.0);
        ctl.tick(300 + i as u64 * 100, &mut sink);
    }
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);
    assert_eq!(ctl.session().current_category, Some(WasteCategory::Equipment));
    // Dropped quietly: no error events reach the sink.
    assert_eq!(
        sink.count(|e| matches!(e, ControllerEvent::Error(_))),
        0
    );
}

#[test]
fn completion_timer_fires_when_backend_stays_silent() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("syringe", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 1_000, &mut sink)
        .expect("confirm accepted");
    let window = ctl.config().completion.throw_syringe_ms;

    ctl.tick(1_000 + window - 1, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);

    ctl.tick(1_000 + window, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::AwaitingContinuation);
    assert_eq!(ctl.status(), "Waste successfully thrown. CONTINUE or END?");
}

#[test]
fn late_completion_signal_after_timer_is_a_no_op() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("syringe", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 1_000, &mut sink)
        .expect("confirm accepted");
    ctl.tick(1_000 + ctl.config().completion.throw_syringe_ms, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::AwaitingContinuation);

    sink.clear();
    link(&mut ctl).status("THROW_SYRINGE completed. Resuming detection...");
    link(&mut ctl).push_event("choice_prompt", "{}");
    ctl.tick(20_000, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::AwaitingContinuation);
    assert_eq!(
        sink.count(|e| matches!(e, ControllerEvent::PhaseChanged { .. })),
        0
    );
}

#[test]
fn auto_act_dispatches_without_confirmation() {
    let config = SystemConfig {
        auto_act: true,
        ..SystemConfig::default()
    };
    let (mut ctl, mut sink) = make_controller(config);
    ctl.handle_operator(OperatorInput::Begin, 10, &mut sink)
        .expect("begin accepted");
    link(&mut ctl).detection("head-cap", 70.0);
    ctl.tick(100, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);
    assert_eq!(link(&mut ctl).count_written("THROW_NONHAZARDOUS"), 1);
}

// ── Warnings, errors, ending ──────────────────────────────────

#[test]
fn multiple_waste_warning_needs_acknowledgement() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).push_event(
        "server_message",
        r#"{"type":"warning","message":"Multiple waste detected!"}"#,
    );
    ctl.tick(100, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::MultipleWasteWarning);
    assert_eq!(ctl.view().prompt, Some(Prompt::Warning));
    assert!(ctl.alerts().get(AlertKind::MultipleWaste).is_some());

    assert!(
        ctl.handle_operator(OperatorInput::Confirm, 150, &mut sink)
            .is_err()
    );
    ctl.handle_operator(OperatorInput::AcknowledgeWarning, 200, &mut sink)
        .expect("ack accepted");
    assert_eq!(ctl.phase(), PhaseId::Detecting);
}

#[test]
fn warning_mid_actuation_only_raises_the_alert() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("gauze", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");

    link(&mut ctl).push_event(
        "server_message",
        r#"{"type":"warning","message":"Multiple waste detected!"}"#,
    );
    ctl.tick(300, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::ActionInProgress);
    assert!(ctl.in_flight().is_some());
    assert!(ctl.alerts().get(AlertKind::MultipleWaste).is_some());
    assert_ne!(ctl.view().prompt, Some(Prompt::Warning));
}

#[test]
fn backend_error_during_actuation_resumes_detection() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("gauze", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");

    link(&mut ctl).push_event(
        "server_message",
        r#"{"type":"error","message":"Arduino missing"}"#,
    );
    ctl.tick(300, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::Detecting);
    assert!(ctl.in_flight().is_none());
    assert_eq!(ctl.status(), "Arduino missing");
    assert!(sink.contains(&ControllerEvent::Error(ControlError::Backend)));
}

#[test]
fn end_stops_both_streams() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).detection("stethoscope", 90.0);
    ctl.tick(100, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 200, &mut sink)
        .expect("confirm accepted");
    link(&mut ctl).push_event("choice_prompt", "{}");
    ctl.tick(300, &mut sink);

    link(&mut ctl).clear_written();
    ctl.handle_operator(OperatorInput::End, 400, &mut sink)
        .expect("end accepted");
    assert_eq!(ctl.phase(), PhaseId::Ended);
    assert_eq!(
        link(&mut ctl).written(),
        ["end_detection", "unsubscribe_ultrasonic"]
    );

    ctl.handle_operator(OperatorInput::Begin, 500, &mut sink)
        .expect("begin after end accepted");
    assert_eq!(ctl.phase(), PhaseId::Detecting);
}

#[test]
fn malformed_payload_is_rejected_without_state_change() {
    let (mut ctl, mut sink) = detecting();
    link(&mut ctl).push_event("detection_event", r#"{"label":42}"#);
    link(&mut ctl).push_raw(b"not json at all");
    ctl.tick(100, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::Detecting);
    assert_eq!(
        sink.count(|e| matches!(e, ControllerEvent::Error(ControlError::Decode(_)))),
        2
    );
}

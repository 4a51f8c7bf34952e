//! Link loss and recovery: every reconnect reissues the standing
//! subscriptions and lands the session in Idle.

use sterisort::app::commands::{AppCommand, OperatorInput};
use sterisort::app::events::ControllerEvent;
use sterisort::app::service::Controller;
use sterisort::channel::LinkState;
use sterisort::config::SystemConfig;
use sterisort::error::ControlError;
use sterisort::fsm::PhaseId;

use crate::mock_channel::{MockLink, RecordingSink};

fn make_controller(config: SystemConfig) -> (Controller<MockLink>, RecordingSink) {
    let mut sink = RecordingSink::new();
    let mut ctl = Controller::new(config, MockLink::new());
    ctl.start(0, &mut sink);
    (ctl, sink)
}

#[test]
fn start_issues_standing_subscriptions() {
    let (ctl, _) = make_controller(SystemConfig::default());
    assert_eq!(ctl.link_state(), LinkState::Connected);
    assert_eq!(
        ctl.channel().transport().written(),
        ["start_detection", "subscribe_ultrasonic"]
    );
}

// ── Scenario D: repeated drops during Detecting ───────────────

#[test]
fn every_reconnect_resubscribes_and_resets_to_idle() {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    let backoff = ctl.config().reconnect_initial_backoff_ms;
    let mut now = 10;

    for cycle in 1..=3u32 {
        ctl.handle_operator(OperatorInput::Begin, now, &mut sink)
            .expect("begin accepted while connected");
        assert_eq!(ctl.phase(), PhaseId::Detecting);

        now += 50;
        ctl.channel_mut().transport_mut().drop_link();
        ctl.tick(now, &mut sink);
        assert_eq!(ctl.phase(), PhaseId::Idle, "cycle {cycle}: drop resets to Idle");
        assert_eq!(ctl.status(), "Disconnected. Attempting to reconnect...");
        assert!(matches!(
            ctl.link_state(),
            LinkState::Reconnecting { attempt: 1, .. }
        ));

        ctl.channel_mut().transport_mut().clear_written();
        now += backoff;
        ctl.tick(now, &mut sink);
        assert_eq!(ctl.link_state(), LinkState::Connected);
        assert_eq!(ctl.phase(), PhaseId::Idle, "cycle {cycle}: no resume after reconnect");
        assert_eq!(
            ctl.channel().transport().written(),
            ["start_detection", "subscribe_ultrasonic"],
            "cycle {cycle}: subscriptions reissued"
        );
        assert_eq!(ctl.channel().transport().opens, cycle + 1);
        now += 10;
    }

    assert_eq!(
        sink.count(|e| matches!(e, ControllerEvent::LinkChanged(LinkState::Connected))),
        4
    );
    assert_eq!(ctl.view().link_connects, 4);
}

#[test]
fn drop_during_actuation_abandons_the_command() {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    ctl.handle_operator(OperatorInput::Begin, 10, &mut sink)
        .expect("begin accepted");
    ctl.channel_mut().transport_mut().detection("syringe", 90.0);
    ctl.tick(20, &mut sink);
    ctl.handle_operator(OperatorInput::Confirm, 30, &mut sink)
        .expect("confirm accepted");
    assert!(ctl.in_flight().is_some());

    ctl.channel_mut().transport_mut().drop_link();
    ctl.tick(40, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::Idle);
    assert!(ctl.in_flight().is_none());

    // Completion for the lost command arrives after reconnect: ignored.
    ctl.tick(40 + ctl.config().reconnect_initial_backoff_ms, &mut sink);
    ctl.channel_mut().transport_mut().push_event("choice_prompt", "{}");
    ctl.tick(5_000, &mut sink);
    assert_eq!(ctl.phase(), PhaseId::Idle);
}

#[test]
fn begin_is_refused_while_reconnecting() {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    ctl.channel_mut().transport_mut().drop_link();
    ctl.tick(10, &mut sink);
    assert!(!ctl.link_state().is_up());

    assert_eq!(
        ctl.handle_operator(OperatorInput::Begin, 20, &mut sink),
        Err(ControlError::ConnectivityLost)
    );
    assert_eq!(ctl.phase(), PhaseId::Idle);
}

#[test]
fn exhausted_retries_park_until_manual_reconnect() {
    let config = SystemConfig {
        reconnect_max_retries: 2,
        reconnect_initial_backoff_ms: 100,
        reconnect_max_backoff_ms: 150,
        ..SystemConfig::default()
    };
    let mut sink = RecordingSink::new();
    let mut link = MockLink::new();
    link.refuse_next_opens(10);
    let mut ctl = Controller::new(config, link);
    ctl.start(0, &mut sink);
    assert_eq!(
        ctl.link_state(),
        LinkState::Reconnecting { attempt: 1, retry_at_ms: 100 }
    );

    ctl.tick(100, &mut sink);
    assert_eq!(
        ctl.link_state(),
        LinkState::Reconnecting { attempt: 2, retry_at_ms: 250 }
    );
    ctl.tick(250, &mut sink);
    assert_eq!(ctl.link_state(), LinkState::Failed);
    assert!(sink.contains(&ControllerEvent::Error(ControlError::ConnectivityLost)));

    // Parked: no further attempts on their own.
    ctl.tick(10_000, &mut sink);
    assert_eq!(ctl.link_state(), LinkState::Failed);

    ctl.channel_mut().transport_mut().refuse_next_opens(0);
    ctl.handle_command(AppCommand::Reconnect, 10_100, &mut sink)
        .expect("manual reconnect succeeds");
    assert_eq!(ctl.link_state(), LinkState::Connected);
    assert_eq!(ctl.status(), "Connected. Press BEGIN to start detection.");
}

#[test]
fn shutdown_stops_streams_and_closes() {
    let (mut ctl, mut sink) = make_controller(SystemConfig::default());
    ctl.handle_operator(OperatorInput::Begin, 10, &mut sink)
        .expect("begin accepted");
    ctl.channel_mut().transport_mut().clear_written();

    ctl.shutdown(20, &mut sink);
    assert_eq!(
        ctl.channel().transport().written(),
        ["end_detection", "unsubscribe_ultrasonic"]
    );
    assert_eq!(ctl.link_state(), LinkState::Disconnected);
    assert_eq!(ctl.phase(), PhaseId::Idle);
}

//! Property tests for the classifier, the wire boundary and the session
//! workflow.

use std::collections::VecDeque;

use proptest::prelude::*;

use sterisort::app::commands::OperatorInput;
use sterisort::app::events::ControllerEvent;
use sterisort::app::ports::EventSink;
use sterisort::app::service::Controller;
use sterisort::bins::{BinLevelSnapshot, BinTier, tier};
use sterisort::channel::codec::{FrameDecoder, MAX_FRAME_SIZE, encode_frame};
use sterisort::channel::messages::{InboundEvent, decode_inbound};
use sterisort::channel::transport::Transport;
use sterisort::classify::{Disambiguation, LabelSets, WasteCategory, classify};
use sterisort::config::SystemConfig;
use sterisort::fsm::PhaseId;

// ── Classifier ────────────────────────────────────────────────

fn known_label() -> impl Strategy<Value = (&'static str, WasteCategory)> {
    prop_oneof![
        Just(("syringe", WasteCategory::Syringe)),
        Just(("gauze pad", WasteCategory::Hazardous)),
        Just(("gloves", WasteCategory::Hazardous)),
        Just(("disposable-mask", WasteCategory::Hazardous)),
        Just(("bandage", WasteCategory::NonHazardous)),
        Just(("head-cap", WasteCategory::NonHazardous)),
        Just(("scissor", WasteCategory::Equipment)),
        Just(("sphygmomanometer", WasteCategory::Equipment)),
        Just(("cotton", WasteCategory::AmbiguousCotton)),
    ]
}

/// Flip the case of the characters selected by `mask`.
fn recase(label: &str, mask: &[bool]) -> String {
    label
        .chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
        .collect()
}

proptest! {
    /// Case and surrounding whitespace never change the category.
    #[test]
    fn classify_ignores_case_and_padding(
        (label, expected) in known_label(),
        mask in proptest::collection::vec(any::<bool>(), 1..8),
        left in 0usize..4,
        right in 0usize..4,
    ) {
        let raw = format!("{}{}{}", " ".repeat(left), recase(label, &mask), "\t".repeat(right));
        prop_assert_eq!(classify(Some(&raw), &LabelSets::default()), expected);
    }

    /// Anything outside the sets is unrecognized, never silently dropped.
    #[test]
    fn unknown_labels_are_unrecognized(label in "[a-z]{3,12}zq") {
        prop_assert_eq!(
            classify(Some(&label), &LabelSets::default()),
            WasteCategory::Unrecognized
        );
    }

    #[test]
    fn snapshot_is_always_in_range(a in any::<f32>(), b in any::<f32>(), c in any::<f32>()) {
        let s = BinLevelSnapshot::clamped(a, b, c);
        for v in [s.syringe_pct, s.hazardous_pct, s.non_hazardous_pct] {
            prop_assert!((0.0..=100.0).contains(&v));
        }
    }

    /// Tiers are monotonic in the fill level.
    #[test]
    fn tier_is_monotonic(a in 0.0f32..=100.0, b in 0.0f32..=100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(tier(lo) <= tier(hi));
        prop_assert_eq!(tier(100.0), BinTier::Full);
    }
}

// ── Wire boundary ─────────────────────────────────────────────

proptest! {
    /// Arbitrary bytes never panic the decoder, and every yielded frame
    /// respects the size limit.
    #[test]
    fn decoder_survives_garbage(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
    ) {
        let mut decoder = FrameDecoder::new();
        for chunk in &chunks {
            for frame in decoder.feed(chunk) {
                prop_assert!(!frame.is_empty());
                prop_assert!(frame.len() <= MAX_FRAME_SIZE);
                let _ = decode_inbound(&frame);
            }
        }
    }

    /// However the stream is split, the same frames come out.
    #[test]
    fn framing_is_split_invariant(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..40), 1..6),
        split in 1usize..17,
    ) {
        let wire: Vec<u8> = payloads
            .iter()
            .flat_map(|p| encode_frame(p).unwrap_or_default())
            .collect();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for chunk in wire.chunks(split) {
            out.extend(decoder.feed(chunk));
        }
        prop_assert_eq!(out, payloads);
    }

    /// Confidence is always clamped into [0, 100].
    #[test]
    fn detection_confidence_is_clamped(confidence in -1.0e6f64..1.0e6) {
        let json = format!(
            r#"{{"event":"detection_event","data":{{"label":"gloves","confidence":{confidence}}}}}"#
        );
        match decode_inbound(json.as_bytes()) {
            Ok(Some(InboundEvent::Detection(ev))) => {
                prop_assert!((0.0..=100.0).contains(&ev.confidence));
            }
            other => prop_assert!(false, "unexpected decode result: {:?}", other),
        }
    }
}

// ── Session workflow ──────────────────────────────────────────

/// Always-up link whose inbound bytes are queued by the test.
#[derive(Default)]
struct FeedLink {
    inbound: VecDeque<u8>,
}

impl FeedLink {
    fn push(&mut self, json: &str) {
        self.inbound
            .extend(encode_frame(json.as_bytes()).unwrap_or_default());
    }
}

impl Transport for FeedLink {
    type Error = ();

    fn open(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

struct NoSink;

impl EventSink for NoSink {
    fn emit(&mut self, _event: &ControllerEvent) {}
}

#[derive(Debug, Clone)]
enum Step {
    Operator(OperatorInput),
    Detect(&'static str),
    ChoicePrompt,
    Warning,
    BackendError,
    /// Let this much time pass before the next tick.
    Wait(u64),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Operator(OperatorInput::Begin)),
        Just(Step::Operator(OperatorInput::Confirm)),
        Just(Step::Operator(OperatorInput::Disambiguate(Disambiguation::Used))),
        Just(Step::Operator(OperatorInput::Disambiguate(Disambiguation::Unused))),
        Just(Step::Operator(OperatorInput::Continue)),
        Just(Step::Operator(OperatorInput::End)),
        Just(Step::Operator(OperatorInput::AcknowledgeWarning)),
        Just(Step::Operator(OperatorInput::Cancel)),
        prop_oneof![
            Just("syringe"),
            Just("gloves"),
            Just("bandage"),
            Just("scissor"),
            Just("cotton"),
            Just("banana"),
            Just(""),
        ]
        .prop_map(Step::Detect),
        Just(Step::ChoicePrompt),
        Just(Step::Warning),
        Just(Step::BackendError),
        (1u64..40_000).prop_map(Step::Wait),
    ]
}

proptest! {
    /// Any interleaving of operator input and backend events leaves the
    /// session consistent: a command is in flight exactly while actuating,
    /// prompt flags match the phase, and the transient phase never sticks.
    #[test]
    fn random_sessions_stay_consistent(
        steps in proptest::collection::vec(arb_step(), 1..60),
        auto_act in any::<bool>(),
    ) {
        let config = SystemConfig { auto_act, ..SystemConfig::default() };
        let mut sink = NoSink;
        let mut ctl = Controller::new(config, FeedLink::default());
        ctl.start(0, &mut sink);
        let mut now = 0u64;

        for step in &steps {
            now += 10;
            let link = ctl.channel_mut().transport_mut();
            match step {
                Step::Operator(input) => {
                    let _ = ctl.handle_operator(*input, now, &mut sink);
                }
                Step::Detect(label) => link.push(&format!(
                    r#"{{"event":"detection_event","data":{{"label":"{label}","confidence":90}}}}"#
                )),
                Step::ChoicePrompt => link.push(r#"{"event":"choice_prompt","data":{}}"#),
                Step::Warning => link.push(r#"{"event":"multiple_waste_warning","data":{}}"#),
                Step::BackendError => link.push(
                    r#"{"event":"server_message","data":{"type":"error","message":"Failed"}}"#,
                ),
                Step::Wait(ms) => now += ms,
            }
            ctl.tick(now, &mut sink);

            let phase = ctl.phase();
            let session = ctl.session();
            prop_assert_eq!(session.phase, phase);
            prop_assert_eq!(ctl.in_flight().is_some(), phase == PhaseId::ActionInProgress);
            prop_assert_eq!(
                session.awaiting_disambiguation,
                phase == PhaseId::AwaitingDisambiguation
            );
            prop_assert_eq!(
                session.awaiting_continuation_choice,
                phase == PhaseId::AwaitingContinuation
            );
            prop_assert_ne!(phase, PhaseId::PendingAction);
        }
    }
}

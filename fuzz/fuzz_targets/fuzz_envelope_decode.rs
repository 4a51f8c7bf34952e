//! Fuzz target: `decode_inbound`
//!
//! Arbitrary payloads must decode to a typed event, `None`, or a typed
//! error; never a panic.  Decoded detections always carry a clamped
//! confidence.
//!
//! cargo fuzz run fuzz_envelope_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use sterisort::channel::messages::{InboundEvent, decode_inbound};

fuzz_target!(|data: &[u8]| {
    if let Ok(Some(InboundEvent::Detection(ev))) = decode_inbound(data) {
        assert!((0.0..=100.0).contains(&ev.confidence));
    }
});

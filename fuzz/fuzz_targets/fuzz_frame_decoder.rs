//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at a fuzzer-chosen point, and asserts that it never panics and never
//! yields an empty or oversize frame.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use sterisort::channel::codec::{FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(rest.len());
    let (head, tail) = rest.split_at(split);

    let mut decoder = FrameDecoder::new();
    for chunk in [head, tail] {
        for frame in decoder.feed(chunk) {
            assert!(!frame.is_empty(), "decoder must not yield empty payload");
            assert!(frame.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
        }
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(rest);
});

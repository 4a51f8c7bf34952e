//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬───────────────────────────┐
//! │ Length (4B)│ JSON envelope (N B)       │
//! │ LE u32     │                           │
//! └────────────┴───────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete frames.  A
//! single `Transport::read` may return part of a header, part of a payload,
//! or several frames back to back; every complete frame is returned.

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    rejected: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
            rejected: 0,
        }
    }

    /// Feed bytes into the decoder and return every frame they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;
                        if expected == 0 || expected > MAX_FRAME_SIZE {
                            // Invalid length: resynchronise on the next header.
                            self.rejected = self.rejected.wrapping_add(1);
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }
                        self.payload_buf.clear();
                        self.payload_buf.reserve(expected);
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let needed = *expected - self.payload_buf.len();
                    let to_copy = needed.min(data.len() - offset);
                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload_buf.len() == *expected {
                        frames.push(core::mem::take(&mut self.payload_buf));
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }

        frames
    }

    /// Drop any partial frame (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }

    /// Headers discarded for a zero or oversize length.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

/// Prefix `payload` with its length.  `None` if it exceeds [`MAX_FRAME_SIZE`]
/// or is empty.
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return None;
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

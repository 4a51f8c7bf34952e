//! Scripted backend link for integration tests.
//!
//! Inbound events are queued as framed JSON; every frame the controller
//! writes is decoded back into its event name so tests can assert on the
//! full command history without a socket.

use std::collections::VecDeque;

use sterisort::app::events::ControllerEvent;
use sterisort::app::ports::EventSink;
use sterisort::channel::codec::{FrameDecoder, encode_frame};
use sterisort::channel::transport::Transport;

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Refused,
    Dropped,
    Closed,
}

#[derive(Default)]
pub struct MockLink {
    open: bool,
    /// Number of upcoming `open()` calls that fail.
    refuse_opens: u32,
    /// Fail the next read, as if the peer vanished.
    drop_pending: bool,
    inbound: VecDeque<u8>,
    decoder: FrameDecoder,
    written: Vec<String>,
    pub opens: u32,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one backend event.  `data` is a JSON object literal.
    pub fn push_event(&mut self, event: &str, data: &str) {
        let json = format!(r#"{{"event":"{event}","data":{data}}}"#);
        self.push_raw(json.as_bytes());
    }

    /// Queue an arbitrary payload, framed.
    pub fn push_raw(&mut self, payload: &[u8]) {
        let frame = encode_frame(payload).expect("payload fits a frame");
        self.inbound.extend(frame);
    }

    pub fn detection(&mut self, label: &str, confidence: f32) {
        self.push_event(
            "detection_event",
            &format!(r#"{{"label":"{label}","confidence":{confidence},"timestamp":1700000000.5}}"#),
        );
    }

    pub fn status(&mut self, message: &str) {
        self.push_event(
            "server_message",
            &format!(r#"{{"type":"status","message":"{message}"}}"#),
        );
    }

    pub fn refuse_next_opens(&mut self, n: u32) {
        self.refuse_opens = n;
    }

    /// Make the next read fail.
    pub fn drop_link(&mut self) {
        self.drop_pending = true;
    }

    /// Event names of every frame written so far.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn count_written(&self, event: &str) -> usize {
        self.written.iter().filter(|e| *e == event).count()
    }

    pub fn clear_written(&mut self) {
        self.written.clear();
    }
}

impl Transport for MockLink {
    type Error = LinkError;

    fn open(&mut self) -> Result<(), LinkError> {
        if self.refuse_opens > 0 {
            self.refuse_opens -= 1;
            return Err(LinkError::Refused);
        }
        self.open = true;
        self.opens += 1;
        self.drop_pending = false;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        if self.drop_pending {
            self.drop_pending = false;
            self.open = false;
            self.inbound.clear();
            return Err(LinkError::Dropped);
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        for frame in self.decoder.feed(data) {
            let envelope: serde_json::Value =
                serde_json::from_slice(&frame).expect("controller writes JSON envelopes");
            let name = envelope["event"].as_str().unwrap_or_default().to_string();
            self.written.push(name);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<ControllerEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &ControllerEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&ControllerEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ControllerEvent) {
        self.events.push(event.clone());
    }
}

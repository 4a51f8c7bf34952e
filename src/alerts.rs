//! Transient alert surface.
//!
//! One slot per [`AlertKind`].  Raising an alert of a kind that is already
//! shown replaces it and restarts its dwell timer; different kinds coexist.
//! Alerts expire after a fixed dwell time even if the underlying condition
//! persists; the condition itself (e.g. a bin tier) is displayed elsewhere.

use log::debug;

/// Maximum stored message length (bytes).
pub const ALERT_TEXT_CAP: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertKind {
    MultipleWaste = 0,
    BinFull = 1,
}

impl AlertKind {
    pub const COUNT: usize = 2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: heapless::String<ALERT_TEXT_CAP>,
    pub raised_at_ms: u64,
}

pub struct AlertSurface {
    dwell_ms: u64,
    slots: [Option<Alert>; AlertKind::COUNT],
}

impl AlertSurface {
    pub fn new(dwell_ms: u64) -> Self {
        Self {
            dwell_ms,
            slots: [None, None],
        }
    }

    pub fn set_dwell(&mut self, dwell_ms: u64) {
        self.dwell_ms = dwell_ms;
    }

    /// Show `message` for `kind`, replacing any alert of the same kind.
    pub fn raise(&mut self, kind: AlertKind, message: &str, now_ms: u64) -> &Alert {
        let alert = Alert {
            kind,
            message: truncate(message),
            raised_at_ms: now_ms,
        };
        debug!("ALERT | raise {:?}: {}", kind, alert.message);
        self.slots[kind as usize].insert(alert)
    }

    /// Drop every alert whose dwell time has elapsed.  Returns how many expired.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let dwell = self.dwell_ms;
        let mut expired = 0;
        for slot in &mut self.slots {
            if slot
                .as_ref()
                .is_some_and(|a| now_ms.saturating_sub(a.raised_at_ms) >= dwell)
            {
                *slot = None;
                expired += 1;
            }
        }
        expired
    }

    pub fn get(&self, kind: AlertKind) -> Option<&Alert> {
        self.slots[kind as usize].as_ref()
    }

    pub fn active(&self) -> impl Iterator<Item = &Alert> {
        self.slots.iter().flatten()
    }
}

fn truncate(message: &str) -> heapless::String<ALERT_TEXT_CAP> {
    let mut out = heapless::String::new();
    for ch in message.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

//! Channel manager: the single logical link to the backend.
//!
//! ```text
//!  Transport ──bytes──▶ FrameDecoder ──frames──▶ decode_inbound ──▶ ChannelEvent
//!  OutboundCommand ──▶ encode_outbound ──▶ encode_frame ──▶ Transport
//! ```
//!
//! ## Reconnection policy
//!
//! On transport loss the manager emits [`ChannelEvent::Disconnected`] and
//! retries with exponential backoff (initial → ×2 per attempt → capped) up
//! to `max_retries` attempts, then parks in [`LinkState::Failed`].  A manual
//! [`connect`](ChannelManager::connect) restarts the retry budget.
//!
//! On every successful connect the standing subscriptions are issued again.
//! Nothing is assumed to survive a reconnect.

pub mod codec;
pub mod messages;
pub mod transport;

use core::fmt;
use log::{debug, error, info, warn};

use crate::config::SystemConfig;
use codec::{FrameDecoder, encode_frame};
use messages::{DecodeError, InboundEvent, OutboundCommand, decode_inbound, encode_outbound};
use transport::Transport;

/// Issued, in order, on first connect and on every reconnect.
pub const STANDING_SUBSCRIPTIONS: [OutboundCommand; 2] = [
    OutboundCommand::StartDetection,
    OutboundCommand::SubscribeUltrasonic,
];

/// Upper bound on transport reads per poll so a chatty backend cannot
/// starve the control loop.
const MAX_READS_PER_POLL: usize = 16;
const READ_CHUNK: usize = 4096;

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// `attempt` is the 1-based number of the next retry.
    Reconnecting { attempt: u32, retry_at_ms: u64 },
    Failed,
}

impl LinkState {
    pub fn is_up(self) -> bool {
        self == Self::Connected
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting { .. } => "RECONNECTING",
            Self::Failed => "OFFLINE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl ReconnectPolicy {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            max_retries: config.reconnect_max_retries,
            initial_backoff_ms: config.reconnect_initial_backoff_ms,
            max_backoff_ms: config.reconnect_max_backoff_ms,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Errors and events
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The link is not up; the write was rejected, not queued.
    NotConnected,
    /// The transport failed to open.
    ConnectFailed,
    /// The transport failed mid-write; the link is now down.
    WriteFailed,
    /// The encoded command does not fit in one frame.
    FrameTooLarge,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "backend link not connected"),
            Self::ConnectFailed => write!(f, "could not open backend link"),
            Self::WriteFailed => write!(f, "write to backend failed"),
            Self::FrameTooLarge => write!(f, "command exceeds frame size"),
        }
    }
}

impl std::error::Error for ChannelError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// Retry budget exhausted; only a manual connect leaves this.
    Failed,
    Inbound(InboundEvent),
    /// A frame arrived but its payload was rejected.
    Rejected(DecodeError),
}

// ───────────────────────────────────────────────────────────────
// Manager
// ───────────────────────────────────────────────────────────────

pub struct ChannelManager<T: Transport> {
    transport: T,
    policy: ReconnectPolicy,
    state: LinkState,
    decoder: FrameDecoder,
    backoff_ms: u64,
    /// Events produced outside `poll` (connect/disconnect/send), drained first.
    pending: Vec<ChannelEvent>,
    /// Time of the latest `poll`/`connect`, used to schedule retries after a
    /// failed `send`.
    last_now_ms: u64,
    connects: u32,
}

impl<T: Transport> ChannelManager<T> {
    pub fn new(transport: T, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            backoff_ms: policy.initial_backoff_ms,
            policy,
            state: LinkState::Disconnected,
            decoder: FrameDecoder::new(),
            pending: Vec::new(),
            last_now_ms: 0,
            connects: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_up()
    }

    /// Successful connects since construction (first connect included).
    pub fn connect_count(&self) -> u32 {
        self.connects
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Open the link.  On failure the manager enters its retry cycle with a
    /// fresh budget.
    pub fn connect(&mut self, now_ms: u64) -> Result<(), ChannelError> {
        self.last_now_ms = now_ms;
        if self.state == LinkState::Connected {
            return Ok(());
        }
        self.backoff_ms = self.policy.initial_backoff_ms;
        info!("CHANNEL | connecting");
        self.state = LinkState::Connecting;

        match self.transport.open() {
            Ok(()) => {
                self.link_up();
                Ok(())
            }
            Err(e) => {
                error!("CHANNEL | connect failed: {:?}", e);
                self.schedule_retry(1, now_ms);
                Err(ChannelError::ConnectFailed)
            }
        }
    }

    /// Close the link on request.  No reconnect is scheduled.
    pub fn disconnect(&mut self) {
        let was_up = self.state.is_up();
        self.transport.close();
        self.decoder.reset();
        self.state = LinkState::Disconnected;
        if was_up {
            self.pending.push(ChannelEvent::Disconnected);
        }
        info!("CHANNEL | disconnected");
    }

    /// Drive the link: read and decode inbound frames, or run a due retry.
    pub fn poll(&mut self, now_ms: u64) -> Vec<ChannelEvent> {
        self.last_now_ms = now_ms;
        let mut events = core::mem::take(&mut self.pending);

        match self.state {
            LinkState::Connected => self.read_frames(now_ms, &mut events),
            LinkState::Reconnecting { attempt, retry_at_ms } if now_ms >= retry_at_ms => {
                info!(
                    "CHANNEL | reconnect attempt {}/{} (backoff {}ms)",
                    attempt, self.policy.max_retries, self.backoff_ms
                );
                match self.transport.open() {
                    Ok(()) => self.link_up(),
                    Err(e) => {
                        debug!("CHANNEL | reconnect attempt {} failed: {:?}", attempt, e);
                        self.backoff_ms = self
                            .backoff_ms
                            .saturating_mul(2)
                            .min(self.policy.max_backoff_ms);
                        self.schedule_retry(attempt + 1, now_ms);
                    }
                }
            }
            _ => {}
        }

        events.append(&mut self.pending);
        events
    }

    /// Non-blocking write of one command.  The frame goes out whole or the
    /// link is dropped.
    pub fn send(&mut self, command: OutboundCommand) -> Result<(), ChannelError> {
        if !self.state.is_up() {
            warn!("CHANNEL | {} rejected: link down", command.event_name());
            return Err(ChannelError::NotConnected);
        }
        let frame =
            encode_frame(&encode_outbound(command)).ok_or(ChannelError::FrameTooLarge)?;
        if self.write_frame(&frame).is_err() {
            self.link_lost();
            return Err(ChannelError::WriteFailed);
        }
        debug!("CHANNEL | -> {}", command.event_name());
        Ok(())
    }

    pub fn start_detection(&mut self) -> Result<(), ChannelError> {
        self.send(OutboundCommand::StartDetection)
    }

    pub fn end_detection(&mut self) -> Result<(), ChannelError> {
        self.send(OutboundCommand::EndDetection)
    }

    pub fn subscribe_telemetry(&mut self) -> Result<(), ChannelError> {
        self.send(OutboundCommand::SubscribeUltrasonic)
    }

    pub fn unsubscribe_telemetry(&mut self) -> Result<(), ChannelError> {
        self.send(OutboundCommand::UnsubscribeUltrasonic)
    }

    // ── Internals ─────────────────────────────────────────────

    fn link_up(&mut self) {
        self.state = LinkState::Connected;
        self.backoff_ms = self.policy.initial_backoff_ms;
        self.decoder.reset();
        self.connects = self.connects.saturating_add(1);
        info!("CHANNEL | connected (#{})", self.connects);
        self.pending.push(ChannelEvent::Connected);

        for command in STANDING_SUBSCRIPTIONS {
            if let Err(e) = self.send(command) {
                warn!("CHANNEL | standing {} not issued: {}", command.event_name(), e);
                return;
            }
        }
    }

    fn link_lost(&mut self) {
        if !self.state.is_up() {
            return;
        }
        warn!("CHANNEL | connection lost, entering reconnect");
        self.transport.close();
        self.decoder.reset();
        self.backoff_ms = self.policy.initial_backoff_ms;
        self.pending.push(ChannelEvent::Disconnected);
        self.schedule_retry(1, self.last_now_ms);
    }

    fn schedule_retry(&mut self, attempt: u32, now_ms: u64) {
        if attempt > self.policy.max_retries {
            error!(
                "CHANNEL | giving up after {} attempts",
                self.policy.max_retries
            );
            self.state = LinkState::Failed;
            self.pending.push(ChannelEvent::Failed);
            return;
        }
        self.state = LinkState::Reconnecting {
            attempt,
            retry_at_ms: now_ms.saturating_add(self.backoff_ms),
        };
    }

    fn read_frames(&mut self, now_ms: u64, events: &mut Vec<ChannelEvent>) {
        let mut buf = [0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_POLL {
            let n = match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("CHANNEL | read failed: {:?}", e);
                    self.last_now_ms = now_ms;
                    self.link_lost();
                    return;
                }
            };
            for frame in self.decoder.feed(&buf[..n]) {
                match decode_inbound(&frame) {
                    Ok(Some(event)) => {
                        debug!("CHANNEL | <- {}", event.name());
                        events.push(ChannelEvent::Inbound(event));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("CHANNEL | rejected frame: {}", e);
                        events.push(ChannelEvent::Rejected(e));
                    }
                }
            }
        }
    }

    /// Write one whole frame.  A transport that stops taking bytes before
    /// the frame is out has left a partial frame on the wire, so the write
    /// counts as failed and the link must be reset.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ()> {
        let mut rest = frame;
        while !rest.is_empty() {
            match self.transport.write(rest) {
                Ok(0) => {
                    warn!(
                        "CHANNEL | write stalled, {} of {} bytes unsent",
                        rest.len(),
                        frame.len()
                    );
                    return Err(());
                }
                Ok(n) => rest = &rest[n.min(rest.len())..],
                Err(e) => {
                    warn!("CHANNEL | write failed: {:?}", e);
                    return Err(());
                }
            }
        }
        self.transport.flush().map_err(|e| {
            warn!("CHANNEL | flush failed: {:?}", e);
        })
    }
}

//! Socket.IO transport adapter.
//!
//! The vision/actuation backend serves Socket.IO over a websocket
//! (Engine.IO v4, websocket transport only).  This adapter speaks that
//! protocol and hands the channel manager the same length-prefixed
//! envelope stream every other [`Transport`] carries, so framing and
//! payload validation stay in one place.
//!
//! ```text
//!  ws text  42["detection_event",{..}]  ──▶  [len]{"event":"detection_event","data":{..}}
//!  [len]{"event":"THROW_SYRINGE","data":{}}  ──▶  ws text  42["THROW_SYRINGE"]
//! ```
//!
//! ## Connection model
//!
//! 1. `open()` connects with a short timeout, upgrades to a websocket on
//!    the Engine.IO path, waits for the Engine.IO open packet and joins the
//!    default namespace.  All of that is blocking and bounded.
//! 2. The socket is then switched to non-blocking mode; `read()` drains
//!    whatever packets are waiting and answers heartbeat pings.
//! 3. No packet for longer than the server's ping interval plus ping
//!    timeout means the link is dead.

use core::fmt;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use tungstenite::{Message, WebSocket};

use crate::channel::codec::{FrameDecoder, encode_frame};
use crate::channel::messages::Envelope;
use crate::channel::transport::Transport;

/// Upper bound on the TCP connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Per-packet read timeout while the handshake runs.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
/// Packets tolerated before the namespace join is acknowledged.
const HANDSHAKE_MAX_PACKETS: usize = 16;
/// Packets drained per `read()` call.
const MAX_PACKETS_PER_READ: usize = 32;

const ENGINE_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";
const NAMESPACE_CONNECT: &str = "40";
const PONG: &str = "3";

/// Engine.IO defaults, used when the open packet omits them.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketIoError {
    /// Address did not resolve to anything.
    Resolve,
    /// Socket I/O failure.
    Io,
    /// Websocket upgrade or Engine.IO open failed.
    Handshake,
    /// The backend refused the namespace join.
    Rejected,
    /// A frame from the channel was not an envelope.
    Protocol,
    /// No heartbeat within the negotiated window.
    Timeout,
    /// Operation requires an open socket.
    NotConnected,
    /// The backend closed the session.
    Closed,
}

impl fmt::Display for SocketIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "backend address did not resolve"),
            Self::Io => write!(f, "websocket I/O error"),
            Self::Handshake => write!(f, "Socket.IO handshake failed"),
            Self::Rejected => write!(f, "backend refused the namespace join"),
            Self::Protocol => write!(f, "outbound frame is not an envelope"),
            Self::Timeout => write!(f, "backend heartbeat timed out"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Closed => write!(f, "session closed by backend"),
        }
    }
}

impl std::error::Error for SocketIoError {}

// ───────────────────────────────────────────────────────────────
// Packet codec
// ───────────────────────────────────────────────────────────────

/// One Engine.IO text packet, with the Socket.IO layer unwrapped.
#[derive(Debug, PartialEq)]
enum Packet {
    /// Engine.IO open; carries the dead-link window.
    Open { heartbeat_ms: u64 },
    Close,
    Ping,
    /// Namespace join acknowledged.
    Connected,
    ConnectError,
    Disconnect,
    /// An event on the default namespace, as a JSON envelope.
    Event(Vec<u8>),
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPayload {
    #[serde(default = "default_ping_interval")]
    ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

fn parse_packet(text: &str) -> Packet {
    let Some(kind) = text.chars().next() else {
        return Packet::Other;
    };
    let body = &text[kind.len_utf8()..];
    match kind {
        '0' => {
            let heartbeat_ms = serde_json::from_str::<OpenPayload>(body).map_or(
                DEFAULT_PING_INTERVAL_MS + DEFAULT_PING_TIMEOUT_MS,
                |open| open.ping_interval.saturating_add(open.ping_timeout),
            );
            Packet::Open { heartbeat_ms }
        }
        '1' => Packet::Close,
        '2' => Packet::Ping,
        '4' => parse_socket_packet(body),
        _ => Packet::Other,
    }
}

fn parse_socket_packet(body: &str) -> Packet {
    let Some(kind) = body.chars().next() else {
        return Packet::Other;
    };
    let rest = &body[kind.len_utf8()..];
    match kind {
        '0' => Packet::Connected,
        '1' => Packet::Disconnect,
        // Other namespaces are not ours.
        '2' if rest.starts_with('/') => Packet::Other,
        // Unparseable events go through as-is so the channel reports them.
        '2' => Packet::Event(event_envelope(rest).unwrap_or_else(|| rest.as_bytes().to_vec())),
        '4' => Packet::ConnectError,
        _ => Packet::Other,
    }
}

/// `[ack id]["name", data]` → `{"event":"name","data":data}`.
fn event_envelope(body: &str) -> Option<Vec<u8>> {
    let start = body.find('[')?;
    if !body[..start].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let args: Vec<Value> = serde_json::from_str(&body[start..]).ok()?;
    let mut args = args.into_iter();
    let Value::String(event) = args.next()? else {
        return None;
    };
    let data = args.next().unwrap_or(Value::Null);
    serde_json::to_vec(&Envelope { event, data }).ok()
}

/// `{"event":"name","data":data}` → `42["name"]`, or `42["name",data]` when
/// there is a payload.  The backend's handlers take no arguments for an
/// empty payload.
fn event_packet(envelope: &[u8]) -> Option<String> {
    let Envelope { event, data } = serde_json::from_slice(envelope).ok()?;
    let args = match data {
        Value::Null => vec![Value::String(event)],
        Value::Object(map) if map.is_empty() => vec![Value::String(event)],
        data => vec![Value::String(event), data],
    };
    serde_json::to_string(&args).ok().map(|json| format!("42{json}"))
}

// ───────────────────────────────────────────────────────────────
// SocketIoTransport
// ───────────────────────────────────────────────────────────────

pub struct SocketIoTransport {
    addr: String,
    socket: Option<WebSocket<TcpStream>>,
    /// Framed envelopes waiting for `read()`.
    inbound: VecDeque<u8>,
    /// Reassembles the frames the channel writes.
    outbound: FrameDecoder,
    heartbeat: Duration,
    last_rx: Instant,
}

impl SocketIoTransport {
    /// Transport for `addr` (`host:port`).  Nothing is opened yet.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            socket: None,
            inbound: VecDeque::new(),
            outbound: FrameDecoder::new(),
            heartbeat: Duration::from_millis(DEFAULT_PING_INTERVAL_MS + DEFAULT_PING_TIMEOUT_MS),
            last_rx: Instant::now(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn drop_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }

    /// Engine.IO open, then join the default namespace.  Events that slip in
    /// before the acknowledgement are kept.
    fn handshake(&mut self, socket: &mut WebSocket<TcpStream>) -> Result<Duration, SocketIoError> {
        let mut heartbeat = None;
        for _ in 0..HANDSHAKE_MAX_PACKETS {
            let message = socket.read().map_err(|e| match e {
                tungstenite::Error::Io(ref io)
                    if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    SocketIoError::Timeout
                }
                other => {
                    warn!("SIO: handshake read failed: {}", other);
                    SocketIoError::Handshake
                }
            })?;
            let Message::Text(text) = message else {
                continue;
            };
            match parse_packet(text.as_str()) {
                Packet::Open { heartbeat_ms } => {
                    heartbeat = Some(Duration::from_millis(heartbeat_ms));
                    send_text(socket, NAMESPACE_CONNECT.to_string())?;
                }
                Packet::Connected => {
                    if let Some(window) = heartbeat {
                        return Ok(window);
                    }
                }
                Packet::Ping => send_text(socket, PONG.to_string())?,
                Packet::Event(frame) => push_frame(&mut self.inbound, &frame),
                Packet::ConnectError => return Err(SocketIoError::Rejected),
                Packet::Close | Packet::Disconnect => return Err(SocketIoError::Closed),
                Packet::Other => {}
            }
        }
        Err(SocketIoError::Handshake)
    }

    fn pump(&mut self) -> Result<(), SocketIoError> {
        let socket = self.socket.as_mut().ok_or(SocketIoError::NotConnected)?;
        for _ in 0..MAX_PACKETS_PER_READ {
            let message = match socket.read() {
                Ok(message) => message,
                Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => break,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(SocketIoError::Closed);
                }
                Err(e) => {
                    warn!("SIO: read failed: {}", e);
                    return Err(SocketIoError::Io);
                }
            };
            self.last_rx = Instant::now();
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return Err(SocketIoError::Closed),
                // Websocket pings are answered by tungstenite itself.
                _ => continue,
            };
            match parse_packet(text.as_str()) {
                Packet::Event(frame) => push_frame(&mut self.inbound, &frame),
                Packet::Ping => send_text(socket, PONG.to_string())?,
                Packet::Close | Packet::Disconnect => {
                    info!("SIO: backend ended the session");
                    return Err(SocketIoError::Closed);
                }
                other => debug!("SIO: ignoring {:?}", other),
            }
        }
        if self.last_rx.elapsed() > self.heartbeat {
            warn!("SIO: no packet for {:?}, link presumed dead", self.heartbeat);
            return Err(SocketIoError::Timeout);
        }
        Ok(())
    }
}

fn push_frame(inbound: &mut VecDeque<u8>, envelope: &[u8]) {
    match encode_frame(envelope) {
        Some(frame) => inbound.extend(frame),
        None => warn!("SIO: dropping {} byte event (empty or oversize)", envelope.len()),
    }
}

fn send_text(socket: &mut WebSocket<TcpStream>, text: String) -> Result<(), SocketIoError> {
    match socket.send(Message::text(text)) {
        Ok(()) => Ok(()),
        // Queued in the websocket write buffer; the next call flushes it.
        Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => {
            warn!("SIO: send failed: {}", e);
            Err(SocketIoError::Io)
        }
    }
}

impl Transport for SocketIoTransport {
    type Error = SocketIoError;

    fn open(&mut self) -> Result<(), SocketIoError> {
        self.drop_socket();
        self.inbound.clear();
        self.outbound.reset();

        let target = self
            .addr
            .to_socket_addrs()
            .map_err(|_| SocketIoError::Resolve)?
            .next()
            .ok_or(SocketIoError::Resolve)?;
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT).map_err(|e| {
            warn!("SIO: connect to {} failed: {}", target, e);
            SocketIoError::Io
        })?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|_| SocketIoError::Io)?;
        let _ = stream.set_nodelay(true);

        let url = format!("ws://{}{}", self.addr, ENGINE_IO_PATH);
        let (mut socket, _) = tungstenite::client(url.as_str(), stream).map_err(|e| {
            warn!("SIO: websocket upgrade failed: {}", e);
            SocketIoError::Handshake
        })?;

        let heartbeat = match self.handshake(&mut socket) {
            Ok(window) => window,
            Err(e) => {
                let _ = socket.close(None);
                return Err(e);
            }
        };
        socket
            .get_ref()
            .set_read_timeout(None)
            .map_err(|_| SocketIoError::Io)?;
        socket
            .get_ref()
            .set_nonblocking(true)
            .map_err(|_| SocketIoError::Io)?;

        info!("SIO: connected to {} (heartbeat {:?})", target, heartbeat);
        self.heartbeat = heartbeat;
        self.last_rx = Instant::now();
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.is_some() {
            info!("SIO: closing session with {}", self.addr);
        }
        self.drop_socket();
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketIoError> {
        if let Err(e) = self.pump() {
            self.drop_socket();
            return Err(e);
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    /// Every complete frame in `data` goes out as one event packet.  A
    /// trailing partial frame is held until the rest arrives.
    fn write(&mut self, data: &[u8]) -> Result<usize, SocketIoError> {
        let socket = self.socket.as_mut().ok_or(SocketIoError::NotConnected)?;
        let frames = self.outbound.feed(data);
        let mut result = Ok(data.len());
        for frame in frames {
            let sent = event_packet(&frame)
                .ok_or(SocketIoError::Protocol)
                .and_then(|packet| send_text(socket, packet));
            if let Err(e) = sent {
                result = Err(e);
                break;
            }
        }
        if result.is_err() {
            self.drop_socket();
        }
        result
    }

    fn flush(&mut self) -> Result<(), SocketIoError> {
        let socket = self.socket.as_mut().ok_or(SocketIoError::NotConnected)?;
        match socket.flush() {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                warn!("SIO: flush failed: {}", e);
                Err(SocketIoError::Io)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

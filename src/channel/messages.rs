//! Wire messages exchanged with the backend.
//!
//! Every frame carries one JSON envelope:
//!
//! ```text
//! { "event": "<name>", "data": <payload> }
//! ```
//!
//! Inbound payloads are validated here and converted into closed types.
//! Anything that does not fit is rejected with a [`DecodeError`]; unknown
//! event names are not an error and decode to `None`.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bins::TelemetryReading;
use crate::dispatch::ActionCommand;

/// Maximum stored length of a backend message / label.
pub const TEXT_CAP: usize = 160;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// One classifier output.  Confidence is clamped into `[0, 100]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub label: Option<String>,
    pub confidence: f32,
    /// Backend wall clock, milliseconds since the epoch (0 when absent).
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessageKind {
    Status,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Camera frame for display only; the payload is not retained.
    Frame,
    Detection(DetectionEvent),
    ServerMessage {
        kind: ServerMessageKind,
        message: String,
    },
    /// The backend expects the continue-or-end decision now.
    ChoicePrompt,
    Telemetry(TelemetryReading),
    BinAlert { bin: String },
    MultipleWasteWarning { message: Option<String> },
    Handshake { message: Option<String> },
}

impl InboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Frame => "frame_update",
            Self::Detection(_) => "detection_event",
            Self::ServerMessage { .. } => "server_message",
            Self::ChoicePrompt => "choice_prompt",
            Self::Telemetry(_) => "ultrasonic_update",
            Self::BinAlert { .. } => "bin_alert",
            Self::MultipleWasteWarning { .. } => "multiple_waste_warning",
            Self::Handshake { .. } => "handshake",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame is not a JSON envelope.
    Malformed,
    /// A known event carried a payload with a missing or mistyped field.
    InvalidPayload {
        event: &'static str,
        field: &'static str,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "frame is not a JSON envelope"),
            Self::InvalidPayload { event, field } => {
                write!(f, "{event}: invalid or missing '{field}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a frame payload.  `Ok(None)` means a well-formed envelope for an
/// event this controller does not consume.
pub fn decode_inbound(payload: &[u8]) -> Result<Option<InboundEvent>, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(payload).map_err(|_| DecodeError::Malformed)?;
    let data = &envelope.data;

    let event = match envelope.event.as_str() {
        "frame" | "frame_update" => InboundEvent::Frame,
        "detection_event" => InboundEvent::Detection(decode_detection(data)?),
        "server_message" => decode_server_message(data)?,
        "choice_prompt" => InboundEvent::ChoicePrompt,
        "ultrasonic_update" => InboundEvent::Telemetry(decode_telemetry(data)?),
        "bin_alert" => {
            let obj = object(data, "bin_alert")?;
            let bin = text(obj, "bin_alert", "bin")?
                .ok_or(DecodeError::InvalidPayload { event: "bin_alert", field: "bin" })?;
            InboundEvent::BinAlert { bin }
        }
        "multiple_waste_warning" => InboundEvent::MultipleWasteWarning {
            message: optional_message(data, "multiple_waste_warning")?,
        },
        "handshake" => InboundEvent::Handshake {
            message: optional_message(data, "handshake")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn object<'a>(data: &'a Value, event: &'static str) -> Result<&'a Map<String, Value>, DecodeError> {
    data.as_object()
        .ok_or(DecodeError::InvalidPayload { event, field: "data" })
}

/// Optional string field.  `null` and absent both read as `None`.
fn text(
    obj: &Map<String, Value>,
    event: &'static str,
    field: &'static str,
) -> Result<Option<String>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.chars().take(TEXT_CAP).collect())),
        Some(_) => Err(DecodeError::InvalidPayload { event, field }),
    }
}

/// Optional numeric field.
fn number(
    obj: &Map<String, Value>,
    event: &'static str,
    field: &'static str,
) -> Result<Option<f64>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or(DecodeError::InvalidPayload { event, field }),
    }
}

fn decode_detection(data: &Value) -> Result<DetectionEvent, DecodeError> {
    const EV: &str = "detection_event";
    let obj = object(data, EV)?;
    let label = text(obj, EV, "label")?;
    let confidence = number(obj, EV, "confidence")?.unwrap_or(0.0) as f32;
    let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 100.0) };
    // Seconds since the epoch, possibly fractional.
    let timestamp_ms = number(obj, EV, "timestamp")?
        .filter(|t| t.is_finite() && *t > 0.0)
        .map_or(0, |t| (t * 1_000.0) as u64);
    Ok(DetectionEvent {
        label,
        confidence,
        timestamp_ms,
    })
}

fn decode_server_message(data: &Value) -> Result<InboundEvent, DecodeError> {
    const EV: &str = "server_message";
    let obj = object(data, EV)?;
    let kind_text = text(obj, EV, "type")?.map(|t| t.to_ascii_lowercase());
    let kind = match kind_text.as_deref() {
        Some("status") => ServerMessageKind::Status,
        Some("error") => ServerMessageKind::Error,
        Some("warning") => ServerMessageKind::Warning,
        _ => return Err(DecodeError::InvalidPayload { event: EV, field: "type" }),
    };
    let message = text(obj, EV, "message")?.unwrap_or_default();
    Ok(InboundEvent::ServerMessage { kind, message })
}

fn decode_telemetry(data: &Value) -> Result<TelemetryReading, DecodeError> {
    const EV: &str = "ultrasonic_update";
    let obj = object(data, EV)?;
    let f = |field| number(obj, EV, field).map(|v| v.map(|x| x as f32));
    Ok(TelemetryReading {
        syringe_pct: f("syringe_pct")?,
        hazardous_pct: f("hazardous_pct")?,
        non_hazardous_pct: f("nonhazardous_pct")?,
        syringe_cm: f("syringe_cm")?,
        hazardous_cm: f("hazardous_cm")?,
        non_hazardous_cm: f("nonhazardous_cm")?,
    })
}

fn optional_message(data: &Value, event: &'static str) -> Result<Option<String>, DecodeError> {
    match data {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.chars().take(TEXT_CAP).collect())),
        Value::Object(obj) => text(obj, event, "message"),
        _ => Err(DecodeError::InvalidPayload { event, field: "message" }),
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget commands sent to the backend.  None carries a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundCommand {
    StartDetection,
    EndDetection,
    SubscribeUltrasonic,
    UnsubscribeUltrasonic,
    Action(ActionCommand),
}

impl OutboundCommand {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::StartDetection => "start_detection",
            Self::EndDetection => "end_detection",
            Self::SubscribeUltrasonic => "subscribe_ultrasonic",
            Self::UnsubscribeUltrasonic => "unsubscribe_ultrasonic",
            Self::Action(cmd) => cmd.wire_name(),
        }
    }
}

/// Serialise `command` into a JSON envelope (unframed).
pub fn encode_outbound(command: OutboundCommand) -> Vec<u8> {
    let envelope = Envelope {
        event: command.event_name().to_string(),
        data: Value::Object(Map::new()),
    };
    // An envelope of a string and an empty object always serialises.
    serde_json::to_vec(&envelope).unwrap_or_default()
}

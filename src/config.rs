//! System configuration parameters
//!
//! All tunable parameters for the sterilization/segregation controller.
//! Values are loaded from a JSON file through [`ConfigPort`](crate::app::ports::ConfigPort)
//! and fall back to [`SystemConfig::default`] when no file is present.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::classify::LabelSets;
use crate::dispatch::ActionCommand;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Backend link ---
    /// Backend address (`host:port`)
    pub backend_addr: String,
    /// Wire protocol spoken on `backend_addr`
    pub backend_protocol: BackendProtocol,
    /// Reconnect attempts before the link is declared failed
    pub reconnect_max_retries: u32,
    /// First reconnect delay (milliseconds); doubled on every failed attempt
    pub reconnect_initial_backoff_ms: u64,
    /// Upper bound for the reconnect delay (milliseconds)
    pub reconnect_max_backoff_ms: u64,

    // --- Workflow ---
    /// Dispatch as soon as an item is classified instead of waiting for
    /// the operator to confirm
    pub auto_act: bool,
    /// Waste label membership used by the classification resolver
    pub labels: LabelSets,
    /// Fallback completion windows, one per actuator command
    pub completion: CompletionWindows,

    // --- Alerts ---
    /// How long a raised alert stays on the alert surface (milliseconds)
    pub alert_dwell_ms: u64,

    // --- Bin geometry (ultrasonic distance → fill percentage) ---
    /// Distance from sensor to empty bin floor (cm)
    pub bin_height_cm: f32,
    /// Distance at or below which a bin counts as full (cm)
    pub bin_full_distance_cm: f32,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u64,
}

/// How the controller talks to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    /// Socket.IO events over a websocket (Engine.IO v4).
    #[default]
    SocketIo,
    /// Length-prefixed JSON envelopes over plain TCP.
    Framed,
}

/// Expected actuation time per command, used only when the backend never
/// reports completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionWindows {
    pub throw_syringe_ms: u64,
    pub throw_hazardous_ms: u64,
    pub throw_non_hazardous_ms: u64,
    pub sterilize_equipment_ms: u64,
}

impl CompletionWindows {
    /// Window for a given command.
    pub fn for_command(&self, command: ActionCommand) -> u64 {
        match command {
            ActionCommand::ThrowSyringe => self.throw_syringe_ms,
            ActionCommand::ThrowHazardous => self.throw_hazardous_ms,
            ActionCommand::ThrowNonHazardous => self.throw_non_hazardous_ms,
            ActionCommand::SterilizeEquipment => self.sterilize_equipment_ms,
        }
    }
}

impl Default for CompletionWindows {
    fn default() -> Self {
        Self {
            throw_syringe_ms: 10_000,
            throw_hazardous_ms: 11_000,
            throw_non_hazardous_ms: 11_000,
            sterilize_equipment_ms: 30_000,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Backend link
            backend_addr: String::from("127.0.0.1:5000"),
            backend_protocol: BackendProtocol::SocketIo,
            reconnect_max_retries: 8,
            reconnect_initial_backoff_ms: 1_000,
            reconnect_max_backoff_ms: 30_000,

            // Workflow
            auto_act: false,
            labels: LabelSets::default(),
            completion: CompletionWindows::default(),

            // Alerts
            alert_dwell_ms: 2_000,

            // Bin geometry
            bin_height_cm: 45.0,
            bin_full_distance_cm: 5.0,

            // Timing
            control_loop_interval_ms: 100, // 10 Hz
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_addr.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("backend_addr is empty"));
        }
        if self.reconnect_initial_backoff_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "reconnect_initial_backoff_ms must be > 0",
            ));
        }
        if self.reconnect_max_backoff_ms < self.reconnect_initial_backoff_ms {
            return Err(ConfigError::ValidationFailed(
                "reconnect_max_backoff_ms below initial backoff",
            ));
        }
        if self.alert_dwell_ms == 0 {
            return Err(ConfigError::ValidationFailed("alert_dwell_ms must be > 0"));
        }
        if self.control_loop_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "control_loop_interval_ms must be > 0",
            ));
        }
        if !(self.bin_full_distance_cm >= 0.0 && self.bin_height_cm > self.bin_full_distance_cm) {
            return Err(ConfigError::ValidationFailed(
                "bin_height_cm must exceed bin_full_distance_cm",
            ));
        }
        let c = &self.completion;
        if [
            c.throw_syringe_ms,
            c.throw_hazardous_ms,
            c.throw_non_hazardous_ms,
            c.sterilize_equipment_ms,
        ]
        .contains(&0)
        {
            return Err(ConfigError::ValidationFailed(
                "completion windows must be > 0",
            ));
        }
        self.labels.validate()
    }
}

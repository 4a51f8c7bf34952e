//! Port traits: the hexagonal boundary between the controller and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (event sinks, config storage, clocks) implement these
//! traits.  The backend link is the [`Transport`](crate::channel::transport::Transport)
//! trait, owned by the channel manager.  The [`Controller`](super::service::Controller)
//! consumes ports via generics, so the domain core never touches I/O
//! directly.

use crate::config::SystemConfig;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`ControllerEvent`](super::events::ControllerEvent)s
/// through this port.  Adapters decide where they go (log, console, UI).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::ControllerEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate values before persisting.  Invalid ranges
/// are rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Load configuration.  [`ConfigError::NotFound`] when nothing is stored.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds.  Only differences are meaningful.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first run).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}

//! Unified error types for the controller.
//!
//! A single `ControlError` enum that every subsystem converts into, keeping
//! the control loop's error handling uniform.  None of these are fatal:
//! the controller degrades to `Idle` or `Detecting` and keeps running.

use core::fmt;

use crate::app::ports::ConfigError;
use crate::channel::ChannelError;
use crate::channel::messages::DecodeError;
use crate::dispatch::DispatchError;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The backend link dropped or is not up yet.
    ConnectivityLost,
    /// The backend reported an error message.
    Backend,
    /// The classifier produced a label outside every configured set.
    UnrecognizedLabel,
    /// A request that the workflow refuses (dropped, never queued).
    PolicyViolation(PolicyViolation),
    /// An inbound payload could not be validated.
    Decode(DecodeError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectivityLost => write!(f, "connectivity lost"),
            Self::Backend => write!(f, "backend error"),
            Self::UnrecognizedLabel => write!(f, "unrecognized label"),
            Self::PolicyViolation(p) => write!(f, "policy violation: {p}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for ControlError {}

// ---------------------------------------------------------------------------
// Policy violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    /// A second command was requested while one is in flight.
    CommandInFlight,
    /// A detection arrived while the workflow is paused for actuation.
    DetectionWhilePaused,
    /// Confirm was requested for a category with no actuator command.
    NotDispatchable,
    /// Operator input that the current phase does not accept.
    InputOutOfPhase,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandInFlight => write!(f, "command already in flight"),
            Self::DetectionWhilePaused => write!(f, "detection while paused"),
            Self::NotDispatchable => write!(f, "category has no command"),
            Self::InputOutOfPhase => write!(f, "input not accepted in this phase"),
        }
    }
}

impl From<PolicyViolation> for ControlError {
    fn from(p: PolicyViolation) -> Self {
        Self::PolicyViolation(p)
    }
}

impl From<DispatchError> for ControlError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotDispatchable(_) => Self::PolicyViolation(PolicyViolation::NotDispatchable),
            DispatchError::CommandInFlight(_) => Self::PolicyViolation(PolicyViolation::CommandInFlight),
            DispatchError::LinkDown => Self::ConnectivityLost,
        }
    }
}

impl From<ChannelError> for ControlError {
    fn from(_: ChannelError) -> Self {
        Self::ConnectivityLost
    }
}

impl From<DecodeError> for ControlError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ActionCommand;

    #[test]
    fn dispatch_errors_map_onto_taxonomy() {
        assert_eq!(ControlError::from(DispatchError::LinkDown), ControlError::ConnectivityLost);
        assert_eq!(
            ControlError::from(DispatchError::CommandInFlight(ActionCommand::ThrowSyringe)),
            ControlError::PolicyViolation(PolicyViolation::CommandInFlight)
        );
    }

    #[test]
    fn display_is_readable() {
        let e = ControlError::from(PolicyViolation::DetectionWhilePaused);
        assert_eq!(e.to_string(), "policy violation: detection while paused");
    }
}

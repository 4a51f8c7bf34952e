//! Application core: pure domain logic, no direct I/O.
//!
//! This module contains the business rules of the controller: session
//! orchestration, backend event routing, and the operator-facing view.
//! Everything that touches the outside world goes through the **port
//! traits** in [`ports`], so the whole core runs against mock adapters.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod view;

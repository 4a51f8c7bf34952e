//! Sterisort controller library.
//!
//! Session workflow, backend channel, bin level monitoring and alerting for
//! the medical-waste sterilization and segregation unit.  The binary wires
//! these to a TCP backend and a console; the integration tests wire them
//! to scripted mocks.

#![deny(unused_must_use)]

pub mod adapters;
pub mod alerts;
pub mod app;
pub mod bins;
pub mod channel;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fsm;

//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements  | Connects to                   |
//! |---------------|-------------|-------------------------------|
//! | `clock`       | ClockPort   | `std::time::Instant`          |
//! | `console`     | (driving)   | stdin / stdout operator panel |
//! | `file_config` | ConfigPort  | JSON file on disk             |
//! | `log_sink`    | EventSink   | `log` facade                  |
//! | `socketio`    | Transport   | Backend over Socket.IO / ws   |
//! | `tcp`         | Transport   | Framed envelopes over TCP     |

pub mod clock;
pub mod console;
pub mod file_config;
pub mod log_sink;
pub mod socketio;
pub mod tcp;

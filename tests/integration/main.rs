//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises the controller against
//! the scripted backend link in `mock_channel`.  No socket is opened.

mod mock_channel;
mod reconnect_tests;
mod session_flow_tests;

//! bwconsole - bandwidth test console
//!
//! Keeps the linked test-parameter dials of both directions consistent,
//! turns the bandwidth test client's text output into metrics and rolling
//! charts, and dispatches commands (once or continuously) to the test
//! backend over HTTP.

pub mod console;
pub mod dial;
pub mod feed;

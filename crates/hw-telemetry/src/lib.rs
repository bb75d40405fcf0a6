//! Logging and span helpers for the haconiwa command line.
//!
//! - **Logging**: human-readable or JSON output on stderr via `tracing-subscriber`
//! - **Tracing**: OpenTelemetry-style trace/span ids attached to one span per
//!   command, so every log line of an invocation can be correlated

pub mod logging;
pub mod tracing_setup;

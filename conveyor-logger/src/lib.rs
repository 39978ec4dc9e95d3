//! Structured-logging façade for conveyor services.
//!
//! The server library only emits through the `tracing` facade; this crate is
//! where a hosting process decides what those diagnostics look like and
//! where they go.
pub mod logging;

pub use logging::{init, LogConfig, LogFormat, LogOutput};

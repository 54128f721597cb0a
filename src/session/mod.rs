//! # Printer Session
//!
//! The test-print state machine and the data that flows through it.
//!
//! ## Modules
//!
//! - [`config`]: user-entered connection settings and validated endpoints
//! - [`controller`]: the state machine itself
//! - [`events`]: status events, reporters and the draining loop

pub mod config;
pub mod controller;
pub mod events;

pub use config::{ConnectionConfig, Endpoint};
pub use controller::{PrintSummary, SessionController, TerminalStatus};
pub use events::{
    ConsoleReporter, SessionState, Severity, StatusEvent, StatusReporter, report_until,
};

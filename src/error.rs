//! # Error Types
//!
//! Two layers of errors live here:
//!
//! - [`ProbeError`]: plumbing failures raised by transports, the protocol
//!   detector, and the settings store.
//! - [`SessionError`]: the terminal outcome of a failed test-print run. The
//!   controller maps every `ProbeError` into one of these depending on the
//!   stage it happened in.

use std::fmt;

use thiserror::Error;

/// Main error type for transport, detector and settings operations
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Transport-level errors (connection, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded operation ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The printer answered with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persisted settings could not be read or written
    #[error("Settings error: {0}")]
    Settings(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a printer refused to print.
///
/// Variants are listed in the order the status flags are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    HeadOpen,
    Paused,
    PaperOut,
    /// Not ready, but none of the known flags explains it
    Unknown,
}

impl NotReadyReason {
    /// Short status line shown to the user
    pub fn status_message(&self) -> &'static str {
        match self {
            NotReadyReason::HeadOpen => "Printer Head Open",
            NotReadyReason::Paused => "Printer is Paused",
            NotReadyReason::PaperOut => "Printer Media Out",
            NotReadyReason::Unknown => "Printer Not Ready",
        }
    }
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotReadyReason::HeadOpen => "head open",
            NotReadyReason::Paused => "paused",
            NotReadyReason::PaperOut => "media out",
            NotReadyReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a single `run_test_print` pass
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network port is not an integer in 1..=65535
    #[error("invalid port number '{0}'")]
    InvalidPort(String),

    /// The Bluetooth or network link could not be opened
    #[error("could not open transport: {0}")]
    TransportOpen(String),

    /// Language query failed or returned something unusable
    #[error("could not determine printer language: {0}")]
    LanguageDetection(String),

    /// The printer answered the status query but cannot print right now
    #[error("printer not ready: {reason}")]
    PrinterNotReady { reason: NotReadyReason },

    /// The status query itself failed
    #[error("could not query printer status: {0}")]
    StatusQuery(String),

    /// Sending the label failed
    #[error("failed to send label: {0}")]
    Write(String),

    /// Another run is still in flight on this controller
    #[error("a test print is already in progress")]
    Busy,

    /// The caller stopped waiting for the run
    #[error("test print abandoned: {0}")]
    Abandoned(String),
}

impl SessionError {
    /// Short status line shown to the user when this error ends a run
    pub fn status_message(&self) -> String {
        match self {
            SessionError::InvalidPort(_) => "Port Number Is Invalid".to_string(),
            SessionError::TransportOpen(_) => "Comm Error! Disconnecting".to_string(),
            SessionError::LanguageDetection(_) => "Unknown Printer Language".to_string(),
            SessionError::PrinterNotReady { reason } => reason.status_message().to_string(),
            SessionError::StatusQuery(msg) | SessionError::Write(msg) => msg.clone(),
            SessionError::Busy => "Test Already Running".to_string(),
            SessionError::Abandoned(_) => "Test Abandoned".to_string(),
        }
    }
}

//! # Status Events
//!
//! Every state transition of a run produces one [`StatusEvent`]. The
//! controller pushes events onto an unbounded channel and never waits for
//! the consumer; the UI side drains the channel on its own task and hands
//! each event to a [`StatusReporter`].

use std::fmt;
use std::future::Future;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use tokio::sync::mpsc::UnboundedReceiver;

/// Lifecycle states of a test-print run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    DetectingLanguage,
    Ready,
    Printing,
    Disconnecting,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connected, DetectingLanguage)
                | (DetectingLanguage, Ready)
                | (Ready, Printing)
                | (Connecting | Connected | DetectingLanguage | Ready | Printing, Disconnecting)
                | (Disconnecting, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::DetectingLanguage => "detecting-language",
            SessionState::Ready => "ready",
            SessionState::Printing => "printing",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Severity::Info => "INFO",
            Severity::Success => "OK",
            Severity::Warning => "WAIT",
            Severity::Error => "ERROR",
        };
        f.write_str(tag)
    }
}

/// One status update: the state just entered and what to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub state: SessionState,
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Local>,
}

impl StatusEvent {
    pub fn new(state: SessionState, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            state,
            severity,
            message: message.into(),
            at: Local::now(),
        }
    }

    /// The event that closes a run.
    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Idle
    }
}

/// Consumer of status events.
pub trait StatusReporter {
    fn report(&mut self, event: &StatusEvent);
}

/// Prints one timestamped line per event.
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusReporter for ConsoleReporter<W> {
    fn report(&mut self, event: &StatusEvent) {
        // A broken stdout is not worth failing a print over
        let _ = writeln!(
            self.out,
            "{} [{:<5}] {}",
            event.at.format("%H:%M:%S"),
            event.severity.to_string(),
            event.message
        );
    }
}

/// Forward events to `reporter` until `done` resolves, then flush whatever
/// is still queued.
///
/// Events are delivered in emission order on the caller's task.
pub async fn report_until<F, R>(
    events: &mut UnboundedReceiver<StatusEvent>,
    reporter: &mut R,
    done: F,
) -> F::Output
where
    F: Future,
    R: StatusReporter + ?Sized,
{
    tokio::pin!(done);

    let output = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => reporter.report(&event),
            output = &mut done => break output,
        }
    };

    while let Ok(event) = events.try_recv() {
        reporter.report(&event);
    }

    output
}

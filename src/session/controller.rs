//! # Session Controller
//!
//! Drives one test print from start to finish:
//!
//! ```text
//! Idle -> Connecting -> Connected -> DetectingLanguage -> Ready -> Printing -> Disconnecting -> Idle
//! ```
//!
//! Any failure jumps straight to `Disconnecting`. That state is the only
//! cleanup path: it closes the transport (when one was built) and emits the
//! terminal status. Each run is a single pass; nothing is retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::config::ConnectionConfig;
use super::events::{SessionState, Severity, StatusEvent};
use crate::error::SessionError;
use crate::printer::{PrinterLanguage, ProtocolDetector};
use crate::protocol;
use crate::transport::{Connector, TransportGuard};

/// Outcome of one run.
pub type TerminalStatus = Result<PrintSummary, SessionError>;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintSummary {
    pub language: PrinterLanguage,
    pub bytes_written: usize,
    /// Bluetooth friendly name, when the link reports one
    pub device_name: Option<String>,
}

impl PrintSummary {
    fn status_message(&self) -> String {
        match &self.device_name {
            Some(name) => format!("Test label sent to {}", name),
            None => "Test label sent".to_string(),
        }
    }
}

/// Runs test prints against one printer connection at a time.
///
/// The controller is not reentrant: a call made while another run is in
/// flight fails with [`SessionError::Busy`] and emits no events.
pub struct SessionController {
    connector: Box<dyn Connector>,
    detector: Box<dyn ProtocolDetector>,
    events: UnboundedSender<StatusEvent>,
    in_flight: AtomicBool,
}

impl SessionController {
    /// Create a controller and the receiving end of its status channel.
    pub fn new<C, D>(connector: C, detector: D) -> (Self, UnboundedReceiver<StatusEvent>)
    where
        C: Connector + 'static,
        D: ProtocolDetector + 'static,
    {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            connector: Box::new(connector),
            detector: Box::new(detector),
            events,
            in_flight: AtomicBool::new(false),
        };
        (controller, rx)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Connect, detect the language, check status, print, disconnect.
    ///
    /// Blocks the calling thread for the whole run. Use
    /// [`run_on_worker`](Self::run_on_worker) from async code.
    pub fn run_test_print(&self, config: &ConnectionConfig) -> TerminalStatus {
        let Some(_permit) = RunPermit::acquire(&self.in_flight) else {
            warn!(target_printer = %config, "Rejected test print: another run is in flight");
            return Err(SessionError::Busy);
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("test_print", %run_id, target_printer = %config);
        let _enter = span.enter();

        let mut session = Session::new(&self.events);
        let mut link = None;
        let result = self.drive(&mut session, &mut link, config);
        session.disconnect(&mut link, result)
    }

    /// Run on tokio's blocking pool and await the result.
    pub async fn run_on_worker(self: &Arc<Self>, config: ConnectionConfig) -> TerminalStatus {
        let controller = Arc::clone(self);
        tokio::task::spawn_blocking(move || controller.run_test_print(&config))
            .await
            .unwrap_or_else(|e| Err(SessionError::Abandoned(format!("worker failed: {}", e))))
    }

    /// Like [`run_on_worker`](Self::run_on_worker), but stop waiting after
    /// `deadline`.
    ///
    /// An abandoned run keeps going on the worker until its own timeouts end
    /// it; its transport is closed when the run's guard goes out of scope.
    pub async fn run_with_deadline(
        self: &Arc<Self>,
        config: ConnectionConfig,
        deadline: Duration,
    ) -> TerminalStatus {
        match tokio::time::timeout(deadline, self.run_on_worker(config)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?deadline, "Gave up waiting for test print");
                Err(SessionError::Abandoned(format!(
                    "no result after {:?}",
                    deadline
                )))
            }
        }
    }

    /// Everything from `Connecting` up to the end of `Printing`.
    ///
    /// Returns at the first failure; the caller performs the disconnect.
    fn drive(
        &self,
        session: &mut Session<'_>,
        link: &mut Option<TransportGuard>,
        config: &ConnectionConfig,
    ) -> TerminalStatus {
        session.enter(SessionState::Connecting, Severity::Warning, "Connecting...");

        let endpoint = config.resolve()?;
        let guard = link.insert(TransportGuard::new(self.connector.connect(&endpoint)));
        let transport = guard.get_mut();

        transport
            .open()
            .map_err(|e| SessionError::TransportOpen(e.to_string()))?;
        session.enter(SessionState::Connected, Severity::Success, "Connected");

        if !transport.is_connected() {
            return Err(SessionError::TransportOpen(format!(
                "{} reported not connected after open",
                transport.describe()
            )));
        }

        session.enter(
            SessionState::DetectingLanguage,
            Severity::Warning,
            "Determining Printer Language",
        );
        let language = self
            .detector
            .detect_language(transport)
            .map_err(|e| SessionError::LanguageDetection(e.to_string()))?;
        // Status replies from a printer in an unsupported mode mean nothing
        let payload = protocol::test_label(&language).ok_or_else(|| {
            SessionError::LanguageDetection(format!("no test label for {}", language))
        })?;
        session.language = Some(language.clone());
        session.enter(
            SessionState::Ready,
            Severity::Info,
            format!("Printer Language {}", language),
        );

        let status = self
            .detector
            .query_status(transport, &language)
            .map_err(|e| SessionError::StatusQuery(e.to_string()))?;
        debug!(?status, "Printer status");
        status
            .readiness()
            .map_err(|reason| SessionError::PrinterNotReady { reason })?;

        session.enter(SessionState::Printing, Severity::Info, "Sending Data");
        transport
            .write(payload)
            .map_err(|e| SessionError::Write(e.to_string()))?;

        info!(bytes = payload.len(), %language, "Test label sent");
        Ok(PrintSummary {
            language,
            bytes_written: payload.len(),
            device_name: transport.friendly_name(),
        })
    }
}

/// Per-run state. Lives only for the duration of one `run_test_print`.
struct Session<'a> {
    state: SessionState,
    language: Option<PrinterLanguage>,
    events: &'a UnboundedSender<StatusEvent>,
}

impl<'a> Session<'a> {
    fn new(events: &'a UnboundedSender<StatusEvent>) -> Self {
        Self {
            state: SessionState::Idle,
            language: None,
            events,
        }
    }

    /// Move to `next` and publish its status event.
    fn enter(&mut self, next: SessionState, severity: Severity, message: impl Into<String>) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;

        let event = StatusEvent::new(next, severity, message);
        debug!(state = %next, severity = %severity, "{}", event.message);
        if self.events.send(event).is_err() {
            debug!("Status receiver dropped");
        }
    }

    /// `Disconnecting` then `Idle`: close the link and publish the terminal
    /// status.
    fn disconnect(
        mut self,
        link: &mut Option<TransportGuard>,
        result: TerminalStatus,
    ) -> TerminalStatus {
        match &result {
            Ok(_) => self.enter(SessionState::Disconnecting, Severity::Info, "Disconnecting"),
            Err(e) => {
                warn!(error = %e, failed_in = %self.state, "Test print failed");
                self.enter(SessionState::Disconnecting, Severity::Error, e.status_message());
            }
        }

        if let Some(mut guard) = link.take() {
            if let Err(e) = guard.close() {
                warn!(error = %e, "Error while closing transport");
            }
        }

        match &result {
            Ok(summary) => {
                self.enter(SessionState::Idle, Severity::Success, summary.status_message())
            }
            Err(e) => self.enter(
                SessionState::Idle,
                Severity::Error,
                format!("Not Connected: {}", e),
            ),
        }

        info!(
            ok = result.is_ok(),
            language = ?self.language,
            "Test print finished"
        );
        result
    }
}

/// Marks the controller busy for as long as it is held.
struct RunPermit<'a>(&'a AtomicBool);

impl<'a> RunPermit<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

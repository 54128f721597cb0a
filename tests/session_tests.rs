//! # Session Controller Tests
//!
//! Drive the test-print state machine end to end with scripted transports
//! and detectors, checking the emitted status events, what reached the
//! printer, and that every link is closed exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::sync::mpsc::UnboundedReceiver;

use zebra_probe::printer::{PrinterLanguage, PrinterStatus, ProtocolDetector};
use zebra_probe::protocol::{cpcl, zpl};
use zebra_probe::session::{
    ConnectionConfig, Endpoint, SessionController, SessionState, Severity, StatusEvent,
};
use zebra_probe::transport::{Connector, Transport};
use zebra_probe::{NotReadyReason, ProbeError, SessionError};

// ============================================================================
// MOCKS
// ============================================================================

/// Everything the mocks observed, shared with the test body.
#[derive(Debug, Default)]
struct Calls {
    built: Vec<Endpoint>,
    opens: usize,
    closes: usize,
    writes: Vec<Vec<u8>>,
    /// Transport id for every close, to tell runs apart
    closed_ids: Vec<usize>,
}

type Shared = Arc<Mutex<Calls>>;

#[derive(Debug, Clone)]
struct LinkScript {
    open_fails: bool,
    connected_after_open: bool,
    write_fails: bool,
    friendly_name: Option<String>,
}

impl Default for LinkScript {
    fn default() -> Self {
        Self {
            open_fails: false,
            connected_after_open: true,
            write_fails: false,
            friendly_name: None,
        }
    }
}

struct MockTransport {
    id: usize,
    script: LinkScript,
    calls: Shared,
    open: bool,
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), ProbeError> {
        self.calls.lock().unwrap().opens += 1;
        if self.script.open_fails {
            return Err(ProbeError::Transport("connection refused".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open && self.script.connected_after_open
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        if self.script.write_fails {
            return Err(ProbeError::Transport("broken pipe".to_string()));
        }
        self.calls.lock().unwrap().writes.push(data.to_vec());
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ProbeError> {
        Ok(0)
    }

    fn close(&mut self) -> Result<(), ProbeError> {
        let mut calls = self.calls.lock().unwrap();
        calls.closes += 1;
        calls.closed_ids.push(self.id);
        self.open = false;
        Ok(())
    }

    fn friendly_name(&self) -> Option<String> {
        self.script.friendly_name.clone()
    }

    fn describe(&self) -> String {
        format!("mock#{}", self.id)
    }
}

struct MockConnector {
    script: LinkScript,
    calls: Shared,
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        let mut calls = self.calls.lock().unwrap();
        calls.built.push(endpoint.clone());
        Box::new(MockTransport {
            id: calls.built.len(),
            script: self.script.clone(),
            calls: self.calls.clone(),
            open: false,
        })
    }
}

/// Holds a run inside language detection until the test releases it.
struct Gate {
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

struct MockDetector {
    language: Result<PrinterLanguage, String>,
    status: Result<PrinterStatus, String>,
    detect_calls: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
    delay: Duration,
    gate: Option<Gate>,
}

impl MockDetector {
    fn new(language: PrinterLanguage, status: PrinterStatus) -> Self {
        Self {
            language: Ok(language),
            status: Ok(status),
            detect_calls: Arc::new(AtomicUsize::new(0)),
            status_calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            gate: None,
        }
    }
}

impl ProtocolDetector for MockDetector {
    fn detect_language(
        &self,
        _transport: &mut dyn Transport,
    ) -> Result<PrinterLanguage, ProbeError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.send(()).unwrap();
            gate.release.lock().unwrap().recv().unwrap();
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.language.clone().map_err(ProbeError::Timeout)
    }

    fn query_status(
        &self,
        _transport: &mut dyn Transport,
        _language: &PrinterLanguage,
    ) -> Result<PrinterStatus, ProbeError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status.clone().map_err(ProbeError::Transport)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn ready() -> PrinterStatus {
    PrinterStatus {
        ready_to_print: true,
        ..Default::default()
    }
}

fn not_ready(head_open: bool, paused: bool, paper_out: bool) -> PrinterStatus {
    PrinterStatus {
        ready_to_print: false,
        head_open,
        paused,
        paper_out,
    }
}

fn network() -> ConnectionConfig {
    ConnectionConfig::network("10.0.0.5", "9100")
}

fn controller(
    script: LinkScript,
    detector: MockDetector,
) -> (SessionController, UnboundedReceiver<StatusEvent>, Shared) {
    let calls = Shared::default();
    let connector = MockConnector {
        script,
        calls: calls.clone(),
    };
    let (controller, events) = SessionController::new(connector, detector);
    (controller, events, calls)
}

fn drain(events: &mut UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn states(events: &[StatusEvent]) -> Vec<SessionState> {
    events.iter().map(|e| e.state).collect()
}

/// A run must end in Idle with exactly one terminal event, which is last.
fn assert_terminal(events: &[StatusEvent], severity: Severity) {
    let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "events: {:?}", events);
    let last = events.last().unwrap();
    assert!(last.is_terminal());
    assert_eq!(last.severity, severity);
}

fn failure_path_to(last_state: SessionState) -> Vec<SessionState> {
    use SessionState::*;
    let full = [Connecting, Connected, DetectingLanguage, Ready, Printing];
    let mut path: Vec<SessionState> = full
        .iter()
        .copied()
        .take_while(|s| *s != last_state)
        .collect();
    path.push(last_state);
    path.push(Disconnecting);
    path.push(Idle);
    path
}

// ============================================================================
// HAPPY PATHS
// ============================================================================

#[test]
fn test_zpl_ready_prints_zpl_label() {
    let (controller, mut events, calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Zpl, ready()));

    let summary = controller.run_test_print(&network()).unwrap();
    assert_eq!(summary.language, PrinterLanguage::Zpl);
    assert_eq!(summary.bytes_written, zpl::TEST_LABEL.len());

    let events = drain(&mut events);
    use SessionState::*;
    assert_eq!(
        states(&events),
        vec![
            Connecting,
            Connected,
            DetectingLanguage,
            Ready,
            Printing,
            Disconnecting,
            Idle
        ]
    );
    assert_eq!(
        events.iter().map(|e| e.severity).collect::<Vec<_>>(),
        vec![
            Severity::Warning,
            Severity::Success,
            Severity::Warning,
            Severity::Info,
            Severity::Info,
            Severity::Info,
            Severity::Success
        ]
    );
    assert_eq!(events[3].message, "Printer Language ZPL");
    assert_terminal(&events, Severity::Success);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.writes, vec![zpl::TEST_LABEL.to_vec()]);
    assert_eq!(calls.opens, 1);
    assert_eq!(calls.closes, 1);
}

#[test]
fn test_cpcl_ready_prints_cpcl_label() {
    let (controller, mut events, calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Cpcl, ready()));

    let summary = controller.run_test_print(&network()).unwrap();
    assert_eq!(summary.language, PrinterLanguage::Cpcl);

    assert_terminal(&drain(&mut events), Severity::Success);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.writes, vec![cpcl::TEST_LABEL.to_vec()]);
    assert_eq!(calls.closes, 1);
}

#[test]
fn test_bluetooth_success_names_device() {
    let script = LinkScript {
        friendly_name: Some("XXZPJ183600123".to_string()),
        ..Default::default()
    };
    let (controller, mut events, calls) =
        controller(script, MockDetector::new(PrinterLanguage::Cpcl, ready()));

    let summary = controller
        .run_test_print(&ConnectionConfig::bluetooth("AC:3F:A4:F0:94:3B"))
        .unwrap();
    assert_eq!(summary.device_name.as_deref(), Some("XXZPJ183600123"));

    let events = drain(&mut events);
    assert_eq!(
        events.last().unwrap().message,
        "Test label sent to XXZPJ183600123"
    );
    assert_eq!(
        calls.lock().unwrap().built,
        vec![Endpoint::Bluetooth {
            address: "AC:3F:A4:F0:94:3B".to_string()
        }]
    );
}

// ============================================================================
// FAILURE PATHS
// ============================================================================

#[test]
fn test_invalid_port_never_opens() {
    let detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    let detect_calls = detector.detect_calls.clone();
    let (controller, mut events, calls) = controller(LinkScript::default(), detector);

    let result = controller.run_test_print(&ConnectionConfig::network("10.0.0.5", "abc"));
    assert!(matches!(result, Err(SessionError::InvalidPort(ref p)) if p == "abc"));

    let events = drain(&mut events);
    use SessionState::*;
    assert_eq!(states(&events), vec![Connecting, Disconnecting, Idle]);
    assert_eq!(events[1].message, "Port Number Is Invalid");
    assert_terminal(&events, Severity::Error);

    let calls = calls.lock().unwrap();
    assert!(calls.built.is_empty());
    assert_eq!(calls.opens, 0);
    assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_open_failure_closes_and_skips_detection() {
    let detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    let detect_calls = detector.detect_calls.clone();
    let script = LinkScript {
        open_fails: true,
        ..Default::default()
    };
    let (controller, mut events, calls) = controller(script, detector);

    let result = controller.run_test_print(&network());
    assert!(matches!(result, Err(SessionError::TransportOpen(_))));

    let events = drain(&mut events);
    use SessionState::*;
    assert_eq!(states(&events), vec![Connecting, Disconnecting, Idle]);
    assert_eq!(events[1].message, "Comm Error! Disconnecting");
    assert_terminal(&events, Severity::Error);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.opens, 1);
    assert_eq!(calls.closes, 1);
    assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_not_connected_after_open_skips_detection() {
    let detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    let detect_calls = detector.detect_calls.clone();
    let script = LinkScript {
        connected_after_open: false,
        ..Default::default()
    };
    let (controller, mut events, calls) = controller(script, detector);

    let result = controller.run_test_print(&network());
    assert!(matches!(result, Err(SessionError::TransportOpen(_))));

    let events = drain(&mut events);
    assert_eq!(states(&events), failure_path_to(SessionState::Connected));
    assert_terminal(&events, Severity::Error);
    assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
    assert_eq!(calls.lock().unwrap().closes, 1);
}

#[test]
fn test_detection_failure() {
    let mut detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    detector.language = Err("no reply".to_string());
    let (controller, mut events, calls) = controller(LinkScript::default(), detector);

    let result = controller.run_test_print(&network());
    assert!(matches!(result, Err(SessionError::LanguageDetection(_))));

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        failure_path_to(SessionState::DetectingLanguage)
    );
    assert_eq!(events[events.len() - 2].message, "Unknown Printer Language");
    assert_terminal(&events, Severity::Error);

    let calls = calls.lock().unwrap();
    assert!(calls.writes.is_empty());
    assert_eq!(calls.closes, 1);
}

#[test]
fn test_unknown_language_skips_status_and_write() {
    let mut detector = MockDetector::new(PrinterLanguage::Unknown("epl".to_string()), ready());
    // An EPL printer would never answer ~HS
    detector.status = Err("no ~HS reply".to_string());
    let status_calls = detector.status_calls.clone();
    let (controller, mut events, calls) = controller(LinkScript::default(), detector);

    let result = controller.run_test_print(&network());
    assert!(
        matches!(result, Err(SessionError::LanguageDetection(ref msg)) if msg.contains("epl")),
        "{:?}",
        result
    );

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        failure_path_to(SessionState::DetectingLanguage)
    );
    assert_eq!(events[events.len() - 2].message, "Unknown Printer Language");
    assert_terminal(&events, Severity::Error);
    assert_eq!(status_calls.load(Ordering::SeqCst), 0);

    let calls = calls.lock().unwrap();
    assert!(calls.writes.is_empty());
    assert_eq!(calls.closes, 1);
}

#[test]
fn test_head_open_blocks_printing() {
    let detector = MockDetector::new(PrinterLanguage::Zpl, not_ready(true, false, true));
    let (controller, mut events, calls) = controller(LinkScript::default(), detector);

    let result = controller.run_test_print(&network());
    assert!(matches!(
        result,
        Err(SessionError::PrinterNotReady {
            reason: NotReadyReason::HeadOpen
        })
    ));

    let events = drain(&mut events);
    assert_eq!(states(&events), failure_path_to(SessionState::Ready));
    assert_eq!(events[events.len() - 2].message, "Printer Head Open");
    assert_terminal(&events, Severity::Error);

    let calls = calls.lock().unwrap();
    assert!(calls.writes.is_empty());
    assert_eq!(calls.closes, 1);
}

#[test]
fn test_not_ready_reasons_follow_priority() {
    let cases = [
        (not_ready(false, true, true), NotReadyReason::Paused),
        (not_ready(false, false, true), NotReadyReason::PaperOut),
        (not_ready(false, false, false), NotReadyReason::Unknown),
    ];

    for (status, expected) in cases {
        let (controller, _events, calls) = controller(
            LinkScript::default(),
            MockDetector::new(PrinterLanguage::Zpl, status),
        );
        match controller.run_test_print(&network()) {
            Err(SessionError::PrinterNotReady { reason }) => assert_eq!(reason, expected),
            other => panic!("expected {:?}, got {:?}", expected, other),
        }
        assert!(calls.lock().unwrap().writes.is_empty());
    }
}

#[test]
fn test_status_query_failure() {
    let mut detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    detector.status = Err("reset by peer".to_string());
    let (controller, mut events, calls) = controller(LinkScript::default(), detector);

    let result = controller.run_test_print(&network());
    assert!(matches!(result, Err(SessionError::StatusQuery(_))));

    let events = drain(&mut events);
    assert_eq!(states(&events), failure_path_to(SessionState::Ready));
    assert_terminal(&events, Severity::Error);
    assert_eq!(calls.lock().unwrap().closes, 1);
}

#[test]
fn test_write_failure_still_disconnects() {
    let script = LinkScript {
        write_fails: true,
        ..Default::default()
    };
    let (controller, mut events, calls) =
        controller(script, MockDetector::new(PrinterLanguage::Zpl, ready()));

    let result = controller.run_test_print(&network());
    assert!(matches!(result, Err(SessionError::Write(_))));

    let events = drain(&mut events);
    assert_eq!(states(&events), failure_path_to(SessionState::Printing));
    assert_terminal(&events, Severity::Error);
    assert_eq!(calls.lock().unwrap().closes, 1);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_sequential_runs_use_fresh_transports() {
    let (controller, mut events, calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Zpl, ready()));

    controller.run_test_print(&network()).unwrap();
    let first = states(&drain(&mut events));

    controller.run_test_print(&network()).unwrap();
    let second = states(&drain(&mut events));

    assert_eq!(first, second);
    let calls = calls.lock().unwrap();
    assert_eq!(calls.built.len(), 2);
    assert_eq!(calls.closed_ids, vec![1, 2]);
    assert_eq!(calls.writes.len(), 2);
}

#[test]
fn test_run_after_failure_succeeds() {
    let (controller, mut events, calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Zpl, ready()));

    assert!(controller
        .run_test_print(&ConnectionConfig::network("10.0.0.5", "x"))
        .is_err());
    drain(&mut events);

    controller.run_test_print(&network()).unwrap();
    assert_terminal(&drain(&mut events), Severity::Success);
    assert_eq!(calls.lock().unwrap().closes, 1);
}

#[test]
fn test_concurrent_run_is_rejected() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    detector.gate = Some(Gate {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    });

    let (controller, mut events, calls) = controller(LinkScript::default(), detector);
    let controller = Arc::new(controller);

    let worker = {
        let controller = controller.clone();
        thread::spawn(move || controller.run_test_print(&network()))
    };

    entered_rx.recv().unwrap();
    assert!(controller.is_busy());
    let before = drain(&mut events).len();

    let second = controller.run_test_print(&network());
    assert!(matches!(second, Err(SessionError::Busy)));
    assert_eq!(drain(&mut events).len(), 0, "a rejected call emits nothing");

    release_tx.send(()).unwrap();
    assert!(worker.join().unwrap().is_ok());
    assert!(!controller.is_busy());

    let rest = drain(&mut events);
    assert_eq!(before + rest.len(), 7);
    assert_eq!(calls.lock().unwrap().built.len(), 1);
}

#[test]
fn test_dropped_receiver_does_not_break_run() {
    let (controller, events, calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Zpl, ready()));
    drop(events);

    assert!(controller.run_test_print(&network()).is_ok());
    assert_eq!(calls.lock().unwrap().closes, 1);
}

// ============================================================================
// ASYNC WORKER
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_run_on_worker() {
    let (controller, mut events, _calls) =
        controller(LinkScript::default(), MockDetector::new(PrinterLanguage::Zpl, ready()));
    let controller = Arc::new(controller);

    let summary = controller.run_on_worker(network()).await.unwrap();
    assert_eq!(summary.language, PrinterLanguage::Zpl);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        let done = event.is_terminal();
        received.push(event);
        if done {
            break;
        }
    }
    assert_terminal(&received, Severity::Success);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deadline_abandons_but_still_closes() {
    let mut detector = MockDetector::new(PrinterLanguage::Zpl, ready());
    detector.delay = Duration::from_millis(300);
    let (controller, _events, calls) = controller(LinkScript::default(), detector);
    let controller = Arc::new(controller);

    let result = controller
        .run_with_deadline(network(), Duration::from_millis(20))
        .await;
    assert!(matches!(result, Err(SessionError::Abandoned(_))));

    // The abandoned run finishes on the worker and cleans up after itself
    let started = Instant::now();
    while (calls.lock().unwrap().closes == 0 || controller.is_busy())
        && started.elapsed() < Duration::from_secs(5)
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.lock().unwrap().closes, 1);
    assert!(!controller.is_busy());
}

//! # Zebra Probe - Label Printer Connection Tester
//!
//! Zebra Probe connects to a Zebra label printer over Bluetooth or TCP,
//! works out which command language it speaks, checks that it can print,
//! and sends a test label. It provides:
//!
//! - **Session controller**: the connect/detect/print/disconnect state machine
//! - **Transport**: Bluetooth RFCOMM and raw TCP links
//! - **Protocol**: SGD queries, ZPL and CPCL status commands, test labels
//! - **Settings**: last-used connection values
//!
//! ## Quick Start
//!
//! ```no_run
//! use zebra_probe::{
//!     session::{ConnectionConfig, SessionController},
//!     printer::SgdDetector,
//!     transport::{SystemConnector, Timeouts},
//! };
//!
//! let (controller, mut events) =
//!     SessionController::new(SystemConnector::new(Timeouts::default()), SgdDetector::default());
//!
//! let result = controller.run_test_print(&ConnectionConfig::network("10.0.0.5", "9100"));
//!
//! while let Ok(event) = events.try_recv() {
//!     println!("{}: {}", event.severity, event.message);
//! }
//! println!("{:?}", result);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | State machine, status events, connection config |
//! | [`transport`] | Communication backends |
//! | [`printer`] | Language detection and status |
//! | [`protocol`] | Zebra command builders and reply parsers |
//! | [`settings`] | Persisted connection settings |
//! | [`error`] | Error types |

pub mod error;
pub mod printer;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod transport;

// Re-exports for convenience
pub use error::{NotReadyReason, ProbeError, SessionError};
pub use printer::{PrinterLanguage, PrinterStatus};
pub use session::{ConnectionConfig, SessionController, StatusEvent, TerminalStatus};

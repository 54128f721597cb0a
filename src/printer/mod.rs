//! # Printer Module
//!
//! What the session learns about the printer on the other end of the link.
//!
//! ## Modules
//!
//! - [`language`]: active command language
//! - [`status`]: readiness flags
//! - [`detector`]: queries that produce both

pub mod detector;
pub mod language;
pub mod status;

pub use detector::{ProtocolDetector, SgdDetector};
pub use language::PrinterLanguage;
pub use status::PrinterStatus;

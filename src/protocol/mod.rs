//! # Zebra Protocol Commands
//!
//! Byte-level commands and reply decoders for the three command channels a
//! Zebra printer speaks:
//!
//! - [`sgd`]: `getvar` queries, understood in every language mode
//! - [`zpl`]: `~HS` host status and the ZPL test label
//! - [`cpcl`]: `ESC h` status byte and the CPCL test label
//!
//! Label templates are opaque byte payloads; nothing here renders labels.

pub mod cpcl;
pub mod sgd;
pub mod zpl;

use crate::printer::PrinterLanguage;

/// Test label payload for a printer language.
///
/// Returns `None` for languages we have no template for.
pub fn test_label(language: &PrinterLanguage) -> Option<&'static [u8]> {
    match language {
        PrinterLanguage::Zpl => Some(zpl::TEST_LABEL),
        PrinterLanguage::Cpcl => Some(cpcl::TEST_LABEL),
        PrinterLanguage::Unknown(_) => None,
    }
}

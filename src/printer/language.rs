//! # Printer Control Languages
//!
//! Zebra printers report their active command language through the
//! `device.languages` SGD variable. Mobile printers in CPCL mode answer
//! `line_print`; desktop and industrial printers answer `zpl`,
//! `hybrid_xml_zpl` or `epl_zpl`.

use std::fmt;

/// Command language the printer is currently interpreting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterLanguage {
    Zpl,
    Cpcl,
    /// A language we have no test label for, with the raw reported name
    Unknown(String),
}

impl PrinterLanguage {
    /// Interpret a `device.languages` value.
    ///
    /// Returns `None` for an empty value, which means the printer did not
    /// answer the query in a usable way.
    ///
    /// ```
    /// use zebra_probe::PrinterLanguage;
    ///
    /// assert_eq!(PrinterLanguage::from_device_languages("hybrid_xml_zpl"), Some(PrinterLanguage::Zpl));
    /// assert_eq!(PrinterLanguage::from_device_languages("line_print"), Some(PrinterLanguage::Cpcl));
    /// ```
    pub fn from_device_languages(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.is_empty() {
            return None;
        }

        let language = if value.contains("zpl") {
            PrinterLanguage::Zpl
        } else if value.contains("line_print") || value.contains("cpcl") {
            PrinterLanguage::Cpcl
        } else {
            PrinterLanguage::Unknown(value)
        };
        Some(language)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, PrinterLanguage::Unknown(_))
    }
}

impl fmt::Display for PrinterLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterLanguage::Zpl => f.write_str("ZPL"),
            PrinterLanguage::Cpcl => f.write_str("CPCL"),
            PrinterLanguage::Unknown(raw) => write!(f, "Unknown ({})", raw),
        }
    }
}

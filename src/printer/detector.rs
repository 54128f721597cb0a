//! # Printer Protocol Detection
//!
//! Works out which command language a connected printer is using and asks
//! it for its status, speaking directly over the session's transport.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use super::{PrinterLanguage, PrinterStatus};
use crate::error::ProbeError;
use crate::protocol::{cpcl, sgd, zpl};
use crate::transport::Transport;

/// Largest reply we are willing to buffer
const MAX_REPLY_LEN: usize = 4096;

/// Pause between empty reads so a closed socket does not spin
const IDLE_READ_DELAY: Duration = Duration::from_millis(20);

/// Quiet period that ends the flush of stale input before a command
const STALE_INPUT_GRACE: Duration = Duration::from_millis(50);

/// Language detection and status query over an open transport.
pub trait ProtocolDetector: Send + Sync {
    fn detect_language(&self, transport: &mut dyn Transport)
        -> Result<PrinterLanguage, ProbeError>;

    fn query_status(
        &self,
        transport: &mut dyn Transport,
        language: &PrinterLanguage,
    ) -> Result<PrinterStatus, ProbeError>;
}

/// Detector using Zebra's SGD channel for the language and the
/// language-specific status command for readiness.
#[derive(Debug, Clone)]
pub struct SgdDetector {
    reply_timeout: Duration,
}

impl Default for SgdDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl SgdDetector {
    /// `reply_timeout` bounds the wait for each complete reply.
    pub fn new(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }

    /// Send `command` on a link cleared of leftovers from the previous
    /// exchange, such as the CRLF trailing an SGD reply.
    fn send(&self, transport: &mut dyn Transport, command: &[u8]) -> Result<(), ProbeError> {
        let stale = transport.discard_input(STALE_INPUT_GRACE)?;
        if stale > 0 {
            debug!(bytes = stale, "Dropped stale input before command");
        }
        transport.write(command)
    }

    /// Read until `parse` accepts the accumulated bytes or the reply
    /// timeout passes.
    fn read_reply<T>(
        &self,
        transport: &mut dyn Transport,
        what: &str,
        parse: impl Fn(&[u8]) -> Option<T>,
    ) -> Result<T, ProbeError> {
        let deadline = Instant::now() + self.reply_timeout;
        let mut reply = Vec::new();
        let mut buf = [0u8; 512];

        loop {
            let n = transport.read(&mut buf)?;
            if n > 0 {
                reply.extend_from_slice(&buf[..n]);
                if let Some(value) = parse(&reply) {
                    debug!(bytes = reply.len(), "Got {} reply", what);
                    return Ok(value);
                }
                if reply.len() > MAX_REPLY_LEN {
                    return Err(ProbeError::Protocol(format!(
                        "{} reply exceeds {} bytes",
                        what, MAX_REPLY_LEN
                    )));
                }
            } else if !transport.is_connected() {
                return Err(ProbeError::Transport(format!(
                    "Connection closed while waiting for {} reply",
                    what
                )));
            }

            if Instant::now() >= deadline {
                return Err(ProbeError::Timeout(format!(
                    "No complete {} reply after {:?}",
                    what, self.reply_timeout
                )));
            }

            if n == 0 {
                thread::sleep(IDLE_READ_DELAY);
            }
        }
    }
}

impl ProtocolDetector for SgdDetector {
    #[instrument(skip_all, fields(transport = %transport.describe()))]
    fn detect_language(
        &self,
        transport: &mut dyn Transport,
    ) -> Result<PrinterLanguage, ProbeError> {
        self.send(transport, &sgd::getvar(sgd::DEVICE_LANGUAGES))?;
        let value = self.read_reply(transport, sgd::DEVICE_LANGUAGES, sgd::parse_reply)?;

        debug!(value = %value, "Printer reported language");
        PrinterLanguage::from_device_languages(&value).ok_or_else(|| {
            ProbeError::Protocol(format!("Empty {} value", sgd::DEVICE_LANGUAGES))
        })
    }

    #[instrument(skip_all, fields(language = %language))]
    fn query_status(
        &self,
        transport: &mut dyn Transport,
        language: &PrinterLanguage,
    ) -> Result<PrinterStatus, ProbeError> {
        match language {
            PrinterLanguage::Cpcl => {
                self.send(transport, cpcl::STATUS_REQUEST)?;
                let status = self.read_reply(transport, "ESC h", |raw| {
                    raw.first().map(|&b| cpcl::parse_status_byte(b))
                })?;
                Ok(status.into())
            }
            // Printers in other modes still answer the ZPL host status query
            PrinterLanguage::Zpl | PrinterLanguage::Unknown(_) => {
                self.send(transport, zpl::HOST_STATUS)?;
                let status = self.read_reply(transport, "~HS", zpl::parse_host_status)?;
                Ok(status.into())
            }
        }
    }
}

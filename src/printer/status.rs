//! Printer readiness as reported by the status query.

use crate::error::NotReadyReason;
use crate::protocol::cpcl::LineStatus;
use crate::protocol::zpl::HostStatus;

/// The four conditions a test print cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrinterStatus {
    pub ready_to_print: bool,
    pub head_open: bool,
    pub paused: bool,
    pub paper_out: bool,
}

impl PrinterStatus {
    /// Decide whether a label may be sent.
    ///
    /// Flags are checked in priority order: ready, head open, paused,
    /// paper out. The first one set wins.
    pub fn readiness(&self) -> Result<(), NotReadyReason> {
        if self.ready_to_print {
            Ok(())
        } else if self.head_open {
            Err(NotReadyReason::HeadOpen)
        } else if self.paused {
            Err(NotReadyReason::Paused)
        } else if self.paper_out {
            Err(NotReadyReason::PaperOut)
        } else {
            Err(NotReadyReason::Unknown)
        }
    }
}

impl From<HostStatus> for PrinterStatus {
    fn from(hs: HostStatus) -> Self {
        let blocked = hs.paper_out
            || hs.paused
            || hs.head_up
            || hs.ribbon_out
            || hs.buffer_full
            || hs.corrupt_ram
            || hs.under_temperature
            || hs.over_temperature;

        Self {
            ready_to_print: !blocked,
            head_open: hs.head_up,
            paused: hs.paused,
            paper_out: hs.paper_out,
        }
    }
}

impl From<LineStatus> for PrinterStatus {
    fn from(ls: LineStatus) -> Self {
        Self {
            ready_to_print: !(ls.busy || ls.paper_out || ls.latch_open),
            head_open: ls.latch_open,
            paused: false,
            paper_out: ls.paper_out,
        }
    }
}

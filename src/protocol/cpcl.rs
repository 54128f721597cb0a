//! # CPCL
//!
//! Status byte query and the CPCL test label for mobile printers in
//! line-print mode.
//!
//! ## Status (`ESC h`)
//!
//! The printer answers with a single byte:
//!
//! | Bit | Meaning |
//! |-----|---------|
//! | 0 | busy |
//! | 1 | paper out |
//! | 2 | latch (head) open |
//! | 3 | battery low |

/// Status byte request (ESC h)
pub const STATUS_REQUEST: &[u8] = &[0x1B, b'h'];

/// Test label: a box with TEST in the middle on a 2" square label.
pub const TEST_LABEL: &[u8] = b"! 0 200 200 406 1\r\n\
ON-FEED IGNORE\r\n\
BOX 20 20 380 380 8\r\n\
T 0 6 137 177 TEST\r\n\
PRINT\r\n";

/// Flags decoded from the `ESC h` status byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStatus {
    pub busy: bool,
    pub paper_out: bool,
    pub latch_open: bool,
    pub battery_low: bool,
}

pub fn parse_status_byte(byte: u8) -> LineStatus {
    LineStatus {
        busy: byte & 0b0001 != 0,
        paper_out: byte & 0b0010 != 0,
        latch_open: byte & 0b0100 != 0,
        battery_low: byte & 0b1000 != 0,
    }
}

//! # ZPL
//!
//! Host status query and the ZPL test label.
//!
//! ## Host Status (`~HS`)
//!
//! The printer answers with three records, each framed by STX (0x02) and
//! ETX (0x03) and followed by CR LF:
//!
//! ```text
//! <STX>aaa,b,c,dddd,eee,f,g,h,iii,j,k,l<ETX>
//! <STX>mmm,n,o,p,q,r,s,t,uuuuuuuu,v,www<ETX>
//! <STX>xxxx,y<ETX>
//! ```
//!
//! | Record | Field | Meaning |
//! |--------|-------|---------|
//! | 1 | b | paper out |
//! | 1 | c | pause |
//! | 1 | f | receive buffer full |
//! | 1 | j | corrupt RAM |
//! | 1 | k | under temperature |
//! | 1 | l | over temperature |
//! | 2 | o | head up |
//! | 2 | p | ribbon out |
//!
//! Only the first two records carry flags we use.

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Host status request
pub const HOST_STATUS: &[u8] = b"~HS\r\n";

/// Test label: a four-section shipping label (sender block with logo,
/// recipient and permit box, Code 128 barcode, reference boxes).
pub const TEST_LABEL: &[u8] = b"^XA\
^FX Top section with company logo, name and address.\
^CF0,60^FO50,50^GB100,100,100^FS^FO75,75^FR^GB100,100,100^FS^FO88,88^GB50,50,50^FS\
^FO220,50^FDIntershipping, Inc.^FS\
^CF0,30^FO220,115^FD1000 Shipping Lane^FS\
^FO220,155^FDShelbyville TN 38102^FS\
^FO220,195^FDUnited States (USA)^FS\
^FO50,250^GB700,1,3^FS\
^FX Second section with recipient address and permit information.\
^CFA,30^FO50,300^FDJohn Doe^FS\
^FO50,340^FD100 Main Street^FS\
^FO50,380^FDSpringfield TN 39021^FS\
^FO50,420^FDUnited States (USA)^FS\
^CFA,15^FO600,300^GB150,150,3^FS\
^FO638,340^FDPermit^FS\
^FO638,390^FD123456^FS\
^FO50,500^GB700,1,3^FS\
^FX Third section with barcode.\
^BY5,2,270^FO100,550^BC^FD12345678^FS\
^FX Fourth section (the two boxes on the bottom).\
^FO50,900^GB700,250,3^FS^FO400,900^GB1,250,3^FS\
^CF0,40^FO100,960^FDCtr. X34B-1^FS\
^FO100,1010^FDREF1 F00B47^FS\
^FO100,1060^FDREF2 BL4H8^FS\
^CF0,190^FO470,955^FDCA^FS\
^XZ";

/// Flags decoded from a `~HS` reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStatus {
    pub paper_out: bool,
    pub paused: bool,
    pub buffer_full: bool,
    pub corrupt_ram: bool,
    pub under_temperature: bool,
    pub over_temperature: bool,
    pub head_up: bool,
    pub ribbon_out: bool,
}

/// Decode a `~HS` reply.
///
/// Returns `None` until the first two STX/ETX records are complete.
pub fn parse_host_status(raw: &[u8]) -> Option<HostStatus> {
    let records = framed_records(raw);
    if records.len() < 2 {
        return None;
    }

    let first = fields(records[0]);
    let second = fields(records[1]);
    if first.len() < 3 || second.len() < 3 {
        return None;
    }

    Some(HostStatus {
        paper_out: flag(&first, 1),
        paused: flag(&first, 2),
        buffer_full: flag(&first, 5),
        corrupt_ram: flag(&first, 9),
        under_temperature: flag(&first, 10),
        over_temperature: flag(&first, 11),
        head_up: flag(&second, 2),
        ribbon_out: flag(&second, 3),
    })
}

/// Complete STX...ETX records, in order, without the framing bytes.
fn framed_records(raw: &[u8]) -> Vec<&[u8]> {
    let mut records = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.iter().position(|&b| b == STX) {
        let body = &rest[start + 1..];
        let Some(end) = body.iter().position(|&b| b == ETX) else {
            break;
        };
        records.push(&body[..end]);
        rest = &body[end + 1..];
    }

    records
}

fn fields(record: &[u8]) -> Vec<&[u8]> {
    record.split(|&b| b == b',').collect()
}

fn flag(fields: &[&[u8]], index: usize) -> bool {
    fields
        .get(index)
        .is_some_and(|f| f.trim_ascii() == b"1")
}

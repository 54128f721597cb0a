//! # SGD (Set-Get-Do) Commands
//!
//! SGD is the text command channel every Link-OS printer understands
//! regardless of its active label language. A query looks like:
//!
//! ```text
//! ! U1 getvar "device.languages"\r\n
//! ```
//!
//! and the printer answers with the value in double quotes, e.g. `"zpl"`.

/// Variable holding the active command language
pub const DEVICE_LANGUAGES: &str = "device.languages";

/// Build a `getvar` query for `name`.
pub fn getvar(name: &str) -> Vec<u8> {
    format!("! U1 getvar \"{}\"\r\n", name).into_bytes()
}

/// Extract the quoted value from a `getvar` reply.
///
/// Returns `None` until both quotes have arrived, so callers can feed a
/// partially received buffer and keep reading.
pub fn parse_reply(raw: &[u8]) -> Option<String> {
    let open = raw.iter().position(|&b| b == b'"')?;
    let rest = &raw[open + 1..];
    let close = rest.iter().position(|&b| b == b'"')?;
    Some(String::from_utf8_lossy(&rest[..close]).into_owned())
}

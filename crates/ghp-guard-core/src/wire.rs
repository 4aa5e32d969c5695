//! STX/ETX wire helpers shared by the relay.
//!
//! The legacy protocol marks message boundaries informally with STX (`0x02`)
//! and ETX (`0x03`). Nothing here enforces framing; these helpers only build
//! the synthesized rejection reply and render chunks for the event log.

use crate::validator::RejectReason;
use std::borrow::Cow;

/// Start-of-text frame delimiter.
pub const STX: u8 = 0x02;
/// End-of-text frame delimiter.
pub const ETX: u8 = 0x03;

/// Default read capacity for one chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Build the reply sent back to the controller when a message is blocked:
/// `ERROR, text="Wrong Message Structure: {reason}"` followed by ETX.
pub fn rejection_reply(reason: &RejectReason) -> Vec<u8> {
    let mut reply = format!("ERROR, text=\"Wrong Message Structure: {reason}\"").into_bytes();
    reply.push(ETX);
    reply
}

/// Decode a chunk as ASCII text. Every byte above `0x7F` becomes `?`, so a
/// chunk of N bytes always yields N characters and multi-byte sequences never
/// reach the validator as Unicode whitespace.
pub fn decode_ascii(chunk: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(chunk) {
        Ok(text) if chunk.is_ascii() => Cow::Borrowed(text),
        _ => Cow::Owned(
            chunk
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect(),
        ),
    }
}

/// Render decoded text for a log line: STX/ETX become `<STX>`/`<ETX>` and
/// CR/LF are dropped.
pub fn render_for_log(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\u{02}' => out.push_str("<STX>"),
            '\u{03}' => out.push_str("<ETX>"),
            '\r' | '\n' => {}
            other => out.push(other),
        }
    }
    out
}

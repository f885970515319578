//! Response framing and decoding
//!
//! Admin responses are YAML documents. The server marks the end of each
//! document with a line consisting of `...`, in either line-ending style.
//! Framing searches for that sentinel from the end of the accumulated
//! buffer; the sentinel itself is the YAML document-end marker and is left
//! in place for the decoder.

use serde_yaml::Value;
use tarantest_core::{Error, Result};

const TERMINATOR_LF: &[u8] = b"\n...\n";
const TERMINATOR_CRLF: &[u8] = b"\r\n...\r\n";

/// True once the buffer contains a complete response document.
pub fn has_terminator(buf: &[u8]) -> bool {
    rfind(buf, TERMINATOR_LF).is_some() || rfind(buf, TERMINATOR_CRLF).is_some()
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Decode one framed response.
pub fn decode(buf: &[u8]) -> Result<Value> {
    serde_yaml::from_slice(buf)
        .map_err(|e| Error::Protocol(format!("failed to decode response: {}", e)))
}

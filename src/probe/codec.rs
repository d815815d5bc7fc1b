//! Probe payload wire format.
//!
//! ## Wire Format
//!
//! A probe payload is ASCII text: `"<seq> <micros>"` where `seq` is the probe
//! sequence number (starting at 1) and `micros` the send time in whole
//! microseconds since the Unix epoch. When the natural text is shorter than
//! the configured payload size, the payload is left-padded with ASCII `'0'`
//! up to that size; the fill merges into the sequence-number token, so
//! decoding must tolerate leading zero-fill before the first field.

use std::num::ParseIntError;
use std::str;

use thiserror::Error;

/// Errors decoding a received payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload bytes are not valid ASCII/UTF-8 text.
    #[error("payload is not valid text")]
    NotText,
    /// Payload does not split into exactly two whitespace-separated tokens.
    #[error("expected \"<seq> <micros>\", got {0} token(s)")]
    TokenCount(usize),
    /// A token is not a valid unsigned integer.
    #[error("invalid integer field: {0}")]
    Integer(#[from] ParseIntError),
}

/// A decoded probe payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePayload {
    /// Probe sequence number.
    pub seq: u64,
    /// Send time in microseconds since the Unix epoch.
    pub send_micros: u64,
}

impl ProbePayload {
    /// Send time in seconds since the Unix epoch.
    #[must_use]
    pub fn send_seconds(&self) -> f64 {
        self.send_micros as f64 / 1_000_000.0
    }
}

/// Encodes a probe payload, left-zero-padded to `padded_size` bytes.
///
/// The natural text wins when it is already longer than `padded_size`.
#[must_use]
pub fn encode(seq: u64, send_micros: u64, padded_size: usize) -> Vec<u8> {
    let text = format!("{seq} {send_micros}");
    let mut payload = Vec::with_capacity(padded_size.max(text.len()));
    payload.resize(padded_size.saturating_sub(text.len()), b'0');
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Decodes a received payload back into sequence number and send time.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not text, does not contain
/// exactly two whitespace-separated tokens, or either token is not an
/// unsigned integer.
pub fn decode(payload: &[u8]) -> Result<ProbePayload, DecodeError> {
    let text = str::from_utf8(payload).map_err(|_| DecodeError::NotText)?;
    let mut tokens = text.split_ascii_whitespace();
    let (seq, micros) = match (tokens.next(), tokens.next()) {
        (Some(seq), Some(micros)) => (seq, micros),
        (Some(_), None) => return Err(DecodeError::TokenCount(1)),
        _ => return Err(DecodeError::TokenCount(0)),
    };
    let extra = tokens.count();
    if extra > 0 {
        return Err(DecodeError::TokenCount(2 + extra));
    }
    Ok(ProbePayload {
        seq: seq.parse()?,
        send_micros: micros.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pads_to_size() {
        let payload = encode(1, 1_000_000_000, 20);
        assert_eq!(payload.len(), 20);
        assert_eq!(payload, b"000000001 1000000000");
    }

    #[test]
    fn encode_natural_length_wins() {
        let payload = encode(123_456_789, 1_700_000_000_000_000, 8);
        assert_eq!(payload, b"123456789 1700000000000000");
    }

    #[test]
    fn roundtrip_is_exact() {
        for (seq, micros, size) in [
            (1u64, 0u64, 20usize),
            (1, 1_000_000_000, 20),
            (u64::MAX, u64::MAX, 20),
            (42, 1_700_000_000_123_456, 64),
        ] {
            let encoded = encode(seq, micros, size);
            assert_eq!(encoded.len(), size.max(format!("{seq} {micros}").len()));
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded.seq, seq);
            assert_eq!(decoded.send_micros, micros);
            assert_eq!(decoded.send_seconds(), micros as f64 / 1_000_000.0);
        }
    }

    #[test]
    fn decode_tolerates_zero_fill_and_whitespace() {
        let decoded = decode(b"  000000001 1000000000 ").unwrap();
        assert_eq!(decoded.seq, 1);
        assert_eq!(decoded.send_micros, 1_000_000_000);
        assert_eq!(decoded.send_seconds(), 1000.0);
    }

    #[test]
    fn decode_rejects_wrong_token_count() {
        assert!(matches!(decode(b""), Err(DecodeError::TokenCount(0))));
        assert!(matches!(decode(b"12345"), Err(DecodeError::TokenCount(1))));
        assert!(matches!(decode(b"1 2 3"), Err(DecodeError::TokenCount(3))));
    }

    #[test]
    fn decode_rejects_non_integer_fields() {
        assert!(matches!(decode(b"abc 1000"), Err(DecodeError::Integer(_))));
        assert!(matches!(decode(b"1 10x0"), Err(DecodeError::Integer(_))));
        assert!(matches!(decode(b"-1 1000"), Err(DecodeError::Integer(_))));
    }

    #[test]
    fn decode_rejects_non_text() {
        assert!(matches!(decode(&[0xff, 0xfe, 0x20, 0x31]), Err(DecodeError::NotText)));
    }
}

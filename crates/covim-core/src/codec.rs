//! Wire framing.
//!
//! Packets are JSON objects written back to back with no delimiter or length
//! prefix, so the transport may coalesce or split them arbitrarily. Decoding
//! recovers from coalesced frames with the `}{` boundary rule: when the
//! accumulated text contains `}{`, only the text up to and including that `}`
//! is parsed and the rest of the accumulator is dropped. This loses every
//! packet after the first when several arrive in one read, and truncates a
//! payload that itself contains `}{`; peers rely on this exact behavior, so it
//! is kept as-is.
//!
//! A frame that ends mid-object (or mid UTF-8 sequence) is kept in the
//! accumulator until more bytes arrive.

use crate::message::Packet;
use bytes::BytesMut;

/// Largest incomplete frame kept while waiting for more bytes.
pub const MAX_PENDING_FRAME: usize = 1 << 20;

const BOUNDARY: &[u8] = b"}{";

/// Framing error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame was not valid UTF-8 or not a known packet. It has been
    /// discarded.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialize a packet to its wire bytes.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(packet)?)
}

/// The identity handshake: the raw display name, not JSON-wrapped.
pub fn encode_handshake(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

/// Take the identity handshake out of the accumulator.
///
/// Returns `None` until at least one byte (and a complete UTF-8 sequence) has
/// arrived. Surrounding whitespace is stripped.
pub fn decode_handshake(buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    match std::str::from_utf8(buf) {
        Ok(text) => {
            let name = text.trim().to_string();
            buf.clear();
            Ok(Some(name))
        }
        Err(e) if e.error_len().is_none() => Ok(None),
        Err(e) => {
            buf.clear();
            Err(CodecError::MalformedPacket(e.to_string()))
        }
    }
}

/// Decode at most one packet from the accumulator.
///
/// On success or on a malformed frame the consumed bytes are removed. When
/// the accumulator holds only part of a frame it is left untouched and
/// `Ok(None)` is returned.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }

    if let Some(pos) = find_boundary(buf) {
        let frame = buf.split_to(pos + 1);
        buf.clear();
        return parse_frame(&frame).map(Some);
    }

    let text = match std::str::from_utf8(buf) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => return pending(buf),
        Err(e) => {
            buf.clear();
            return Err(CodecError::MalformedPacket(e.to_string()));
        }
    };

    match serde_json::from_str::<Packet>(text) {
        Ok(packet) => {
            buf.clear();
            Ok(Some(packet))
        }
        Err(e) if e.is_eof() => pending(buf),
        Err(e) => {
            buf.clear();
            Err(CodecError::MalformedPacket(e.to_string()))
        }
    }
}

fn pending(buf: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
    if buf.len() > MAX_PENDING_FRAME {
        let len = buf.len();
        buf.clear();
        return Err(CodecError::MalformedPacket(format!(
            "incomplete frame exceeds {MAX_PENDING_FRAME} bytes ({len})"
        )));
    }
    Ok(None)
}

fn find_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(BOUNDARY.len()).position(|w| w == BOUNDARY)
}

fn parse_frame(frame: &[u8]) -> Result<Packet, CodecError> {
    serde_json::from_slice(frame).map_err(|e| CodecError::MalformedPacket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Cursor, Message, Update};

    fn bytes(packet: &Packet) -> BytesMut {
        BytesMut::from(&encode(packet).unwrap()[..])
    }

    #[test]
    fn single_frame() {
        let packet = Packet::Update(Update::cursor("alice", Cursor::new(2, 3)));
        let mut buf = bytes(&packet);
        assert_eq!(decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[test]
    fn coalesced_frames_keep_only_the_first() {
        let first = Packet::Message(Message::UserDisconnected { name: "bob".into() });
        let second = Packet::Update(Update::cursor("alice", Cursor::new(1, 1)));
        let mut buf = bytes(&first);
        buf.extend_from_slice(&encode(&second).unwrap());

        assert_eq!(decode(&mut buf).unwrap(), Some(first));
        assert!(buf.is_empty());
        assert_eq!(decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn boundary_inside_payload_truncates() {
        let packet = Packet::Message(Message::UserDisconnected {
            name: "a}{b".into(),
        });
        let mut buf = bytes(&packet);
        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::MalformedPacket(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn split_frame_waits_for_rest() {
        let packet = Packet::Update(Update::cursor("alice", Cursor::new(4, 9)));
        let encoded = encode(&packet).unwrap();
        let (head, tail) = encoded.split_at(encoded.len() / 2);

        let mut buf = BytesMut::from(head);
        assert_eq!(decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), head.len());

        buf.extend_from_slice(tail);
        assert_eq!(decode(&mut buf).unwrap(), Some(packet));
    }

    #[test]
    fn split_utf8_sequence_waits() {
        let packet = Packet::Message(Message::UserDisconnected { name: "é".into() });
        let encoded = encode(&packet).unwrap();
        let cut = encoded.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buf = BytesMut::from(&encoded[..cut]);
        assert_eq!(decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&encoded[cut..]);
        assert_eq!(decode(&mut buf).unwrap(), Some(packet));
    }

    #[test]
    fn garbage_is_discarded() {
        let mut buf = BytesMut::from(&b"not json at all"[..]);
        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::MalformedPacket(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn valid_json_unknown_packet_is_malformed() {
        let mut buf = BytesMut::from(&br#"{"hello": "world"}"#[..]);
        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::MalformedPacket(_))
        ));
    }

    #[test]
    fn handshake_is_raw_name() {
        assert_eq!(encode_handshake("alice"), b"alice".to_vec());
        let mut buf = BytesMut::from(&b"alice\n"[..]);
        assert_eq!(decode_handshake(&mut buf).unwrap().as_deref(), Some("alice"));
        assert!(buf.is_empty());
    }
}

//! Codec for encoding and decoding Foxglove WebSocket messages.
//!
//! JSON messages go through `serde_json`; binary messages are an opcode byte
//! followed by little-endian fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::{ClientBinary, ClientMessage, ServerBinary, ServerMessage, ServerOpcode};

/// Maximum binary message size (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum size.
    #[error("Message size {0} exceeds maximum {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    /// Not enough data to decode a field.
    #[error("Truncated message: need {0} more bytes")]
    Truncated(usize),

    /// Binary message with an unknown opcode.
    #[error("Unknown binary opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Empty binary message.
    #[error("Empty binary message")]
    Empty,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message data.
    #[error("Invalid message: {0}")]
    Invalid(String),
}

/// Encode a client JSON message to text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_client_json(msg: &ClientMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a server JSON message from text.
///
/// # Errors
///
/// Returns an error if the text is not a known server message.
pub fn decode_server_json(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a client binary message.
///
/// The encoded format is:
/// - 1 byte: opcode
/// - `MessageData`: u32 channel id, payload
/// - `ServiceCallRequest`: u32 service id, u32 call id, u32 encoding length,
///   encoding, payload
#[must_use]
pub fn encode_client_binary(msg: &ClientBinary) -> Bytes {
    match msg {
        ClientBinary::MessageData {
            channel_id,
            payload,
        } => {
            let mut buf = BytesMut::with_capacity(5 + payload.len());
            buf.put_u8(msg.opcode().into());
            buf.put_u32_le(*channel_id);
            buf.extend_from_slice(payload);
            buf.freeze()
        }
        ClientBinary::ServiceCallRequest {
            service_id,
            call_id,
            encoding,
            payload,
        } => {
            let mut buf = BytesMut::with_capacity(13 + encoding.len() + payload.len());
            buf.put_u8(msg.opcode().into());
            buf.put_u32_le(*service_id);
            buf.put_u32_le(*call_id);
            buf.put_u32_le(encoding.len() as u32);
            buf.extend_from_slice(encoding.as_bytes());
            buf.extend_from_slice(payload);
            buf.freeze()
        }
    }
}

/// Decode a server binary message.
///
/// # Errors
///
/// Returns an error if the message is empty, truncated, too large, or carries
/// an unknown opcode.
pub fn decode_server_binary(data: Bytes) -> Result<ServerBinary, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }

    let mut buf = data;
    if !buf.has_remaining() {
        return Err(ProtocolError::Empty);
    }

    let opcode = ServerOpcode::try_from(buf.get_u8()).map_err(ProtocolError::UnknownOpcode)?;

    match opcode {
        ServerOpcode::MessageData => {
            ensure_remaining(&buf, 12)?;
            let subscription_id = buf.get_u32_le();
            let timestamp = buf.get_u64_le();
            Ok(ServerBinary::MessageData {
                subscription_id,
                timestamp,
                payload: buf,
            })
        }
        ServerOpcode::Time => {
            ensure_remaining(&buf, 8)?;
            Ok(ServerBinary::Time {
                timestamp: buf.get_u64_le(),
            })
        }
        ServerOpcode::ServiceCallResponse => {
            ensure_remaining(&buf, 12)?;
            let service_id = buf.get_u32_le();
            let call_id = buf.get_u32_le();
            let encoding_len = buf.get_u32_le() as usize;
            ensure_remaining(&buf, encoding_len)?;
            let encoding = String::from_utf8(buf.split_to(encoding_len).to_vec())
                .map_err(|e| ProtocolError::Invalid(format!("encoding is not UTF-8: {e}")))?;
            Ok(ServerBinary::ServiceCallResponse {
                service_id,
                call_id,
                encoding,
                payload: buf,
            })
        }
    }
}

fn ensure_remaining(buf: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated(needed - buf.remaining()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_message_data(subscription_id: u32, timestamp: u64, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(0x01);
        buf.put_u32_le(subscription_id);
        buf.put_u64_le(timestamp);
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    #[test]
    fn test_encode_message_data() {
        let msg = ClientBinary::MessageData {
            channel_id: 0x0102_0304,
            payload: Bytes::from_static(b"abc"),
        };

        let encoded = encode_client_binary(&msg);
        assert_eq!(&encoded[..], &[0x01, 0x04, 0x03, 0x02, 0x01, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_service_call_request() {
        let msg = ClientBinary::ServiceCallRequest {
            service_id: 2,
            call_id: 9,
            encoding: "cdr".to_string(),
            payload: Bytes::from_static(&[0xAA]),
        };

        let encoded = encode_client_binary(&msg);
        assert_eq!(encoded[0], 0x02);
        assert_eq!(&encoded[1..5], &2u32.to_le_bytes());
        assert_eq!(&encoded[5..9], &9u32.to_le_bytes());
        assert_eq!(&encoded[9..13], &3u32.to_le_bytes());
        assert_eq!(&encoded[13..16], b"cdr");
        assert_eq!(encoded[16], 0xAA);
    }

    #[test]
    fn test_decode_message_data() {
        let data = server_message_data(5, 42, b"hello");
        match decode_server_binary(data).unwrap() {
            ServerBinary::MessageData {
                subscription_id,
                timestamp,
                payload,
            } => {
                assert_eq!(subscription_id, 5);
                assert_eq!(timestamp, 42);
                assert_eq!(&payload[..], b"hello");
            }
            other => panic!("Expected MessageData, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_service_call_response() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x03);
        buf.put_u32_le(4);
        buf.put_u32_le(17);
        buf.put_u32_le(4);
        buf.extend_from_slice(b"ros1");
        buf.extend_from_slice(&[1, 2]);

        match decode_server_binary(buf.freeze()).unwrap() {
            ServerBinary::ServiceCallResponse {
                service_id,
                call_id,
                encoding,
                payload,
            } => {
                assert_eq!(service_id, 4);
                assert_eq!(call_id, 17);
                assert_eq!(encoding, "ros1");
                assert_eq!(&payload[..], &[1, 2]);
            }
            other => panic!("Expected ServiceCallResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated() {
        let data = server_message_data(5, 42, b"");
        let partial = data.slice(..6);
        match decode_server_binary(partial) {
            Err(ProtocolError::Truncated(_)) => {}
            other => panic!("Expected Truncated error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_opcode() {
        match decode_server_binary(Bytes::from_static(&[0x7F, 0, 0])) {
            Err(ProtocolError::UnknownOpcode(0x7F)) => {}
            other => panic!("Expected UnknownOpcode error, got {:?}", other),
        }
        assert!(matches!(
            decode_server_binary(Bytes::new()),
            Err(ProtocolError::Empty)
        ));
    }

    #[test]
    fn test_decode_server_json_rejects_unknown_op() {
        assert!(decode_server_json(r#"{"op":"bogus"}"#).is_err());
        assert!(decode_server_json(r#"{"op":"unadvertise","channelIds":[1,2]}"#).is_ok());
    }
}

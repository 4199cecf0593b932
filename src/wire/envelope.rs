//! Inbound frame envelope
//!
//! Frames arrive as JSON envelopes with a `type` discriminator and an opaque
//! payload. Control frames (handshake acks, keep-alives) are recognized here
//! so the read loop can discard them before fan-out.

use bytes::Bytes;
use serde::Deserialize;

/// Discriminator sent by a factory to initialize the stream handshake
pub const CONNECTION_INIT: &str = "connection_init";

/// Discriminator acknowledging the stream handshake
pub const CONNECTION_ACK: &str = "connection_ack";

/// Keep-alive discriminator
pub const KEEP_ALIVE: &str = "ka";

/// Decoded frame envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// The frame's discriminator field
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload; consumers decode this themselves
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Check whether this is a control frame that must not reach subscribers
    pub fn is_control(&self) -> bool {
        self.message_type == CONNECTION_ACK || self.message_type == KEEP_ALIVE
    }
}

/// An inbound wire message: either a decoded envelope or the raw frame bytes
///
/// Frames that fail to decode are passed through as `Raw`; classification is
/// best-effort and only control frames are ever withheld from subscribers.
#[derive(Debug, Clone)]
pub enum WireMessage {
    /// Frame that did not decode as an envelope
    Raw(Bytes),
    /// Decoded envelope
    Envelope(Envelope),
}

impl WireMessage {
    /// Decode a raw frame into a wire message
    pub fn decode(raw: &Bytes) -> Self {
        match serde_json::from_slice::<Envelope>(raw) {
            Ok(envelope) => WireMessage::Envelope(envelope),
            Err(_) => WireMessage::Raw(raw.clone()),
        }
    }

    /// Check whether this frame is a control frame
    pub fn is_control(&self) -> bool {
        matches!(self, WireMessage::Envelope(envelope) if envelope.is_control())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keep_alive() {
        let raw = Bytes::from_static(br#"{"type":"ka"}"#);
        let message = WireMessage::decode(&raw);

        assert!(message.is_control());
        match message {
            WireMessage::Envelope(envelope) => {
                assert_eq!(envelope.message_type, KEEP_ALIVE);
                assert!(envelope.payload.is_null());
            }
            WireMessage::Raw(_) => panic!("expected envelope"),
        }
    }

    #[test]
    fn test_decode_connection_ack() {
        let raw = Bytes::from_static(br#"{"type":"connection_ack","payload":{}}"#);
        let message = WireMessage::decode(&raw);

        assert!(message.is_control());
    }

    #[test]
    fn test_decode_data_frame() {
        let raw = Bytes::from_static(br#"{"type":"data","payload":{"value":42}}"#);
        let message = WireMessage::decode(&raw);

        assert!(!message.is_control());
        match message {
            WireMessage::Envelope(envelope) => {
                assert_eq!(envelope.message_type, "data");
                assert_eq!(envelope.payload["value"], 42);
            }
            WireMessage::Raw(_) => panic!("expected envelope"),
        }
    }

    #[test]
    fn test_undecodable_frame_passes_through_raw() {
        let raw = Bytes::from_static(b"\x00\x01 not json");
        let message = WireMessage::decode(&raw);

        assert!(!message.is_control());
        match message {
            WireMessage::Raw(bytes) => assert_eq!(bytes, raw),
            WireMessage::Envelope(_) => panic!("expected raw"),
        }
    }

    #[test]
    fn test_frame_without_discriminator_passes_through_raw() {
        let raw = Bytes::from_static(br#"{"payload":{"value":1}}"#);
        let message = WireMessage::decode(&raw);

        assert!(!message.is_control());
        assert!(matches!(message, WireMessage::Raw(_)));
    }
}

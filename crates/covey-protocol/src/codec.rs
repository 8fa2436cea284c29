//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The rest of the server never calls `serde_json` directly; it goes
//! through [`Codec`], so a binary format can be slotted in later without
//! touching the handler.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Browser clients speak JSON natively, so this is the default.
///
/// ## Example
///
/// ```rust
/// use covey_protocol::{Codec, Envelope, JsonCodec, Payload, SystemMessage};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(
///     1,
///     5000,
///     Payload::System(SystemMessage::Heartbeat { client_time: 5000 }),
/// );
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEvent, Direction, Envelope, Payload, UserLocation};

    #[test]
    fn test_decode_truncated_frame_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"{\"seq\": 1, ");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_then_decode_client_event_preserves_location() {
        let envelope = Envelope::new(
            3,
            0,
            Payload::Client(ClientEvent::PlayerMovement {
                location: UserLocation {
                    x: 12.5,
                    y: -4.0,
                    rotation: Direction::Left,
                    moving: true,
                    conversation_label: Some("A1".into()),
                },
            }),
        );

        let bytes = JsonCodec.encode(&envelope).unwrap();
        let decoded: Envelope = JsonCodec.decode(&bytes).unwrap();

        assert_eq!(decoded, envelope);
    }
}

//! Message codec — frame tags and control-message serialization.
//!
//! Every frame on the wire starts with a single tag byte. `MESSAGE` frames
//! carry one bincode-encoded [`ControlMessage`]; `STREAM` frames carry
//! nothing — they announce that raw bytes follow out-of-band and the
//! connection's decode loop must stand aside until the stream is drained.

use brook_messages::ControlMessage;

use crate::ProtocolError;

/// Frame tag: an encoded [`ControlMessage`] follows.
pub const TAG_MESSAGE: u8 = 0x1;

/// Frame tag: raw stream bytes follow, outside the framing layer.
pub const TAG_STREAM: u8 = 0x2;

/// Upper bound on an encoded control message.
///
/// The receiving side performs a single bounded read of this many bytes —
/// not a read-to-completion loop — so anything longer truncates on the
/// wire and fails to decode. [`encode`] refuses oversized messages so a
/// well-behaved node never produces such a frame.
pub const MAX_MESSAGE_SIZE: usize = 1028;

/// Encode a control message for transmission.
pub fn encode(message: &ControlMessage) -> Result<Vec<u8>, ProtocolError> {
    let bytes =
        bincode::serialize(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode a control message from the payload of a `MESSAGE` frame.
pub fn decode(data: &[u8]) -> Result<ControlMessage, ProtocolError> {
    bincode::deserialize(data).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

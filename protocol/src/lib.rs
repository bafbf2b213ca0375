//! Wire protocol for brook — frame tags and message encoding/decoding.

pub mod codec;
pub mod error;

pub use codec::{decode, encode, MAX_MESSAGE_SIZE, TAG_MESSAGE, TAG_STREAM};
pub use error::ProtocolError;

//! Wire codecs: pairs a [`Framing`](crate::framing::Framing) strategy (or, for BSON, a built-in
//! length prefix) with a payload format to turn raw bytes into [`WireMessage`]s and back.

#[cfg(feature = "bson")]
mod bson_codec;
mod json_codec;

#[cfg(feature = "bson")]
pub use bson_codec::BsonCodec;
pub use json_codec::JsonCodec;

use bytes::{Bytes, BytesMut};

use crate::core::error::{CodecError, FramingError};
use crate::core::message::{ProtocolTag, WireMessage};

/// A complete wire format: frame extraction plus payload (de)serialization.
pub trait Codec: Send + Sync + 'static {
    /// Pulls the next complete frame's raw payload off the front of `buf`, or `None` if only a
    /// partial frame has arrived so far.
    fn extract_frame(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError>;

    /// Decodes one frame's payload (as returned by [`Self::extract_frame`]) into a structured
    /// message.
    fn decode(&self, frame: &[u8]) -> Result<WireMessage, CodecError>;

    /// Serializes a structured message and wraps it for transmission.
    fn encode(&self, msg: &WireMessage) -> Result<Bytes, CodecError>;

    /// Whether this codec can carry batches of messages in one frame.
    fn supports_batch(&self) -> bool {
        true
    }

    fn protocol_tag(&self) -> ProtocolTag;
}

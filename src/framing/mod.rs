//! Frame extraction and wrapping strategies for the JSON-RPC wire formats.
//!
//! A [`Framing`] implementation owns exactly one responsibility: given the bytes accumulated so
//! far from the stream, find the boundary of the next complete message (if any), and given a
//! serialized message body, wrap it so the boundary is recoverable by the peer. It never
//! interprets the payload itself — that is the [`Codec`](crate::codec::Codec)'s job.

mod frameless;
mod netstring;
mod rfc7464;

pub use frameless::FramelessFraming;
pub use netstring::NetstringFraming;
pub use rfc7464::Rfc7464Framing;

use bytes::{Bytes, BytesMut};

use crate::core::error::FramingError;

/// Extracts one complete frame's payload from the front of a growing buffer, or wraps an
/// outgoing payload for transmission.
pub trait Framing: Send + Sync + 'static {
    /// Attempts to pull one complete frame out of `buf`. On success, the consumed bytes
    /// (markers included) are removed from the front of `buf` and the frame's payload is
    /// returned. Returns `Ok(None)` if `buf` holds only a partial frame so far — in that case
    /// `buf` is left untouched so more bytes can be appended before retrying.
    fn extract(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError>;

    /// Wraps a serialized message body for transmission.
    fn wrap(&self, payload: &[u8]) -> Bytes;
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn roundtrip(framing: &dyn Framing, payload: &[u8]) {
        let wrapped = framing.wrap(payload);
        let mut buf = BytesMut::from(&wrapped[..]);
        let extracted = framing.extract(&mut buf).unwrap().unwrap();
        assert_eq!(&extracted[..], payload);
        assert!(buf.is_empty());
    }
}

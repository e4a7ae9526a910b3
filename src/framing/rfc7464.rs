use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::error::FramingError;

use super::Framing;

/// RFC 7464 "JSON Text Sequences" framing: each message is wrapped between a record separator
/// (`0x1e`) and a trailing line feed (`0x0a`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Rfc7464Framing;

impl Framing for Rfc7464Framing {
    fn extract(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        if buf[0] != 0x1e {
            return Err(FramingError::MissingStartMarker);
        }
        match buf.iter().position(|&b| b == 0x0a) {
            Some(pos) => {
                let mut frame = buf.split_to(pos + 1);
                frame.advance(1);
                let len = frame.len();
                frame.truncate(len - 1);
                Ok(Some(frame.freeze()))
            }
            None => {
                if buf[1..].contains(&0x1e) {
                    Err(FramingError::MissingEndMarker)
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn wrap(&self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() + 2);
        out.put_u8(0x1e);
        out.extend_from_slice(payload);
        out.put_u8(0x0a);
        out.freeze()
    }
}

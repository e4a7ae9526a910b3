use bytes::{Bytes, BytesMut};

use crate::core::error::FramingError;

use super::Framing;

/// Netstring framing: `<length>:<payload>,`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetstringFraming;

impl Framing for NetstringFraming {
    fn extract(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        let colon = match buf.iter().position(|&b| b == b':') {
            Some(pos) => pos,
            None => {
                if buf.len() > 10 {
                    return Err(FramingError::InvalidLength(
                        "length prefix missing ':' delimiter".to_string(),
                    ));
                }
                return Ok(None);
            }
        };

        let len_str = std::str::from_utf8(&buf[..colon])
            .map_err(|e| FramingError::InvalidLength(e.to_string()))?;
        let msg_len: i64 = len_str
            .parse()
            .map_err(|_| FramingError::InvalidLength(len_str.to_string()))?;
        if msg_len < 0 {
            return Err(FramingError::InvalidLength(format!(
                "negative length {msg_len}"
            )));
        }
        let msg_len = msg_len as usize;

        let remaining_after_colon = buf.len() - colon - 1;
        if remaining_after_colon < msg_len + 1 {
            return Ok(None);
        }

        let mut frame = buf.split_to(colon + 1 + msg_len + 1);
        frame = frame.split_off(colon + 1);
        if frame[msg_len] != b',' {
            return Err(FramingError::Malformed(
                "netstring frame missing trailing ','".to_string(),
            ));
        }
        frame.truncate(msg_len);
        Ok(Some(frame.freeze()))
    }

    fn wrap(&self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() + 12);
        out.extend_from_slice(payload.len().to_string().as_bytes());
        out.extend_from_slice(b":");
        out.extend_from_slice(payload);
        out.extend_from_slice(b",");
        out.freeze()
    }
}

use bytes::{Bytes, BytesMut};

use crate::core::error::FramingError;

use super::Framing;

const OPEN_BRACKET: u8 = b'[';
const CLOSE_BRACKET: u8 = b']';
const OPEN_BRACE: u8 = b'{';
const CLOSE_BRACE: u8 = b'}';
const QUOTE: u8 = b'"';
const BACKSLASH: u8 = b'\\';
const LOWER_U: u8 = b'u';

fn poppers(top: u8) -> &'static [u8] {
    match top {
        OPEN_BRACKET => &[CLOSE_BRACKET],
        OPEN_BRACE => &[CLOSE_BRACE],
        QUOTE => &[QUOTE],
        _ => &[],
    }
}

fn adders(top: u8) -> &'static [u8] {
    match top {
        OPEN_BRACKET | OPEN_BRACE => &[QUOTE, OPEN_BRACKET, OPEN_BRACE],
        QUOTE => &[BACKSLASH],
        BACKSLASH => &[LOWER_U],
        _ => &[],
    }
}

/// Frameless strategy: no markers at all, the boundary of a message is inferred by tracking
/// brace/bracket/string/escape nesting directly over the byte stream. Only a bare JSON object is
/// accepted as the outermost value.
#[derive(Debug, Default, Clone, Copy)]
pub struct FramelessFraming;

impl Framing for FramelessFraming {
    fn extract(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        if buf[0] != OPEN_BRACE {
            return Err(FramingError::Malformed(format!(
                "expected a JSON object, got byte {:#x}",
                buf[0]
            )));
        }

        let mut stack = vec![OPEN_BRACE];
        let mut uniesc: u8 = 0;

        for idx in 1..buf.len() {
            let cbyte = buf[idx];
            let top = *stack.last().expect("stack only emptied via early return");

            if poppers(top).contains(&cbyte) {
                stack.pop();
            } else if adders(top).contains(&cbyte) {
                stack.push(cbyte);
            } else if top == BACKSLASH {
                stack.pop();
            } else if top == LOWER_U {
                uniesc += 1;
                if uniesc >= 4 {
                    stack.truncate(stack.len() - 2);
                    uniesc = 0;
                }
            }

            if stack.is_empty() {
                let frame = buf.split_to(idx + 1);
                return Ok(Some(frame.freeze()));
            }
        }
        Ok(None)
    }

    fn wrap(&self, payload: &[u8]) -> Bytes {
        Bytes::copy_from_slice(payload)
    }
}

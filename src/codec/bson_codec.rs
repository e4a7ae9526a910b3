use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

use crate::core::error::{CodecError, FramingError};
use crate::core::message::{ProtocolTag, WireMessage};

use super::Codec;

/// The BSON-RPC wire format. BSON documents are already self-length-prefixed (the first four
/// little-endian bytes of every document give its own total length), so framing needs no extra
/// marker: the frame boundary is just "however many bytes the document's own header says".
/// Unlike JSON-RPC, BSON-RPC carries no batching: a frame is always exactly one document.
pub struct BsonCodec {
    max_frame_bytes: Option<usize>,
}

impl BsonCodec {
    pub fn new(max_frame_bytes: Option<usize>) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for BsonCodec {
    fn default() -> Self {
        Self::new(Some(16 * 1024 * 1024))
    }
}

impl Codec for BsonCodec {
    fn extract_frame(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let mut len_prefix = &buf[0..4];
        let total_len = len_prefix.get_u32_le() as usize;
        if let Some(max) = self.max_frame_bytes {
            if total_len > max {
                return Err(FramingError::TooLarge {
                    actual: total_len,
                    max,
                });
            }
        }
        if total_len < 5 {
            return Err(FramingError::InvalidLength(format!(
                "BSON document length {total_len} below minimum of 5"
            )));
        }
        if buf.len() < total_len {
            return Ok(None);
        }
        Ok(Some(buf.split_to(total_len).freeze()))
    }

    fn decode(&self, frame: &[u8]) -> Result<WireMessage, CodecError> {
        let doc = bson::Document::from_reader(&mut std::io::Cursor::new(frame))
            .map_err(|e| CodecError::Decoding(e.to_string()))?;
        let value: Value =
            bson::from_document(doc).map_err(|e| CodecError::Decoding(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(WireMessage::Single(map)),
            other => Err(CodecError::Decoding(format!(
                "expected a BSON document, got {other}"
            ))),
        }
    }

    fn encode(&self, msg: &WireMessage) -> Result<Bytes, CodecError> {
        let map = match msg {
            WireMessage::Single(map) => map.clone(),
            WireMessage::Batch(_) => {
                return Err(CodecError::Encoding(
                    "BSON-RPC does not support batched messages".to_string(),
                ))
            }
        };
        let doc = bson::to_document(&Value::Object(map))
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        let mut out = Vec::new();
        doc.to_writer(&mut out)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    fn supports_batch(&self) -> bool {
        false
    }

    fn protocol_tag(&self) -> ProtocolTag {
        ProtocolTag::Bson
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_message_roundtrip() {
        let codec = BsonCodec::default();
        let mut map = serde_json::Map::new();
        map.insert("bsonrpc".into(), json!("2.0"));
        map.insert("id".into(), json!("id-1"));
        map.insert("result".into(), json!({"ok": true}));
        let msg = WireMessage::Single(map.clone());

        let wire = codec.encode(&msg).unwrap();
        let mut buf = BytesMut::from(&wire[..]);
        let frame = codec.extract_frame(&mut buf).unwrap().unwrap();
        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded, WireMessage::Single(map));
        assert!(buf.is_empty());
    }

    #[test]
    fn batch_encoding_is_rejected() {
        let codec = BsonCodec::default();
        let err = codec.encode(&WireMessage::Batch(vec![])).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(_)));
    }

    #[test]
    fn oversized_length_prefix_is_a_framing_error() {
        let codec = BsonCodec::new(Some(16));
        let mut buf = BytesMut::from(&30u32.to_le_bytes()[..]);
        buf.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            codec.extract_frame(&mut buf),
            Err(FramingError::TooLarge { .. })
        ));
    }
}

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::core::error::{CodecError, FramingError};
use crate::core::message::{ProtocolTag, WireMessage};
use crate::framing::Framing;

use super::Codec;

/// The JSON-RPC 2.0 wire format, parameterized over which [`Framing`] delimits messages.
pub struct JsonCodec<F: Framing> {
    framing: F,
}

impl<F: Framing> JsonCodec<F> {
    pub fn new(framing: F) -> Self {
        Self { framing }
    }
}

impl<F: Framing> Codec for JsonCodec<F> {
    fn extract_frame(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        self.framing.extract(buf)
    }

    fn decode(&self, frame: &[u8]) -> Result<WireMessage, CodecError> {
        let value: Value =
            serde_json::from_slice(frame).map_err(|e| CodecError::Decoding(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(WireMessage::Single(map)),
            Value::Array(items) => {
                let mut batch = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(map) => batch.push(map),
                        other => {
                            return Err(CodecError::Decoding(format!(
                                "batch element must be an object, got {other}"
                            )))
                        }
                    }
                }
                Ok(WireMessage::Batch(batch))
            }
            other => Err(CodecError::Decoding(format!(
                "expected a JSON object or array, got {other}"
            ))),
        }
    }

    fn encode(&self, msg: &WireMessage) -> Result<Bytes, CodecError> {
        let value = match msg {
            WireMessage::Single(map) => Value::Object(map.clone()),
            WireMessage::Batch(items) => {
                Value::Array(items.iter().cloned().map(Value::Object).collect())
            }
        };
        let bytes =
            serde_json::to_vec(&value).map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(self.framing.wrap(&bytes))
    }

    fn protocol_tag(&self) -> ProtocolTag {
        ProtocolTag::Json
    }
}

//! Envelope construction and classification for JSON-RPC 2.0 / BSON-RPC 2.0 messages.
//!
//! A message on the wire is always a mapping from string keys to values (a "single" message) or
//! an ordered sequence of such mappings (a "batch"). This module never inspects transport bytes
//! directly — it operates purely on the decoded, structured form that a [`Codec`](crate::codec::Codec)
//! produces.

use serde_json::{Map, Value};

use crate::core::error::JsonRpcError;

/// Request/response correlation id. Per the wire formats this must be a JSON string or number;
/// `Value::Null` is only ever used to mark an error response whose request id could not be
/// determined (e.g. a parse error).
pub type MessageId = Value;

/// Which protocol tag a message mapping carries: `"jsonrpc"` or `"bsonrpc"`, both pinned to
/// version `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolTag {
    Json,
    Bson,
}

impl ProtocolTag {
    fn key(self) -> &'static str {
        match self {
            ProtocolTag::Json => "jsonrpc",
            ProtocolTag::Bson => "bsonrpc",
        }
    }
}

/// A decoded frame: either one envelope or a batch of them.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Single(Map<String, Value>),
    Batch(Vec<Map<String, Value>>),
}

/// How positional/keyword arguments were supplied when building a request or notification,
/// mirroring the single rule used on both the Rust and original-library side: a lone positional
/// argument with no keyword arguments is sent bare (not wrapped in an array), otherwise
/// positional arguments become a JSON array and keyword arguments become a JSON object. The two
/// styles are mutually exclusive on a single call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallParams {
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
    Bare(Value),
}

impl CallParams {
    fn into_value(self) -> Option<Value> {
        match self {
            CallParams::None => None,
            CallParams::Positional(v) => Some(Value::Array(v)),
            CallParams::Named(m) => Some(Value::Object(m)),
            CallParams::Bare(v) => Some(v),
        }
    }
}

/// Builds a request envelope: `{jsonrpc, method, params?, id}`.
pub fn request(tag: ProtocolTag, id: MessageId, method: &str, params: CallParams) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(tag.key().to_string(), Value::String("2.0".to_string()));
    m.insert("method".to_string(), Value::String(method.to_string()));
    if let Some(p) = params.into_value() {
        m.insert("params".to_string(), p);
    }
    m.insert("id".to_string(), id);
    m
}

/// Builds a notification envelope: `{jsonrpc, method, params?}` — no `id` key at all.
pub fn notification(tag: ProtocolTag, method: &str, params: CallParams) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(tag.key().to_string(), Value::String("2.0".to_string()));
    m.insert("method".to_string(), Value::String(method.to_string()));
    if let Some(p) = params.into_value() {
        m.insert("params".to_string(), p);
    }
    m
}

/// Builds a successful response envelope: `{jsonrpc, id, result}`.
pub fn response_ok(tag: ProtocolTag, id: MessageId, result: Value) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(tag.key().to_string(), Value::String("2.0".to_string()));
    m.insert("id".to_string(), id);
    m.insert("result".to_string(), result);
    m
}

/// Builds an error response envelope: `{jsonrpc, id, error}`. `id` is `Value::Null` when the
/// request id could not be recovered (parse errors, malformed batches).
pub fn response_error(tag: ProtocolTag, id: MessageId, error: JsonRpcError) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(tag.key().to_string(), Value::String("2.0".to_string()));
    m.insert("id".to_string(), id);
    m.insert(
        "error".to_string(),
        serde_json::to_value(error).expect("JsonRpcError always serializes"),
    );
    m
}

/// True if `m` carries a non-null `id` and a `method` — a request awaiting a response.
pub fn is_request(m: &Map<String, Value>) -> bool {
    m.contains_key("method") && matches!(m.get("id"), Some(v) if !v.is_null())
}

/// True if `m` carries a `method` and no `id` key at all — fire-and-forget.
pub fn is_notification(m: &Map<String, Value>) -> bool {
    m.contains_key("method") && !m.contains_key("id")
}

/// True if `m` carries `result` (and therefore is not an error response).
pub fn is_response(m: &Map<String, Value>) -> bool {
    m.contains_key("id") && m.contains_key("result") && !m.contains_key("error")
}

/// True if `m` carries an `error` object, regardless of whether `id` is present or null.
pub fn is_error_response(m: &Map<String, Value>) -> bool {
    m.contains_key("error")
}

/// True if `m` has an `id` but lacks both `result` and `error` — not a valid response, but also
/// not a request/notification; this is a protocol violation and should be reported as a
/// schema error rather than silently dropped.
pub fn is_malformed(m: &Map<String, Value>) -> bool {
    !is_request(m) && !is_notification(m) && !is_response(m) && !is_error_response(m)
}

pub fn extract_id(m: &Map<String, Value>) -> Option<MessageId> {
    m.get("id").cloned()
}

/// Splits a decoded `params` value back into positional arguments and named arguments, the
/// inverse of [`CallParams::into_value`]: an array becomes positional arguments, an object
/// becomes named arguments, any other bare value becomes a single positional argument, and a
/// missing `params` key means no arguments at all.
pub fn split_params(params: Option<&Value>) -> (Vec<Value>, Map<String, Value>) {
    match params {
        None => (Vec::new(), Map::new()),
        Some(Value::Array(items)) => (items.clone(), Map::new()),
        Some(Value::Object(named)) => (Vec::new(), named.clone()),
        Some(other) => (vec![other.clone()], Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_is_classified_as_request() {
        let m = request(ProtocolTag::Json, json!("id-1"), "swapper", CallParams::Bare(json!("hi")));
        assert!(is_request(&m));
        assert!(!is_notification(&m));
        assert_eq!(m.get("params"), Some(&json!("hi")));
    }

    #[test]
    fn notification_has_no_id_key() {
        let m = notification(ProtocolTag::Json, "ping", CallParams::None);
        assert!(is_notification(&m));
        assert!(!m.contains_key("id"));
    }

    #[test]
    fn positional_params_become_array() {
        let m = request(
            ProtocolTag::Json,
            json!(1),
            "add",
            CallParams::Positional(vec![json!(1), json!(2)]),
        );
        assert_eq!(m.get("params"), Some(&json!([1, 2])));
    }

    #[test]
    fn error_response_with_null_id_is_still_error_response() {
        let m = response_error(ProtocolTag::Json, Value::Null, JsonRpcError::parse_error("bad"));
        assert!(is_error_response(&m));
        assert!(!is_response(&m));
    }
}

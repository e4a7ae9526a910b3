//! Error handling for the RPC endpoint.
//!
//! The taxonomy mirrors the two layers a wire message passes through: a
//! [`Framing`](crate::framing::Framing) / [`Codec`](crate::codec::Codec) layer that can fail on
//! malformed bytes, and a protocol layer that can fail on well-formed-but-invalid JSON-RPC /
//! BSON-RPC semantics. Framing errors are always fatal to the underlying stream; codec errors on
//! an otherwise healthy stream are recoverable and reported back to the peer as a schema error.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// JSON-RPC / BSON-RPC reserved error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Server-defined error, must fall in `-32099..=-32000`.
    ServerError(i32),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
            JsonRpcErrorCode::ServerError(code) => *code,
        }
    }

    pub fn is_valid_server_error(code: i32) -> bool {
        (-32099..=-32000).contains(&code)
    }

    pub fn server_error(code: i32) -> Result<Self> {
        if Self::is_valid_server_error(code) {
            Ok(JsonRpcErrorCode::ServerError(code))
        } else {
            Err(Error::Internal(format!(
                "server error code {code} outside reserved range -32099..=-32000"
            )))
        }
    }
}

/// Error object as it appears on the wire, inside a response or a raised handler exception.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: impl std::fmt::Display) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message)
    }

    pub fn server_error(code: i32, message: impl Into<String>) -> Result<Self> {
        Ok(Self::new(JsonRpcErrorCode::server_error(code)?, message))
    }
}

/// Fatal framing-layer failure. Once raised the underlying stream is unrecoverable and the
/// socket queue closes.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("start marker missing from frame")]
    MissingStartMarker,
    #[error("end marker missing from frame")]
    MissingEndMarker,
    #[error("invalid frame length prefix: {0}")]
    InvalidLength(String),
    #[error("frame of {actual} bytes exceeds maximum of {max} bytes")]
    TooLarge { actual: usize, max: usize },
    #[error("{0}")]
    Malformed(String),
}

/// Recoverable codec-layer failure: the frame boundary was found but the payload inside did not
/// decode to a structured message, or a value could not be serialized onto the wire.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode message body: {0}")]
    Decoding(String),
    #[error("failed to encode message body: {0}")]
    Encoding(String),
}

/// Top level crate error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer returned an error: {0:?}")]
    Remote(JsonRpcError),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint is closed")]
    Closed,

    #[error("{method} is not a registered peer operation")]
    UnknownPeerOperation { method: String },

    #[error("handler panicked: {0}")]
    HandlerPanic(String),
}

impl Error {
    /// Render this error as the JSON-RPC error object that should be sent back to the peer,
    /// when it arose while handling an incoming request.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Error::Framing(e) => JsonRpcError::parse_error(e.to_string()),
            Error::Codec(CodecError::Decoding(m)) => JsonRpcError::parse_error(m.clone()),
            Error::Codec(CodecError::Encoding(m)) => JsonRpcError::internal_error(m.clone()),
            Error::MethodNotFound(m) => JsonRpcError::method_not_found(m),
            Error::InvalidParams { reason, .. } => JsonRpcError::invalid_params(reason.clone()),
            Error::Remote(e) => e.clone(),
            Error::HandlerPanic(m) => JsonRpcError::internal_error(m.clone()),
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

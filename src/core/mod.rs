//! Fundamental types shared across the framing, codec, tasking and dispatch layers.

pub mod error;
pub mod message;
pub mod options;

pub mod prelude {
    pub use super::error::{CodecError, Error, FramingError, JsonRpcError, JsonRpcErrorCode, Result};
    pub use super::message::{
        is_error_response, is_malformed, is_notification, is_request, is_response, CallParams,
        MessageId, ProtocolTag, WireMessage,
    };
    pub use super::options::{EndpointOptions, IdGenerator, TaskQuotas, ThreadingModel};
}

//! A symmetric JSON-RPC 2.0 / BSON-RPC 2.0 endpoint library over any duplex byte stream.
//!
//! Either side of a connection can act as a request sender, a request recipient, or both at
//! once — there is no separate "client" and "server" type. An [`RpcEndpoint`] is built directly
//! on top of anything implementing [`tokio::io::AsyncRead`] + [`tokio::io::AsyncWrite`] (a TCP
//! socket, a Unix socket, an in-memory duplex pipe for tests, ...), wires up the chosen framing
//! and codec, and starts dispatching incoming messages immediately.
//!
//! ## Quick start
//!
//! ```no_run
//! use bsonrpc::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(stream: tokio::net::TcpStream) -> Result<()> {
//! let service = Arc::new(Service::new());
//! let endpoint = RpcEndpoint::json_rfc7464(stream, EndpointOptions::default(), service);
//! let result = endpoint.invoke_request("ping", CallParams::None).await?;
//! endpoint.close();
//! endpoint.join(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`framing`] — byte-level message boundary strategies (RFC 7464, Netstring, frameless).
//! - [`codec`] — pairs a framing strategy with JSON or BSON payload (de)serialization.
//! - [`socket_queue`] — background reader/writer workers sitting directly on the stream.
//! - [`tasking`] — the threads-vs-cooperative scheduling abstraction everything above spawns on.
//! - [`service`] — handler registration with explicit, declared parameter shapes.
//! - [`dispatch`] — routes decoded messages to handlers and correlates responses.
//! - [`endpoint`] — the public connection object tying all of the above together.
//! - [`peer_proxy`] — a permission-checked handle for calling back into the peer.

pub mod codec;
pub mod core;
pub mod dispatch;
pub mod endpoint;
mod endpoint_core;
pub mod framing;
pub mod peer_proxy;
pub mod service;
pub mod socket_queue;
pub mod tasking;

/// JSON-RPC / BSON-RPC protocol version this crate implements.
pub const PROTOCOL_VERSION: &str = "2.0";

pub mod prelude {
    //! Convenient re-exports of the types most call sites need.

    pub use crate::core::prelude::*;
    pub use crate::dispatch::HandlerContext;
    pub use crate::endpoint::RpcEndpoint;
    pub use crate::endpoint_core::BatchItem;
    pub use crate::peer_proxy::PeerProxy;
    pub use crate::service::{
        HandlerResult, NotificationHandler, ParamSpec, RequestHandler, Service, ServiceRegistry,
    };
    pub use crate::PROTOCOL_VERSION;
}

#[cfg(test)]
mod tests {
    #[test]
    fn protocol_version_is_2_0() {
        assert_eq!(super::PROTOCOL_VERSION, "2.0");
    }
}

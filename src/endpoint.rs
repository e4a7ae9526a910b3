//! The public surface of a connection: `invoke_request`/`invoke_notification`/`batch_call` to
//! talk to the peer, plus `close`/`join` lifecycle control and `get_peer_proxy` for a
//! restricted, method-name-checked handle to the peer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
#[cfg(feature = "bson")]
use crate::codec::BsonCodec;
use crate::codec::JsonCodec;
use crate::core::error::Result;
use crate::core::message::{CallParams, ProtocolTag};
use crate::core::options::EndpointOptions;
use crate::dispatch::Dispatcher;
use crate::endpoint_core::{BatchItem, EndpointCore, RemoteResult};
use crate::framing::{FramelessFraming, NetstringFraming, Rfc7464Framing};
use crate::peer_proxy::PeerProxy;
use crate::service::Service;
use crate::socket_queue::SocketQueue;
use crate::tasking::Tasking;

/// A running JSON-RPC 2.0 / BSON-RPC 2.0 connection over one duplex byte stream.
///
/// The endpoint owns the stream (via its socket queue), the dispatcher, and the correlation
/// tables; dropping it does not by itself stop the background workers — call [`Self::close`]
/// and [`Self::join`] for an orderly shutdown.
pub struct RpcEndpoint {
    core: Arc<EndpointCore>,
}

impl RpcEndpoint {
    /// Builds an endpoint from an already-assembled codec. Prefer the `json_*`/`bson`
    /// constructors unless you need a custom framing strategy.
    pub fn new<S>(stream: S, codec: Arc<dyn Codec>, options: EndpointOptions, service: Arc<Service>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let tasking = Tasking::new(options.threading_model, options.quotas.clone());
        let socket_queue = Arc::new(SocketQueue::spawn(reader, writer, codec.clone(), &tasking));
        let core = EndpointCore::new(socket_queue, tasking, codec.protocol_tag(), options.id_generator);
        let dispatcher = Dispatcher::new(core.clone(), service);
        dispatcher.spawn_run_loop();
        Self { core }
    }

    pub fn json_rfc7464<S>(stream: S, options: EndpointOptions, service: Arc<Service>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(stream, Arc::new(JsonCodec::new(Rfc7464Framing)), options, service)
    }

    pub fn json_netstring<S>(stream: S, options: EndpointOptions, service: Arc<Service>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(stream, Arc::new(JsonCodec::new(NetstringFraming)), options, service)
    }

    pub fn json_frameless<S>(stream: S, options: EndpointOptions, service: Arc<Service>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(stream, Arc::new(JsonCodec::new(FramelessFraming)), options, service)
    }

    #[cfg(feature = "bson")]
    pub fn bson<S>(stream: S, options: EndpointOptions, service: Arc<Service>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let max = options.max_frame_bytes;
        Self::new(stream, Arc::new(BsonCodec::new(max)), options, service)
    }

    pub async fn invoke_request(&self, method: &str, params: CallParams) -> Result<Value> {
        self.core.invoke_request(method, params, None).await
    }

    pub async fn invoke_request_with_timeout(
        &self,
        method: &str,
        params: CallParams,
        timeout: Duration,
    ) -> Result<Value> {
        self.core.invoke_request(method, params, Some(timeout)).await
    }

    pub fn invoke_notification(&self, method: &str, params: CallParams) -> Result<()> {
        self.core.invoke_notification(method, params)
    }

    pub async fn batch_call(&self, items: Vec<BatchItem>) -> Result<Vec<RemoteResult>> {
        self.core.batch_call(items, None).await
    }

    pub async fn batch_call_with_timeout(
        &self,
        items: Vec<BatchItem>,
        timeout: Duration,
    ) -> Result<Vec<RemoteResult>> {
        self.core.batch_call(items, Some(timeout)).await
    }

    /// A handle restricted to calling only the named peer methods, for handing to code that
    /// should not be able to invoke arbitrary methods on the peer.
    pub fn get_peer_proxy(
        &self,
        requests: impl IntoIterator<Item = String>,
        notifications: impl IntoIterator<Item = String>,
    ) -> PeerProxy {
        PeerProxy::new(self.core.clone(), requests, notifications)
    }

    /// Closes the underlying socket queue. Idempotent; in-flight handlers finish on their own.
    pub fn close(&self) {
        self.core.socket_queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.socket_queue.is_closed()
    }

    /// Waits for the dispatcher's read loop and every handler/batch task it spawned to finish,
    /// or for `timeout` to elapse.
    pub async fn join(&self, timeout: Option<Duration>) -> Result<()> {
        self.core.tasking.join(timeout).await
    }
}

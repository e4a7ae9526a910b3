//! State shared between the public [`RpcEndpoint`](crate::endpoint::RpcEndpoint) surface and the
//! handler-context capability object handed to every request/notification handler: the socket
//! queue, the correlation tables that match outgoing calls to their eventual responses, and the
//! id generator. Keeping this in one place lets a handler call back into its own peer with
//! exactly the same machinery `invoke_request`/`invoke_notification` use at the top level.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::error::{Error, JsonRpcError, Result};
use crate::core::message::{notification, request, CallParams, MessageId, ProtocolTag, WireMessage};
use crate::core::options::IdGenerator;
use crate::socket_queue::SocketQueue;
use crate::tasking::{Promise, Tasking};

pub type RemoteResult = std::result::Result<Value, JsonRpcError>;

/// One call in an outgoing batch: either a request expecting a correlated response slot, or a
/// fire-and-forget notification.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Request { method: String, params: CallParams },
    Notification { method: String, params: CallParams },
}

fn id_key(id: &MessageId) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct BatchState {
    order: Vec<String>,
    results: HashMap<String, RemoteResult>,
    promise: Arc<Promise<Vec<RemoteResult>>>,
}

pub struct EndpointCore {
    pub socket_queue: Arc<SocketQueue>,
    pub tasking: Tasking,
    pub protocol_tag: ProtocolTag,
    pub id_generator: IdGenerator,
    single_correlation: DashMap<String, Arc<Promise<RemoteResult>>>,
    batch_correlation: DashMap<String, Arc<Mutex<BatchState>>>,
}

impl EndpointCore {
    pub fn new(
        socket_queue: Arc<SocketQueue>,
        tasking: Tasking,
        protocol_tag: ProtocolTag,
        id_generator: IdGenerator,
    ) -> Arc<Self> {
        Arc::new(Self {
            socket_queue,
            tasking,
            protocol_tag,
            id_generator,
            single_correlation: DashMap::new(),
            batch_correlation: DashMap::new(),
        })
    }

    pub async fn invoke_request(
        &self,
        method: &str,
        params: CallParams,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = (self.id_generator)();
        let key = id_key(&id);
        let promise = Arc::new(Promise::new());
        self.single_correlation.insert(key.clone(), promise.clone());

        let envelope = request(self.protocol_tag, id, method, params);
        if let Err(e) = self.socket_queue.put(WireMessage::Single(envelope)) {
            self.single_correlation.remove(&key);
            return Err(e);
        }

        let outcome = promise.wait(timeout).await;
        self.single_correlation.remove(&key);
        match outcome? {
            Ok(v) => Ok(v),
            Err(e) => Err(Error::Remote(e)),
        }
    }

    pub fn invoke_notification(&self, method: &str, params: CallParams) -> Result<()> {
        let envelope = notification(self.protocol_tag, method, params);
        self.socket_queue.put(WireMessage::Single(envelope))
    }

    pub async fn batch_call(
        &self,
        items: Vec<BatchItem>,
        timeout: Option<Duration>,
    ) -> Result<Vec<RemoteResult>> {
        let mut envelopes = Vec::with_capacity(items.len());
        let mut ids = Vec::new();
        for item in items {
            match item {
                BatchItem::Request { method, params } => {
                    let id = (self.id_generator)();
                    ids.push(id.clone());
                    envelopes.push(request(self.protocol_tag, id, &method, params));
                }
                BatchItem::Notification { method, params } => {
                    envelopes.push(notification(self.protocol_tag, &method, params));
                }
            }
        }

        if ids.is_empty() {
            self.socket_queue.put(WireMessage::Batch(envelopes))?;
            return Ok(Vec::new());
        }

        let order: Vec<String> = ids.iter().map(id_key).collect();
        let promise = Arc::new(Promise::new());
        let state = Arc::new(Mutex::new(BatchState {
            order: order.clone(),
            results: HashMap::new(),
            promise: promise.clone(),
        }));
        for key in &order {
            self.batch_correlation.insert(key.clone(), state.clone());
        }

        if let Err(e) = self.socket_queue.put(WireMessage::Batch(envelopes)) {
            for key in &order {
                self.batch_correlation.remove(key);
            }
            return Err(e);
        }

        promise.wait(timeout).await
    }

    /// Resolves a pending single-call promise keyed by `id`. Returns `false` if no such call is
    /// outstanding (a late or duplicate response).
    pub(crate) fn resolve_single(&self, id: &MessageId, result: RemoteResult) -> bool {
        let key = id_key(id);
        match self.single_correlation.remove(&key) {
            Some((_, promise)) => {
                promise.set(result);
                true
            }
            None => false,
        }
    }

    /// Resolves one member of a pending batch call. Once every id in that batch has reported,
    /// the batch promise fires with results ordered exactly as the calls were originally sent.
    pub(crate) fn resolve_batch_member(&self, id: &MessageId, result: RemoteResult) -> bool {
        let key = id_key(id);
        let Some(state_arc) = self.batch_correlation.get(&key).map(|e| e.clone()) else {
            return false;
        };

        let completed = {
            let mut state = state_arc.lock();
            state.results.insert(key.clone(), result);
            state.results.len() == state.order.len()
        };

        if completed {
            let (order, promise) = {
                let state = state_arc.lock();
                (state.order.clone(), state.promise.clone())
            };
            for k in &order {
                self.batch_correlation.remove(k);
            }
            let ordered = {
                let mut state = state_arc.lock();
                order
                    .iter()
                    .map(|k| state.results.remove(k).expect("every id was just inserted"))
                    .collect()
            };
            promise.set(ordered);
        }
        true
    }

    /// Releases every call still waiting for a response with [`Error::Closed`], run when the
    /// dispatcher's read loop ends because the underlying stream closed.
    pub(crate) fn fail_all_pending(&self) {
        for entry in self.single_correlation.iter() {
            entry
                .value()
                .set(Err(JsonRpcError::internal_error("connection closed")));
        }
        self.single_correlation.clear();

        let mut seen = std::collections::HashSet::new();
        for entry in self.batch_correlation.iter() {
            let state_arc = entry.value().clone();
            let ptr = Arc::as_ptr(&state_arc) as usize;
            if !seen.insert(ptr) {
                continue;
            }
            let (order, promise, partial) = {
                let state = state_arc.lock();
                (state.order.clone(), state.promise.clone(), state.results.clone())
            };
            let filled = order
                .iter()
                .map(|k| {
                    partial
                        .get(k)
                        .cloned()
                        .unwrap_or_else(|| Err(JsonRpcError::internal_error("connection closed")))
                })
                .collect();
            promise.set(filled);
        }
        self.batch_correlation.clear();
    }
}

/// The capability object handed to a request or notification handler while it is running.
/// Deliberately does not expose `close`/`join`: those remain operations on the endpoint itself,
/// not on the connection a handler is embedded in.
#[derive(Clone)]
pub struct HandlerContext {
    core: Arc<EndpointCore>,
    aborted: Arc<AtomicBool>,
    close_after_response: Arc<AtomicBool>,
}

impl HandlerContext {
    pub(crate) fn new(core: Arc<EndpointCore>) -> Self {
        Self {
            core,
            aborted: Arc::new(AtomicBool::new(false)),
            close_after_response: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn invoke_request(&self, method: &str, params: CallParams) -> Result<Value> {
        self.core.invoke_request(method, params, None).await
    }

    pub fn invoke_notification(&self, method: &str, params: CallParams) -> Result<()> {
        self.core.invoke_notification(method, params)
    }

    /// A handle restricted to calling only the named peer methods, for handing further into
    /// code the handler itself calls out to. Mirrors
    /// [`RpcEndpoint::get_peer_proxy`](crate::endpoint::RpcEndpoint::get_peer_proxy).
    pub fn get_peer_proxy(
        &self,
        requests: impl IntoIterator<Item = String>,
        notifications: impl IntoIterator<Item = String>,
    ) -> crate::peer_proxy::PeerProxy {
        crate::peer_proxy::PeerProxy::new(self.core.clone(), requests, notifications)
    }

    /// Aborts the connection immediately: the socket queue is closed and no response is sent
    /// for the request currently being handled.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.core.socket_queue.close();
    }

    /// Marks that the connection should be closed once the in-flight response has been sent,
    /// rather than immediately.
    pub fn close_after_response(&self) {
        self.close_after_response.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn should_close_after_response(&self) -> bool {
        self.close_after_response.load(Ordering::SeqCst)
    }
}

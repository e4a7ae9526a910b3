//! Routes decoded inbound messages to the right place: correlates responses to outstanding
//! calls, resolves an incoming request's method against a [`ServiceRegistry`], and reassembles
//! batch responses.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::error::JsonRpcError;
use crate::core::message::{
    extract_id, is_error_response, is_notification, is_request, is_response, response_error,
    response_ok, split_params, MessageId, WireMessage,
};
use crate::endpoint_core::EndpointCore;
use crate::service::ServiceRegistry;
use crate::socket_queue::InboundEvent;
use crate::tasking::{GROUP_BATCHES, GROUP_HANDLERS};

pub use crate::endpoint_core::HandlerContext;

/// Best-effort extraction of a human-readable message from a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn parse_remote_error(v: Option<&Value>) -> JsonRpcError {
    v.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| JsonRpcError::internal_error("malformed error object from peer"))
}

pub struct Dispatcher {
    core: Arc<EndpointCore>,
    registry: Arc<dyn ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(core: Arc<EndpointCore>, registry: Arc<dyn ServiceRegistry>) -> Arc<Self> {
        Arc::new(Self { core, registry })
    }

    /// Spawns the dispatcher's read loop under the `dispatcher` quota group. Returns
    /// immediately; use [`crate::endpoint::RpcEndpoint::join`] to wait for it to end.
    pub fn spawn_run_loop(self: &Arc<Self>) {
        let this = self.clone();
        let tasking = self.core.tasking.clone();
        tasking.spawn(crate::tasking::GROUP_DISPATCHER, async move {
            this.run().await;
        });
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.core.socket_queue.get().await {
                Some(InboundEvent::Message(WireMessage::Single(m))) => {
                    self.clone().handle_single(m).await;
                }
                Some(InboundEvent::Message(WireMessage::Batch(items))) => {
                    let this = self.clone();
                    self.core.tasking.spawn(GROUP_BATCHES, async move {
                        this.handle_batch(items).await;
                    });
                }
                Some(InboundEvent::Recoverable(e)) => {
                    self.handle_schema_error(e.to_string());
                }
                None => break,
            }
        }
        self.core.fail_all_pending();
    }

    fn handle_schema_error(&self, message: String) {
        tracing::warn!(error = %message, "dropping message that failed to decode");
        let envelope = response_error(
            self.core.protocol_tag,
            Value::Null,
            JsonRpcError::parse_error(message),
        );
        let _ = self.core.socket_queue.put(WireMessage::Single(envelope));
    }

    async fn handle_single(self: Arc<Self>, m: Map<String, Value>) {
        if is_response(&m) {
            let id = extract_id(&m).unwrap_or(Value::Null);
            let result = Ok(m.get("result").cloned().unwrap_or(Value::Null));
            self.resolve(&id, result);
        } else if is_error_response(&m) {
            let id = extract_id(&m).unwrap_or(Value::Null);
            let error = parse_remote_error(m.get("error"));
            if !id.is_null() {
                self.resolve(&id, Err(error));
            } else {
                tracing::warn!(?error, "peer reported a schema error with no correlating id");
            }
        } else if is_request(&m) {
            let this = self.clone();
            self.core.tasking.spawn(GROUP_HANDLERS, async move {
                this.execute_request(m).await;
            });
        } else if is_notification(&m) {
            let this = self.clone();
            self.core.tasking.spawn(GROUP_HANDLERS, async move {
                this.execute_notification(m).await;
            });
        } else {
            let id = extract_id(&m).unwrap_or(Value::Null);
            self.send_error(id, JsonRpcError::invalid_request("not a request, notification, or response"));
        }
    }

    fn resolve(&self, id: &MessageId, result: Result<Value, JsonRpcError>) {
        if self.core.resolve_batch_member(id, result.clone()) {
            return;
        }
        if !self.core.resolve_single(id, result) {
            tracing::warn!(?id, "received a response for an id that is not outstanding");
        }
    }

    fn send_error(&self, id: MessageId, error: JsonRpcError) {
        let envelope = response_error(self.core.protocol_tag, id, error);
        let _ = self.core.socket_queue.put(WireMessage::Single(envelope));
    }

    async fn execute_request(self: Arc<Self>, m: Map<String, Value>) {
        let id = extract_id(&m).unwrap_or(Value::Null);
        let method = m.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
        let (positional, named) = split_params(m.get("params"));
        let ctx = HandlerContext::new(self.core.clone());

        let result = self.call_request_handler(&method, ctx.clone(), positional, named).await;

        if ctx.is_aborted() {
            return;
        }
        let envelope = match result {
            Ok(v) => response_ok(self.core.protocol_tag, id, v),
            Err(e) => response_error(self.core.protocol_tag, id, e),
        };
        let _ = self.core.socket_queue.put(WireMessage::Single(envelope));
        if ctx.should_close_after_response() {
            self.core.socket_queue.close();
        }
    }

    async fn execute_notification(self: Arc<Self>, m: Map<String, Value>) {
        let method = m.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
        let (positional, named) = split_params(m.get("params"));
        let ctx = HandlerContext::new(self.core.clone());
        self.call_notification_handler(&method, ctx, positional, named).await;
    }

    async fn call_request_handler(
        &self,
        method: &str,
        ctx: HandlerContext,
        positional: Vec<Value>,
        named: Map<String, Value>,
    ) -> Result<Value, JsonRpcError> {
        let Some(handler) = self.registry.request_handler(method) else {
            return Err(JsonRpcError::method_not_found(method));
        };
        if !handler.param_spec().is_compatible(positional.len(), &named) {
            return Err(JsonRpcError::invalid_params(format!(
                "arguments incompatible with {method}"
            )));
        }
        match futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(
            handler.call(ctx, positional, named),
        ))
        .await
        {
            Ok(result) => result,
            Err(payload) => Err(JsonRpcError::internal_error(panic_message(&payload))),
        }
    }

    async fn call_notification_handler(
        &self,
        method: &str,
        ctx: HandlerContext,
        positional: Vec<Value>,
        named: Map<String, Value>,
    ) {
        let Some(handler) = self.registry.notification_handler(method) else {
            tracing::warn!(method, "no handler registered for notification");
            return;
        };
        if !handler.param_spec().is_compatible(positional.len(), &named) {
            tracing::warn!(method, "dropping notification with incompatible arguments");
            return;
        }
        if futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(
            handler.call(ctx, positional, named),
        ))
        .await
        .is_err()
        {
            tracing::warn!(method, "handler for notification panicked");
        }
    }

    async fn handle_batch(self: Arc<Self>, items: Vec<Map<String, Value>>) {
        if items.iter().any(|m| is_response(m) || is_error_response(m)) {
            for m in items {
                self.clone().handle_single(m).await;
            }
            return;
        }

        if items.is_empty() {
            self.send_error(Value::Null, JsonRpcError::invalid_request("empty batch"));
            return;
        }

        // One handler-context shared by every element in the batch: abort/close-after-response
        // flags set by any element apply to the batch as a whole, honored only once the whole
        // response has been assembled and sent below.
        let ctx = HandlerContext::new(self.core.clone());
        let total = items.len();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, Map<String, Value>)>();
        for (index, m) in items.into_iter().enumerate() {
            let this = self.clone();
            let tx = tx.clone();
            let ctx = ctx.clone();
            self.core.tasking.spawn(GROUP_BATCHES, async move {
                if let Some(envelope) = this.process_batch_element(m, ctx).await {
                    let _ = tx.send((index, envelope));
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Map<String, Value>>> = (0..total).map(|_| None).collect();
        while let Some((index, envelope)) = rx.recv().await {
            slots[index] = Some(envelope);
        }

        if ctx.is_aborted() {
            return;
        }
        let responses: Vec<Map<String, Value>> = slots.into_iter().flatten().collect();
        if !responses.is_empty() {
            let _ = self.core.socket_queue.put(WireMessage::Batch(responses));
        }
        if ctx.should_close_after_response() {
            self.core.socket_queue.close();
        }
    }

    async fn process_batch_element(
        self: Arc<Self>,
        m: Map<String, Value>,
        ctx: HandlerContext,
    ) -> Option<Map<String, Value>> {
        if is_request(&m) {
            let id = extract_id(&m).unwrap_or(Value::Null);
            let method = m.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
            let (positional, named) = split_params(m.get("params"));
            let result = self.call_request_handler(&method, ctx.clone(), positional, named).await;
            if ctx.is_aborted() {
                return None;
            }
            Some(match result {
                Ok(v) => response_ok(self.core.protocol_tag, id, v),
                Err(e) => response_error(self.core.protocol_tag, id, e),
            })
        } else if is_notification(&m) {
            let method = m.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
            let (positional, named) = split_params(m.get("params"));
            self.call_notification_handler(&method, ctx, positional, named).await;
            None
        } else {
            let id = extract_id(&m).unwrap_or(Value::Null);
            Some(response_error(
                self.core.protocol_tag,
                id,
                JsonRpcError::invalid_request("not a request, notification, or response"),
            ))
        }
    }
}

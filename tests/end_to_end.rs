//! Connection-level scenarios run over an in-memory duplex pipe, exercising the full
//! framing/codec/socket-queue/dispatcher/endpoint stack together rather than any one layer
//! in isolation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex as AsyncMutex;

use bsonrpc::core::error::Error;
use bsonrpc::prelude::*;

struct Swapper;

#[async_trait]
impl RequestHandler for Swapper {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["txt"]))
    }

    async fn call(&self, _ctx: HandlerContext, positional: Vec<Value>, _named: Map<String, Value>) -> HandlerResult {
        let txt = positional
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("txt must be a string"))?;
        Ok(json!(txt.chars().rev().collect::<String>()))
    }
}

struct Complicated {
    history: Arc<AsyncMutex<Vec<(String, Vec<Value>)>>>,
}

#[async_trait]
impl RequestHandler for Complicated {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["a", "b", "c"]))
    }

    async fn call(&self, ctx: HandlerContext, positional: Vec<Value>, _named: Map<String, Value>) -> HandlerResult {
        let [a, b, c]: [Value; 3] = positional.try_into().map_err(|_| {
            JsonRpcError::invalid_params("complicated takes exactly three positional arguments")
        })?;

        ctx.invoke_notification(
            "report_back",
            CallParams::Positional(vec![json!("Hello"), json!("There")]),
        )
        .ok();

        let proxy = ctx.get_peer_proxy(vec![], vec!["report_back".to_string()]);
        proxy
            .notify(
                "report_back",
                CallParams::Positional(vec![json!("Other Way"), json!(123)]),
            )
            .ok();

        self.history.lock().await.push(("complicated".to_string(), vec![a.clone(), b.clone(), c.clone()]));

        Ok(json!(format!(
            "a: {} b: {} c: {}",
            a.as_str().unwrap_or_default(),
            b.as_str().unwrap_or_default(),
            c.as_str().unwrap_or_default()
        )))
    }
}

struct ServerDisconnect;

#[async_trait]
impl RequestHandler for ServerDisconnect {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["x", "y"]))
    }

    async fn call(&self, ctx: HandlerContext, positional: Vec<Value>, _named: Map<String, Value>) -> HandlerResult {
        let x = positional[0].as_i64().unwrap_or_default();
        let y = positional[1].as_i64().unwrap_or_default();
        ctx.close_after_response();
        Ok(json!(x * y))
    }
}

struct Yaman {
    received: Arc<AsyncMutex<Vec<Value>>>,
}

#[async_trait]
impl NotificationHandler for Yaman {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["note"]))
    }

    async fn call(&self, _ctx: HandlerContext, positional: Vec<Value>, _named: Map<String, Value>) {
        self.received.lock().await.extend(positional);
    }
}

struct ReportBack {
    received: Arc<AsyncMutex<Vec<Vec<Value>>>>,
}

#[async_trait]
impl NotificationHandler for ReportBack {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["a"]).with_optional(["opt"]))
    }

    async fn call(&self, _ctx: HandlerContext, positional: Vec<Value>, _named: Map<String, Value>) {
        self.received.lock().await.push(positional);
    }
}

struct Panicker;

#[async_trait]
impl RequestHandler for Panicker {
    fn param_spec(&self) -> &ParamSpec {
        static SPEC: std::sync::OnceLock<ParamSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ParamSpec::new(["msg"]))
    }

    async fn call(&self, _ctx: HandlerContext, _positional: Vec<Value>, _named: Map<String, Value>) -> HandlerResult {
        panic!("Proud Mary!");
    }
}

fn server_service(history: Arc<AsyncMutex<Vec<(String, Vec<Value>)>>>, received: Arc<AsyncMutex<Vec<Value>>>) -> Arc<Service> {
    Arc::new(
        Service::new()
            .request("swapper", Arc::new(Swapper))
            .request("complicated", Arc::new(Complicated { history }))
            .request("server_disconnect", Arc::new(ServerDisconnect))
            .request("panicker", Arc::new(Panicker))
            .notification("yaman", Arc::new(Yaman { received })),
    )
}

async fn wait_until(predicate: impl Fn() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn simple_request_round_trips() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let result = client_ep
        .invoke_request("swapper", CallParams::Bare(json!("Hello There!")))
        .await
        .unwrap();
    assert_eq!(result, json!("!erehT olleH"));

    server_ep.close();
    client_ep.close();
}

#[tokio::test]
async fn cross_directional_notifications_reach_both_sides() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history.clone(), received));

    let client_received = Arc::new(AsyncMutex::new(Vec::new()));
    let client_service = Arc::new(
        Service::new().notification(
            "report_back",
            Arc::new(ReportBack {
                received: client_received.clone(),
            }),
        ),
    );
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), client_service);

    let result = client_ep
        .invoke_request(
            "complicated",
            CallParams::Positional(vec![json!("First"), json!("Second"), json!("Third")]),
        )
        .await
        .unwrap();
    assert_eq!(result, json!("a: First b: Second c: Third"));

    wait_until(|| client_received.try_lock().map(|g| g.len() >= 2).unwrap_or(false)).await;
    let got = client_received.lock().await;
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], vec![json!("Hello"), json!("There")]);
    assert_eq!(got[1], vec![json!("Other Way"), json!(123)]);
    assert_eq!(
        *history.lock().await,
        vec![("complicated".to_string(), vec![json!("First"), json!("Second"), json!("Third")])]
    );

    server_ep.close();
    client_ep.close();
}

#[tokio::test]
async fn handler_initiated_close_after_response_takes_effect() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let result = client_ep
        .invoke_request("server_disconnect", CallParams::Positional(vec![json!(12), json!(34)]))
        .await
        .unwrap();
    assert_eq!(result, json!(408));

    wait_until(|| server_ep.is_closed()).await;
    assert!(server_ep.is_closed());
}

#[tokio::test]
async fn mixed_batch_preserves_request_order() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received.clone()));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let results = client_ep
        .batch_call(vec![
            BatchItem::Notification {
                method: "yaman".to_string(),
                params: CallParams::Bare(json!("note")),
            },
            BatchItem::Request {
                method: "swapper".to_string(),
                params: CallParams::Bare(json!("firstie")),
            },
            BatchItem::Request {
                method: "complicated".to_string(),
                params: CallParams::Positional(vec![json!("q!"), json!("w!"), json!("e!")]),
            },
            BatchItem::Notification {
                method: "yaman".to_string(),
                params: CallParams::Bare(json!("again")),
            },
            BatchItem::Request {
                method: "swapper".to_string(),
                params: CallParams::Bare(json!("thirstie")),
            },
        ])
        .await
        .unwrap();

    assert_eq!(results, vec![
        Ok(json!("eitsrif")),
        Ok(json!("a: q! b: w! c: e!")),
        Ok(json!("eitsriht")),
    ]);

    wait_until(|| received.try_lock().map(|g| g.len() == 2).unwrap_or(false)).await;
    assert_eq!(*received.lock().await, vec![json!("note"), json!("again")]);

    server_ep.close();
    client_ep.close();
}

#[tokio::test]
async fn notification_only_batch_yields_no_results() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let results = client_ep
        .batch_call(vec![
            BatchItem::Notification {
                method: "yaman".to_string(),
                params: CallParams::Bare(json!("one")),
            },
            BatchItem::Notification {
                method: "yaman".to_string(),
                params: CallParams::Bare(json!("two")),
            },
        ])
        .await
        .unwrap();

    assert!(results.is_empty());
    server_ep.close();
    client_ep.close();
}

#[tokio::test]
async fn batch_with_invalid_params_mixes_results_and_errors() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let results = client_ep
        .batch_call(vec![
            BatchItem::Request {
                method: "server_disconnect".to_string(),
                params: CallParams::Positional(vec![json!(3), json!(4)]),
            },
            BatchItem::Request {
                method: "swapper".to_string(),
                params: CallParams::Positional(vec![json!("gaga"), json!("trolo")]),
            },
            BatchItem::Request {
                method: "swapper".to_string(),
                params: CallParams::None,
            },
            BatchItem::Request {
                method: "swapper".to_string(),
                params: CallParams::Bare(json!("SomethinG")),
            },
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0], Ok(json!(12)));
    assert!(matches!(&results[1], Err(e) if e.code == JsonRpcErrorCode::InvalidParams.code()));
    assert!(matches!(&results[2], Err(e) if e.code == JsonRpcErrorCode::InvalidParams.code()));
    assert_eq!(results[3], Ok(json!("GnihtemoS")));

    wait_until(|| server_ep.is_closed()).await;
    assert!(server_ep.is_closed());
}

#[tokio::test]
async fn handler_panic_surfaces_as_server_error() {
    let (client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));
    let client_ep = RpcEndpoint::json_rfc7464(client, EndpointOptions::default(), Arc::new(Service::new()));

    let err = client_ep
        .invoke_request("panicker", CallParams::Bare(json!("Tina Turner")))
        .await
        .unwrap_err();
    match err {
        Error::Remote(e) => assert_eq!(e.message, "Proud Mary!"),
        other => panic!("expected a remote error, got {other:?}"),
    }

    server_ep.close();
    client_ep.close();
}

#[tokio::test]
async fn garbage_input_closes_the_queue_with_a_framing_error() {
    let (mut client, server) = tokio::io::duplex(8192);
    let history = Arc::new(AsyncMutex::new(Vec::new()));
    let received = Arc::new(AsyncMutex::new(Vec::new()));
    let server_ep = RpcEndpoint::json_rfc7464(server, EndpointOptions::default(), server_service(history, received));

    use tokio::io::AsyncWriteExt;
    client.write_all(b"not a valid frame at all").await.unwrap();

    wait_until(|| server_ep.is_closed()).await;
    assert!(server_ep.is_closed());
}

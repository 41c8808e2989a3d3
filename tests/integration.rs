//! End-to-end tests against an in-process WebSocket server.
//!
//! Each test binds a localhost listener, accepts the client's connection
//! with `tokio_tungstenite::accept_async`, and speaks the raw envelope
//! protocol from the server side.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use websocket_request::{Client, Envelope, Error, RequestHandler, RequestType, Result};

// ============================================================================
// Harness
// ============================================================================

type ServerWs = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, format!("ws://127.0.0.1:{port}"))
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client did not connect")
        .expect("accept");
    accept_async(stream).await.expect("handshake")
}

async fn wait_connected(client: &Client) {
    for _ in 0..500 {
        if client.is_connected() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("client never connected");
}

async fn read_envelope(ws: &mut ServerWs) -> Envelope {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within timeout")
            .expect("stream ended")
            .expect("frame error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("parse envelope");
        }
    }
}

async fn send_envelope(ws: &mut ServerWs, envelope: &Envelope) {
    let json = serde_json::to_string(envelope).expect("serialize");
    ws.send(Message::Text(json.into())).await.expect("send");
}

/// Asserts that no text frame arrives within the window.
async fn assert_no_frame(ws: &mut ServerWs, window: Duration) {
    let result = timeout(window, ws.next()).await;
    match result {
        Err(_) => {}
        Ok(Some(Ok(Message::Text(text)))) => {
            panic!("unexpected frame: {}", text.as_str());
        }
        // Close or transport noise is fine; just no protocol frames.
        Ok(_) => {}
    }
}

// ============================================================================
// Message Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

impl RequestType for Add {
    const TYPE: &'static str = "math.add";
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sum {
    sum: i64,
}

impl RequestType for Sum {
    const TYPE: &'static str = "math.sum";
}

#[derive(Debug, Serialize, Deserialize)]
struct Notice {
    text: String,
}

impl RequestType for Notice {
    const TYPE: &'static str = "notice";
}

// ============================================================================
// Handlers
// ============================================================================

struct AddHandler;

#[async_trait]
impl RequestHandler for AddHandler {
    type Request = Add;

    async fn on_request_with_response(&self, request: Add) -> Result<Value> {
        Ok(json!({"sum": request.a + request.b}))
    }
}

struct NoticeRecorder {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

#[async_trait]
impl RequestHandler for NoticeRecorder {
    type Request = Notice;

    async fn on_request(&self, request: Notice) -> Result<()> {
        let _ = self.tx.send(request.text);
        Ok(())
    }
}

/// Forwards every notice back out through the same client.
struct RelayHandler {
    client: Client,
}

#[async_trait]
impl RequestHandler for RelayHandler {
    type Request = Notice;

    async fn on_request(&self, request: Notice) -> Result<()> {
        self.client
            .send_request(&Notice {
                text: format!("relay: {}", request.text),
            })
            .await
    }
}

struct FailingHandler;

#[async_trait]
impl RequestHandler for FailingHandler {
    type Request = Add;

    async fn on_request_with_response(&self, _request: Add) -> Result<Value> {
        Err(Error::handler("arithmetic unit on fire"))
    }
}

// ============================================================================
// Correlated Requests
// ============================================================================

#[tokio::test]
async fn correlated_request_resolves_with_response_decoder() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let pending = client
        .send_request_with_response::<Add, Sum>(&Add { a: 2, b: 3 })
        .await
        .expect("send");
    assert_eq!(client.pending_count(), 1);

    let envelope = read_envelope(&mut server).await;
    assert_eq!(envelope.type_tag, "math.add");
    assert_eq!(envelope.data, json!({"a": 2, "b": 3}));
    let reference = envelope.reference.expect("correlated request carries ref");

    send_envelope(&mut server, &Envelope::response(reference, json!({"sum": 5}))).await;

    let sum = pending.recv().await.expect("response");
    assert_eq!(sum, Sum { sum: 5 });
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn failure_response_carries_message_and_errno_verbatim() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let pending = client
        .send_request_with_response::<Add, Sum>(&Add { a: 1, b: 1 })
        .await
        .expect("send");

    let envelope = read_envelope(&mut server).await;
    let reference = envelope.reference.expect("ref");
    send_envelope(
        &mut server,
        &Envelope::failure(reference, "division by zero", 1001),
    )
    .await;

    let err = pending.recv().await.expect_err("failure response");
    match err {
        Error::Response { message, errno } => {
            assert_eq!(message, "division by zero");
            assert_eq!(errno, 1001);
        }
        other => panic!("expected response error, got {other}"),
    }
}

#[tokio::test]
async fn concurrent_requests_get_distinct_correlation_ids() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let pending = client
            .send_request_with_response::<Add, Sum>(&Add { a: i, b: i })
            .await
            .expect("send");
        handles.push(pending);
    }
    assert_eq!(client.pending_count(), 5);

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let envelope = read_envelope(&mut server).await;
        let reference = envelope.reference.expect("ref");
        assert!(seen.insert(reference), "correlation id reused");

        let a = envelope.data["a"].as_i64().expect("a");
        let b = envelope.data["b"].as_i64().expect("b");
        send_envelope(&mut server, &Envelope::response(reference, json!({"sum": a + b}))).await;
    }

    for (i, pending) in handles.into_iter().enumerate() {
        let sum = pending.recv().await.expect("response");
        assert_eq!(sum.sum, 2 * i as i64);
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn unroutable_response_is_discarded() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    // A response nobody asked for
    send_envelope(
        &mut server,
        &Envelope::response(websocket_request::RequestRef::generate(), json!({"sum": 0})),
    )
    .await;

    // The connection must still work afterwards
    let pending = client
        .send_request_with_response::<Add, Sum>(&Add { a: 4, b: 4 })
        .await
        .expect("send");
    let envelope = read_envelope(&mut server).await;
    let reference = envelope.reference.expect("ref");
    send_envelope(&mut server, &Envelope::response(reference, json!({"sum": 8}))).await;

    assert_eq!(pending.recv().await.expect("response").sum, 8);
}

// ============================================================================
// Fire-and-Forget
// ============================================================================

#[tokio::test]
async fn fire_and_forget_request_has_no_ref() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    client
        .send_request(&Notice { text: "hello".into() })
        .await
        .expect("send");

    let envelope = read_envelope(&mut server).await;
    assert_eq!(envelope.type_tag, "notice");
    assert_eq!(envelope.reference, None);
    assert_eq!(envelope.data, json!({"text": "hello"}));
    assert_eq!(client.pending_count(), 0);
}

// ============================================================================
// Inbound Dispatch
// ============================================================================

#[tokio::test]
async fn inbound_correlated_request_gets_response_frame() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.register_handler(AddHandler);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let reference = websocket_request::RequestRef::generate();
    send_envelope(
        &mut server,
        &Envelope::correlated("math.add", reference, json!({"a": 20, "b": 22})),
    )
    .await;

    let reply = read_envelope(&mut server).await;
    assert!(reply.is_response());
    assert!(reply.is_success());
    assert_eq!(reply.reference, Some(reference));
    assert_eq!(reply.data, json!({"sum": 42}));
}

#[tokio::test]
async fn inbound_notification_invokes_handler_without_reply() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let client = Client::new(&url);
    client.register_handler(NoticeRecorder { tx });
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    send_envelope(
        &mut server,
        &Envelope::request("notice", json!({"text": "heads up"})),
    )
    .await;

    let text = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("handler invoked")
        .expect("channel open");
    assert_eq!(text, "heads up");

    assert_no_frame(&mut server, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn handler_can_send_requests_on_the_same_client() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.register_handler(RelayHandler {
        client: client.clone(),
    });
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    send_envelope(
        &mut server,
        &Envelope::request("notice", json!({"text": "ping"})),
    )
    .await;

    // The follow-up request goes out while the inbound dispatch is running.
    let relayed = read_envelope(&mut server).await;
    assert_eq!(relayed.type_tag, "notice");
    assert_eq!(relayed.data, json!({"text": "relay: ping"}));

    // The engine must still answer commands afterwards.
    client.disconnect();
    let closed = timeout(Duration::from_secs(2), server.next()).await;
    assert!(closed.is_ok(), "connection never closed after disconnect");
}

#[tokio::test]
async fn unknown_type_invokes_hook_once_and_sends_nothing() {
    let (listener, url) = bind().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_hook = Arc::clone(&hits);

    let client = Client::builder(&url)
        .on_unknown_type(move |tag| {
            assert_eq!(tag, "mystery");
            hits_hook.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    send_envelope(&mut server, &Envelope::request("mystery", json!({}))).await;

    assert_no_frame(&mut server, Duration::from_millis(300)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_failure_invokes_hook_and_sends_no_response() {
    let (listener, url) = bind().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_hook = Arc::clone(&hits);

    let client = Client::builder(&url)
        .on_handler_error(move |tag, _err| {
            assert_eq!(tag, "math.add");
            hits_hook.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    client.register_handler(FailingHandler);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let reference = websocket_request::RequestRef::generate();
    send_envelope(
        &mut server,
        &Envelope::correlated("math.add", reference, json!({"a": 1, "b": 1})),
    )
    .await;

    assert_no_frame(&mut server, Duration::from_millis(300)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn undecodable_payload_routes_to_handler_error_hook() {
    let (listener, url) = bind().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_hook = Arc::clone(&hits);

    let client = Client::builder(&url)
        .on_handler_error(move |_tag, _err| {
            hits_hook.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    client.register_handler(AddHandler);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let reference = websocket_request::RequestRef::generate();
    send_envelope(
        &mut server,
        &Envelope::correlated("math.add", reference, json!("not an object")),
    )
    .await;

    assert_no_frame(&mut server, Duration::from_millis(300)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Lifecycle & Reconnection
// ============================================================================

#[tokio::test]
async fn explicit_disconnect_triggers_no_reconnect() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    client.disconnect();

    // Server observes the close; the client must not dial again.
    let _ = timeout(Duration::from_secs(2), server.next()).await;
    let reconnect = timeout(Duration::from_millis(1500), listener.accept()).await;
    assert!(reconnect.is_err(), "client reconnected after disconnect()");
}

#[tokio::test]
async fn drop_with_policy_false_stops_retrying() {
    let (listener, url) = bind().await;
    let client = Client::builder(&url).reconnect_policy(|| false).build();
    client.connect().expect("connect");
    let server = accept(&listener).await;
    wait_connected(&client).await;

    drop(server);

    let reconnect = timeout(Duration::from_millis(1800), listener.accept()).await;
    assert!(reconnect.is_err(), "client reconnected despite policy");
}

#[tokio::test]
async fn drop_with_policy_true_reconnects_after_one_second() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let server = accept(&listener).await;
    wait_connected(&client).await;

    let dropped_at = Instant::now();
    drop(server);

    let mut server = accept(&listener).await;
    let elapsed = dropped_at.elapsed();
    assert!(
        elapsed >= Duration::from_millis(900),
        "reconnected too early: {elapsed:?}"
    );
    wait_connected(&client).await;

    // The new connection is fully usable
    client
        .send_request(&Notice { text: "back".into() })
        .await
        .expect("send after reconnect");
    let envelope = read_envelope(&mut server).await;
    assert_eq!(envelope.type_tag, "notice");
}

#[tokio::test]
async fn pending_requests_fail_with_reset_on_drop() {
    let (listener, url) = bind().await;
    let client = Client::builder(&url).reconnect_policy(|| false).build();
    client.connect().expect("connect");
    let mut server = accept(&listener).await;
    wait_connected(&client).await;

    let pending = client
        .send_request_with_response::<Add, Sum>(&Add { a: 1, b: 2 })
        .await
        .expect("send");
    // Make sure the request left the client before dropping
    let _ = read_envelope(&mut server).await;

    drop(server);

    let err = timeout(Duration::from_secs(5), pending.recv())
        .await
        .expect("pending resolved")
        .expect_err("reset");
    assert!(matches!(err, Error::ConnectionReset));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn connect_error_hook_reports_backoff_delay() {
    let (listener, url) = bind().await;
    // Free the port so the connect attempt is refused
    drop(listener);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let client = Client::builder(&url)
        .on_connect_error(move |_err, delay| {
            let _ = tx.send(delay);
        })
        .build();
    client.connect().expect("connect issues asynchronously");

    let delay = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("hook invoked")
        .expect("channel open");
    assert_eq!(delay, Duration::from_secs(5));

    // Cancel the scheduled retry
    client.disconnect();
}

#[tokio::test]
async fn reconnect_via_connect_replaces_connection() {
    let (listener, url) = bind().await;
    let client = Client::new(&url);
    client.connect().expect("connect");
    let mut first = accept(&listener).await;
    wait_connected(&client).await;

    client.connect().expect("reconnect");

    // Old connection closes with a reason, new one dials in
    let mut second = accept(&listener).await;
    let closed = timeout(Duration::from_secs(2), first.next()).await;
    assert!(closed.is_ok(), "first connection never closed");

    wait_connected(&client).await;
    client
        .send_request(&Notice { text: "fresh".into() })
        .await
        .expect("send on new connection");
    let envelope = read_envelope(&mut second).await;
    assert_eq!(envelope.data, json!({"text": "fresh"}));
}

// ============================================================================
// Connector Decorator
// ============================================================================

#[tokio::test]
async fn connector_headers_reach_the_server() {
    let (listener, url) = bind().await;
    let client = Client::builder(&url)
        .connector(|mut request| {
            request
                .headers_mut()
                .insert("x-auth", "secret".parse().expect("header value"));
            Ok(request)
        })
        .build();
    client.connect().expect("connect");

    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client connected")
        .expect("accept");

    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as HandshakeRequest, Response as HandshakeResponse,
    };
    let callback = |request: &HandshakeRequest, response: HandshakeResponse| {
        assert_eq!(
            request.headers().get("x-auth").map(|v| v.as_bytes()),
            Some(b"secret".as_slice())
        );
        Ok(response)
    };
    let server = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .expect("handshake");
    drop(server);
    client.disconnect();
}

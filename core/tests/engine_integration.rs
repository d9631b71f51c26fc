/*
 * engine_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the exchange engine. A scripted in-memory transport
 * answers each written request with transport events, so connection reuse,
 * redirects, authentication, tunnels, 100-continue, filters, timeouts,
 * cancellation and replay can be checked without a network.
 *
 * Run with:
 *   cargo test -p corriere_core --test engine_integration -- --nocapture
 */

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use corriere_core::auth::Realm;
use corriere_core::engine::{FilterContext, IoExceptionFilter, ResponseFilter};
use corriere_core::pool::EndpointKey;
use corriere_core::protocol::http::transport::BoxFuture;
use corriere_core::protocol::http::{
    AsyncHandler, AsyncHttpClient, BodyPart, Channel, Headers, Method, OpenedChannel, Outbound, RequestBuilder,
    ResponseStatus, State, Transport, TransportEvent, WireRequest,
};
use corriere_core::proxy::ProxyServer;
use corriere_core::{ClientConfig, ExchangeError, PoolError, TimeoutKind};

/// Decides the events answering one write on channel `channel_id`.
type Responder = dyn Fn(u64, &Outbound) -> Vec<TransportEvent> + Send + Sync;

struct MockChannel {
    id: u64,
    open: AtomicBool,
    writes: Mutex<Vec<Outbound>>,
    upgrades: Mutex<Vec<String>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    responder: Arc<Responder>,
}

impl MockChannel {
    /// Deliver `event` outside of any write, as a slow server would.
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn requests(&self) -> Vec<WireRequest> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|w| match w {
                Outbound::Request(r) => Some(r.clone()),
                Outbound::Body(_) => None,
            })
            .collect()
    }
}

impl Channel for MockChannel {
    fn id(&self) -> u64 {
        self.id
    }

    fn write(&self, message: Outbound) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        let events = (self.responder)(self.id, &message);
        self.writes.lock().unwrap().push(message);
        for event in events {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    fn upgrade_to_tls(&self, host: &str) -> io::Result<()> {
        self.upgrades.lock().unwrap().push(host.to_string());
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    next_id: AtomicU64,
    channels: Mutex<Vec<Arc<MockChannel>>>,
    responder: Arc<Responder>,
}

impl MockTransport {
    fn new(responder: impl Fn(u64, &Outbound) -> Vec<TransportEvent> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            channels: Mutex::new(Vec::new()),
            responder: Arc::new(responder),
        })
    }

    fn opened(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    fn channel(&self, index: usize) -> Arc<MockChannel> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }

    fn all_requests(&self) -> Vec<WireRequest> {
        self.channels.lock().unwrap().iter().flat_map(|c| c.requests()).collect()
    }
}

impl Transport for MockTransport {
    fn open(&self, _key: &EndpointKey) -> BoxFuture<'static, io::Result<OpenedChannel>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(MockChannel {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            open: AtomicBool::new(true),
            writes: Mutex::new(Vec::new()),
            upgrades: Mutex::new(Vec::new()),
            events: tx,
            responder: Arc::clone(&self.responder),
        });
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Box::pin(async move {
            Ok(OpenedChannel {
                channel,
                events: rx,
            })
        })
    }
}

fn response(code: u16, headers: &[(&str, &str)], body: &str) -> Vec<TransportEvent> {
    let headers: Headers = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<Vec<_>>()
        .into();
    vec![
        TransportEvent::Status(ResponseStatus::new(code)),
        TransportEvent::Headers(headers),
        TransportEvent::Body(BodyPart::new(body.to_string(), true)),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn client(config: ClientConfig, transport: &Arc<MockTransport>) -> AsyncHttpClient {
    init_tracing();
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    AsyncHttpClient::with_transport(config, transport, Handle::current())
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Counts handler callbacks.
#[derive(Clone, Default)]
struct Counting {
    statuses: Arc<Mutex<Vec<u16>>>,
    completed: Arc<AtomicUsize>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl AsyncHandler for Counting {
    fn on_status(&mut self, status: &ResponseStatus) -> State {
        self.statuses.lock().unwrap().push(status.code);
        State::Continue
    }

    fn on_completed(&mut self) -> Result<(), String> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_error(&mut self, error: &ExchangeError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequential_requests_reuse_one_connection() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => response(200, &[("Content-Length", "2")], "ok"),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default().max_connections(1), &transport);
    for _ in 0..3 {
        let request = RequestBuilder::get("http://example.com/").build().unwrap();
        let response = client.execute_request(request).await.unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body_string(), "ok");
    }
    assert_eq!(transport.opened(), 1);
    assert_eq!(transport.channel(0).requests().len(), 3);
    let stats = client.pool_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.leased, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_concurrent_request_fails_fast_at_capacity() {
    let transport = MockTransport::new(|_, _| Vec::new());
    let client = client(ClientConfig::default().max_connections(1), &transport);
    let first = client.execute_request(RequestBuilder::get("http://example.com/slow").build().unwrap());
    let second = client.execute_request(RequestBuilder::get("http://example.com/other").build().unwrap());
    match second.await {
        Err(ExchangeError::Capacity(PoolError::TooManyConnections(1))) => {}
        other => panic!("unexpected {:?}", other.map(|r| r.status_code())),
    }
    assert_eq!(
        ExchangeError::from(PoolError::TooManyConnections(1)).to_string(),
        "Too many connections 1"
    );
    assert!(first.cancel());
    assert!(matches!(first.await, Err(ExchangeError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn found_on_post_is_followed_as_get_without_body() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.target == "/a" => response(302, &[("Location", "/b"), ("Content-Length", "0")], ""),
        Outbound::Request(_) => response(200, &[], "done"),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default().follow_redirect(true), &transport);
    let handler = Counting::default();
    let request = RequestBuilder::post("http://example.com/a")
        .header("Content-Type", "text/plain")
        .body("payload")
        .build()
        .unwrap();
    let response = client.execute(request, handler.clone()).await.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body_string(), "done");
    assert_eq!(response.url.as_str(), "http://example.com/b");

    let requests = transport.all_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[1].method, Method::Get);
    assert_eq!(requests[1].target, "/b");
    assert!(requests[1].body.is_none());
    assert!(!requests[1].headers.contains("Content-Length"));
    assert!(!requests[1].headers.contains("Content-Type"));
    // the redirect response is never delivered
    assert_eq!(*handler.statuses.lock().unwrap(), vec![200]);
    assert_eq!(transport.opened(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_is_released_after_continue() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => vec![
            TransportEvent::Status(ResponseStatus::with_reason(100, "Continue")),
            TransportEvent::Headers(Headers::new()),
        ],
        Outbound::Body(_) => response(201, &[], "created"),
    });
    let client = client(ClientConfig::default(), &transport);
    let handler = Counting::default();
    let request = RequestBuilder::post("http://example.com/upload")
        .header("Expect", "100-continue")
        .body("payload")
        .build()
        .unwrap();
    let response = client.execute(request, handler.clone()).await.unwrap();
    assert_eq!(response.status_code(), 201);

    let channel = transport.channel(0);
    let writes = channel.writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 2);
    match &writes[0] {
        Outbound::Request(r) => {
            assert!(r.body.is_none());
            assert_eq!(r.headers.get("Content-Length"), Some("7"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(&writes[1], Outbound::Body(b) if &b[..] == b"payload"));
    assert_eq!(handler.completed.load(Ordering::SeqCst), 1);
    assert_eq!(*handler.statuses.lock().unwrap(), vec![201]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redirect_limit_stops_after_max_followed() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => response(302, &[("Location", "/next")], ""),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default().follow_redirect(true).max_redirects(2), &transport);
    let handler = Counting::default();
    let outcome = client
        .execute(RequestBuilder::get("http://example.com/").build().unwrap(), handler.clone())
        .await;
    match outcome {
        Err(e @ ExchangeError::MaxRedirects(2)) => assert_eq!(e.to_string(), "Maximum redirect reached: 2"),
        other => panic!("unexpected {:?}", other.map(|r| r.status_code())),
    }
    // the original request plus two followed redirects
    assert_eq!(transport.all_requests().len(), 3);
    assert_eq!(handler.errors.lock().unwrap().len(), 1);
    assert_eq!(handler.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_authentication_round_then_challenge_is_delivered() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => response(401, &[("WWW-Authenticate", "Basic realm=\"test\"")], "denied"),
        Outbound::Body(_) => Vec::new(),
    });
    let config = ClientConfig::default().realm(Realm::basic("user", "pass"));
    let client = client(config, &transport);
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/secret").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.status_code(), 401);
    assert_eq!(response.body_string(), "denied");

    let requests = transport.all_requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].headers.contains("Authorization"));
    assert_eq!(requests[1].headers.get("Authorization"), Some("Basic dXNlcjpwYXNz"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_closes_the_connection() {
    let transport = MockTransport::new(|_, _| Vec::new());
    let client = client(ClientConfig::default(), &transport);
    let handler = Counting::default();
    let future = client.execute(RequestBuilder::get("http://example.com/").build().unwrap(), handler.clone());
    eventually("request written", || {
        transport.opened() == 1 && !transport.channel(0).requests().is_empty()
    })
    .await;

    assert!(future.cancel());
    assert!(!future.cancel());
    assert!(!transport.channel(0).is_open());
    assert!(matches!(future.clone().await, Err(ExchangeError::Cancelled)));
    assert_eq!(handler.errors.lock().unwrap().len(), 1);
    let stats = client.pool_stats();
    assert_eq!(stats.total, 0);
    // the mock never ends its event stream; nothing may stay attached anyway
    assert_eq!(client.engine().attached_connections(), 0);
}

/// Replays once after the peer drops the connection.
struct ReplayOnce {
    used: AtomicBool,
}

impl IoExceptionFilter for ReplayOnce {
    fn filter(&self, ctx: FilterContext) -> Result<FilterContext, ExchangeError> {
        let closed = matches!(ctx.error, Some(ExchangeError::RemotelyClosed));
        if closed && !self.used.swap(true, Ordering::SeqCst) {
            let request = ctx.request.clone();
            return Ok(ctx.replay_with(request));
        }
        Ok(ctx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn io_filter_replays_on_fresh_connection() {
    let transport = MockTransport::new(|channel, w| match (channel, w) {
        (1, Outbound::Request(_)) => vec![TransportEvent::Closed],
        (_, Outbound::Request(_)) => response(200, &[], "second try"),
        _ => Vec::new(),
    });
    let config = ClientConfig::default().add_io_exception_filter(Arc::new(ReplayOnce {
        used: AtomicBool::new(false),
    }));
    let client = client(config, &transport);
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.body_string(), "second try");
    assert_eq!(transport.opened(), 2);
    assert!(!transport.channel(0).is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_client_rejects_requests() {
    let transport = MockTransport::new(|_, _| Vec::new());
    let client = client(ClientConfig::default(), &transport);
    client.close();
    let outcome = client
        .execute_request(RequestBuilder::get("http://example.com/").build().unwrap())
        .await;
    assert!(matches!(outcome, Err(ExchangeError::Capacity(PoolError::Closed))));
    assert_eq!(transport.opened(), 0);
}

fn body(data: &str, last: bool) -> TransportEvent {
    TransportEvent::Body(BodyPart::new(data.to_string(), last))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_delimited_redirect_reconnects() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.target == "/a" => vec![
            TransportEvent::Status(ResponseStatus::new(302)),
            TransportEvent::Headers(vec![("Location".to_string(), "/b".to_string())].into()),
            body("", true),
            TransportEvent::Closed,
        ],
        Outbound::Request(_) => response(200, &[("Content-Length", "4")], "done"),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default().follow_redirect(true), &transport);
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/a").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body_string(), "done");
    assert_eq!(transport.opened(), 2);
    assert_eq!(transport.channel(0).requests().len(), 1);
    assert!(!transport.channel(0).is_open());
    assert_eq!(transport.channel(1).requests()[0].target, "/b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chunked_redirect_reconnects() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.target == "/a" => vec![
            TransportEvent::Status(ResponseStatus::new(301)),
            TransportEvent::Headers(
                vec![
                    ("Location".to_string(), "/b".to_string()),
                    ("Transfer-Encoding".to_string(), "chunked".to_string()),
                ]
                .into(),
            ),
            body("moved", false),
            body("", true),
        ],
        Outbound::Request(_) => response(200, &[("Content-Length", "2")], "ok"),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default().follow_redirect(true), &transport);
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/a").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.body_string(), "ok");
    assert_eq!(transport.opened(), 2);
    assert!(!transport.channel(0).is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_status_before_continue_discards_connection() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.target == "/upload" => response(200, &[("Content-Length", "2")], "ok"),
        Outbound::Request(_) => response(200, &[("Content-Length", "4")], "next"),
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default(), &transport);
    let upload = RequestBuilder::post("http://example.com/upload")
        .header("Expect", "100-continue")
        .body("payload")
        .build()
        .unwrap();
    let response = client.execute_request(upload).await.unwrap();
    assert_eq!(response.body_string(), "ok");
    assert!(!transport.channel(0).is_open());

    let next = client
        .execute_request(RequestBuilder::get("http://example.com/next").build().unwrap())
        .await
        .unwrap();
    assert_eq!(next.body_string(), "next");
    assert_eq!(transport.opened(), 2);
    // the withheld body was never written, and nothing followed it on that connection
    let first = transport.channel(0).writes.lock().unwrap().clone();
    assert_eq!(first.len(), 1);
    assert_eq!(transport.channel(1).requests()[0].target, "/next");
}

/// Replays a 503 once and hands the rest of the exchange to `handler`.
struct RetryUnavailable {
    handler: Counting,
}

impl ResponseFilter for RetryUnavailable {
    fn filter(&self, mut ctx: FilterContext) -> Result<FilterContext, ExchangeError> {
        if ctx.status.as_ref().map(|s| s.code) != Some(503) {
            return Ok(ctx);
        }
        ctx.handler = Some(Box::new(self.handler.clone()));
        let request = ctx.request.clone();
        Ok(ctx.replay_with(request))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn response_filter_replays_with_swapped_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let transport = MockTransport::new(move |_, w| match w {
        Outbound::Request(_) if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
            response(503, &[("Content-Length", "4")], "busy")
        }
        Outbound::Request(_) => response(200, &[("Content-Length", "5")], "ready"),
        Outbound::Body(_) => Vec::new(),
    });
    let swapped = Counting::default();
    let config = ClientConfig::default().add_response_filter(Arc::new(RetryUnavailable {
        handler: swapped.clone(),
    }));
    let client = client(config, &transport);
    let original = Counting::default();
    let response = client
        .execute(RequestBuilder::get("http://example.com/").build().unwrap(), original.clone())
        .await
        .unwrap();
    assert_eq!(response.body_string(), "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // the 503 body was drained and the replay went out on the same connection
    assert_eq!(transport.opened(), 1);
    assert!(original.statuses.lock().unwrap().is_empty());
    assert_eq!(original.completed.load(Ordering::SeqCst), 0);
    assert_eq!(*swapped.statuses.lock().unwrap(), vec![200]);
    assert_eq!(swapped.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn proxy_challenge_answered_once() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.headers.contains("Proxy-Authorization") => {
            response(200, &[("Content-Length", "2")], "ok")
        }
        Outbound::Request(_) => response(
            407,
            &[("Proxy-Authenticate", "Basic realm=\"proxy\""), ("Content-Length", "0")],
            "",
        ),
        Outbound::Body(_) => Vec::new(),
    });
    let proxy = ProxyServer::new("proxy.local", 3128).with_realm(Realm::basic("user", "pass"));
    let client = client(ClientConfig::default().proxy_server(proxy), &transport);
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/x").build().unwrap())
        .await
        .unwrap();
    assert_eq!(response.status_code(), 200);

    let requests = transport.all_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].target, "http://example.com/x");
    assert!(!requests[0].headers.contains("Proxy-Authorization"));
    assert_eq!(requests[1].headers.get("Proxy-Authorization"), Some("Basic dXNlcjpwYXNz"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn https_through_proxy_tunnels_then_resends() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(r) if r.method == Method::Connect => vec![
            TransportEvent::Status(ResponseStatus::with_reason(200, "Connection established")),
            TransportEvent::Headers(Headers::new()),
        ],
        Outbound::Request(_) => response(200, &[("Content-Length", "6")], "secret"),
        Outbound::Body(_) => Vec::new(),
    });
    let proxy = ProxyServer::new("proxy.local", 3128);
    let client = client(ClientConfig::default().proxy_server(proxy), &transport);
    let handler = Counting::default();
    let response = client
        .execute(RequestBuilder::get("https://example.com/inbox").build().unwrap(), handler.clone())
        .await
        .unwrap();
    assert_eq!(response.body_string(), "secret");

    assert_eq!(transport.opened(), 1);
    let channel = transport.channel(0);
    let requests = channel.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Connect);
    assert_eq!(requests[0].target, "example.com:443");
    assert_eq!(requests[1].method, Method::Get);
    assert_eq!(requests[1].target, "/inbox");
    assert_eq!(*channel.upgrades.lock().unwrap(), vec!["example.com".to_string()]);
    // the CONNECT answer is not delivered
    assert_eq!(*handler.statuses.lock().unwrap(), vec![200]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_tunnel_fails_the_exchange() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => response(403, &[("Content-Length", "0")], ""),
        Outbound::Body(_) => Vec::new(),
    });
    let proxy = ProxyServer::new("proxy.local", 3128);
    let client = client(ClientConfig::default().proxy_server(proxy), &transport);
    let handler = Counting::default();
    let outcome = client
        .execute(RequestBuilder::get("https://example.com/").build().unwrap(), handler.clone())
        .await;
    match outcome {
        Err(ExchangeError::ProtocolUpgrade(msg)) => assert!(msg.contains("403"), "{}", msg),
        other => panic!("unexpected {:?}", other.map(|r| r.status_code())),
    }
    assert_eq!(transport.channel(0).requests().len(), 1);
    assert!(transport.channel(0).upgrades.lock().unwrap().is_empty());
    assert!(!transport.channel(0).is_open());
    assert_eq!(handler.errors.lock().unwrap().len(), 1);
    assert!(handler.statuses.lock().unwrap().is_empty());
}

/// Stops the exchange at the named callback.
#[derive(Clone, Default)]
struct StopAt {
    stage: &'static str,
    parts: Arc<Mutex<Vec<String>>>,
    completed: Arc<AtomicUsize>,
}

impl AsyncHandler for StopAt {
    fn on_status(&mut self, _status: &ResponseStatus) -> State {
        if self.stage == "status" { State::Abort } else { State::Continue }
    }

    fn on_headers(&mut self, _headers: &Headers) -> State {
        if self.stage == "headers" { State::Abort } else { State::Continue }
    }

    fn on_body_part(&mut self, part: &BodyPart) -> State {
        self.parts.lock().unwrap().push(String::from_utf8_lossy(&part.data).into_owned());
        if self.stage == "body" { State::Abort } else { State::Continue }
    }

    fn on_completed(&mut self) -> Result<(), String> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_before_body_drains_and_reuses() {
    for stage in ["status", "headers"] {
        let transport = MockTransport::new(|_, w| match w {
            Outbound::Request(_) => response(200, &[("Content-Length", "5")], "hello"),
            Outbound::Body(_) => Vec::new(),
        });
        let client = client(ClientConfig::default(), &transport);
        let handler = StopAt {
            stage,
            ..StopAt::default()
        };
        let response = client
            .execute(RequestBuilder::get("http://example.com/").build().unwrap(), handler.clone())
            .await
            .unwrap();
        assert_eq!(response.status_code(), 200, "{}", stage);
        assert!(handler.parts.lock().unwrap().is_empty(), "{}", stage);
        assert_eq!(handler.completed.load(Ordering::SeqCst), 1, "{}", stage);

        // the unread body is drained, then the connection goes back to the pool
        eventually("connection drained", || client.pool_stats().idle == 1).await;
        client
            .execute_request(RequestBuilder::get("http://example.com/again").build().unwrap())
            .await
            .unwrap();
        assert_eq!(transport.opened(), 1, "{}", stage);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_in_body_discards_connection() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => vec![
            TransportEvent::Status(ResponseStatus::new(200)),
            TransportEvent::Headers(vec![("Content-Length".to_string(), "4".to_string())].into()),
            body("ab", false),
            body("cd", true),
        ],
        Outbound::Body(_) => Vec::new(),
    });
    let client = client(ClientConfig::default(), &transport);
    let handler = StopAt {
        stage: "body",
        ..StopAt::default()
    };
    let response = client
        .execute(RequestBuilder::get("http://example.com/").build().unwrap(), handler.clone())
        .await
        .unwrap();
    assert_eq!(response.body_string(), "ab");
    assert_eq!(*handler.parts.lock().unwrap(), vec!["ab".to_string()]);
    assert_eq!(handler.completed.load(Ordering::SeqCst), 1);
    assert!(!transport.channel(0).is_open());
    assert_eq!(client.pool_stats().total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_server_hits_read_timeout() {
    let transport = MockTransport::new(|_, _| Vec::new());
    let config = ClientConfig::default().read_timeout(Duration::from_millis(100));
    let client = client(config, &transport);
    let handler = Counting::default();
    let outcome = client
        .execute(RequestBuilder::get("http://example.com/").build().unwrap(), handler.clone())
        .await;
    assert!(matches!(outcome, Err(ExchangeError::Timeout(TimeoutKind::Read))));
    assert_eq!(handler.errors.lock().unwrap().len(), 1);
    assert!(!transport.channel(0).is_open());
    assert_eq!(client.engine().attached_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn steady_body_keeps_read_timeout_away() {
    let transport = MockTransport::new(|_, w| match w {
        Outbound::Request(_) => vec![
            TransportEvent::Status(ResponseStatus::new(200)),
            TransportEvent::Headers(vec![("Transfer-Encoding".to_string(), "chunked".to_string())].into()),
        ],
        Outbound::Body(_) => Vec::new(),
    });
    let config = ClientConfig::default().read_timeout(Duration::from_millis(150));
    let client = client(config, &transport);
    let future = client.execute_request(RequestBuilder::get("http://example.com/").build().unwrap());
    eventually("request written", || {
        transport.opened() == 1 && !transport.channel(0).requests().is_empty()
    })
    .await;

    // four gaps of 60ms: well past the timeout in total, never within one gap
    let channel = transport.channel(0);
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!future.is_done());
        channel.emit(body("a", false));
    }
    channel.emit(body("b", true));
    let response = future.await.unwrap();
    assert_eq!(response.body_string(), "aaaab");
    assert_eq!(client.pool_stats().idle, 1);
}

/// Real request over TCP. Run with `--ignored`.
#[tokio::test]
#[ignore]
async fn plain_http_get_over_network() {
    let client = AsyncHttpClient::new(ClientConfig::default().follow_redirect(true)).unwrap();
    let response = client
        .execute_request(RequestBuilder::get("http://example.com/").build().unwrap())
        .await
        .unwrap();
    println!("{} {} bytes", response.status_code(), response.body.len());
    assert!(response.status.is_success());
}

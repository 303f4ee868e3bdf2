use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, GatewayConfig};
use crate::pipeline::LinkPipeline;
use crate::protocol::{parse_frame, InboundFrame, OutboundReply};

const PONG_QUEUE_CAPACITY: usize = 8;

static ECHO_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// Write half of a gateway connection. Cloned into every in-flight reply.
///
/// Clones share one closed flag, set once the read side has seen the
/// connection end; sends after that point fail.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
}

impl FrameSender {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    pub async fn send(&self, frame: String) -> Result<(), String> {
        if self.is_closed() {
            return Err("gateway connection is closed".to_owned());
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| "gateway connection is closed".to_owned())
    }
}

pub struct GatewayConnection {
    pub events: mpsc::Receiver<TransportEvent>,
    pub sender: FrameSender,
}

#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<GatewayConnection, String>;
}

/// NapCat forward-websocket connector.
pub struct WsConnector {
    url: String,
    token: Option<String>,
    queue_capacity: usize,
}

impl WsConnector {
    pub fn new(gateway: &GatewayConfig, queue_capacity: usize) -> Self {
        Self {
            url: gateway.url.trim().to_owned(),
            token: gateway.bearer_token().map(ToOwned::to_owned),
            queue_capacity: queue_capacity.max(1),
        }
    }
}

#[async_trait]
impl GatewayConnector for WsConnector {
    async fn connect(&self) -> Result<GatewayConnection, String> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| format!("invalid gateway url {}: {err}", self.url))?;
        if let Some(token) = self.token.as_deref() {
            let value = format!("Bearer {token}")
                .parse::<HeaderValue>()
                .map_err(|err| format!("access token is not a valid header value: {err}"))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (ws, _) = connect_async(request)
            .await
            .map_err(|err| format!("gateway websocket connect failed: {err}"))?;
        let (mut write, mut read) = ws.split();

        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.queue_capacity);
        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.queue_capacity);
        let (pong_tx, mut pong_rx) = mpsc::channel::<Vec<u8>>(PONG_QUEUE_CAPACITY);
        let sender = FrameSender::new(out_tx);
        let liveness = sender.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(frame) = out_rx.recv() => Message::Text(frame),
                    Some(payload) = pong_rx.recv() => Message::Pong(payload),
                    else => break,
                };
                if let Err(err) = write.send(message).await {
                    warn!("gateway write failed, frame dropped: {err}");
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            let terminal = loop {
                let event = match read.next().await {
                    Some(Ok(Message::Text(text))) => TransportEvent::Frame(text),
                    Some(Ok(Message::Binary(bytes))) => {
                        TransportEvent::Frame(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = pong_tx.try_send(payload);
                        continue;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.to_string(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Err(err)) => break TransportEvent::Error(err.to_string()),
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_owned(),
                        }
                    }
                };
                if event_tx.send(event).await.is_err() {
                    liveness.mark_closed();
                    return;
                }
            };
            liveness.mark_closed();
            let _ = event_tx.send(terminal).await;
        });

        Ok(GatewayConnection {
            events: event_rx,
            sender,
        })
    }
}

/// Random pause before each reply, drawn from `[min_ms, max_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ReplyDelay {
    pub fn sample(self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::random_range(self.min_ms..self.max_ms))
    }
}

pub struct SessionController {
    connector: Arc<dyn GatewayConnector>,
    pipeline: Arc<LinkPipeline>,
    reconnect_delay: Duration,
    reply_delay: ReplyDelay,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        pipeline: Arc<LinkPipeline>,
        settings: &BridgeConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            pipeline,
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            reply_delay: ReplyDelay {
                min_ms: settings.reply_delay_min_ms,
                max_ms: settings.reply_delay_max_ms,
            },
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("session state {:?} -> {:?}", previous, next);
        }
    }

    pub async fn run_forever(&self) {
        loop {
            self.set_state(SessionState::Connecting);
            info!("connecting to gateway");
            match self.connector.connect().await {
                Ok(connection) => {
                    self.set_state(SessionState::Connected);
                    info!("connected to gateway");
                    self.drive(connection).await;
                }
                Err(err) => warn!("gateway unavailable: {err}"),
            }
            self.set_state(SessionState::Disconnected);
            info!(
                "reconnecting to gateway in {} ms",
                self.reconnect_delay.as_millis()
            );
            sleep(self.reconnect_delay).await;
        }
    }

    async fn drive(&self, mut connection: GatewayConnection) {
        self.pump(&mut connection).await;
        connection.sender.mark_closed();
    }

    async fn pump(&self, connection: &mut GatewayConnection) {
        while let Some(event) = connection.events.recv().await {
            match event {
                TransportEvent::Frame(text) => {
                    self.handle_frame(&text, &connection.sender);
                }
                TransportEvent::Closed { code, reason } => {
                    info!(
                        "gateway connection closed (code={}, reason={})",
                        code.map(|c| c.to_string())
                            .unwrap_or_else(|| "none".to_owned()),
                        if reason.is_empty() { "<none>" } else { reason.as_str() }
                    );
                    return;
                }
                TransportEvent::Error(err) => {
                    warn!("gateway connection error: {err}");
                    return;
                }
            }
        }
        info!("gateway event stream ended");
    }

    /// Dispatches one frame. Replies run on their own task, so a slow
    /// resolution never holds up the frames behind it.
    fn handle_frame(&self, text: &str, sender: &FrameSender) {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping malformed gateway frame: {err}");
                return;
            }
        };
        match frame {
            InboundFrame::Message(message) => {
                let pipeline = Arc::clone(&self.pipeline);
                let sender = sender.clone();
                let delay = self.reply_delay;
                tokio::spawn(async move {
                    let Some(reply) = pipeline.process(&message).await else {
                        return;
                    };
                    sleep(delay.sample()).await;
                    deliver(&sender, &reply).await;
                });
            }
            InboundFrame::ActionResponse {
                status,
                retcode,
                echo,
                message,
            } => {
                let echo = echo.as_deref().unwrap_or("-");
                if retcode == 0 {
                    debug!("gateway accepted action (echo={echo}, status={status})");
                } else {
                    warn!(
                        "gateway rejected action (echo={}, status={}, retcode={}): {}",
                        echo,
                        status,
                        retcode,
                        message.as_deref().unwrap_or("no message")
                    );
                }
            }
            InboundFrame::Event { post_type } => {
                debug!("ignoring {post_type} event");
            }
        }
    }
}

async fn deliver(sender: &FrameSender, reply: &OutboundReply) {
    let echo = next_echo();
    match sender.send(reply.to_frame(&echo)).await {
        Ok(()) => info!("[group {}] reply sent (echo={})", reply.group_id, echo),
        Err(err) => warn!("[group {}] reply dropped: {err}", reply.group_id),
    }
}

fn next_echo() -> String {
    let seq = ECHO_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("bili-bridge-{}-{seq}", now_ms())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Instant};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use crate::pipeline::tests::{test_config, StaticResolver};
    use crate::resolver::Resolution;

    struct FakeLink {
        events: mpsc::Sender<TransportEvent>,
        outbound: mpsc::Receiver<String>,
    }

    fn fake_connection(capacity: usize) -> (GatewayConnection, FakeLink) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            GatewayConnection {
                events: event_rx,
                sender: FrameSender::new(out_tx),
            },
            FakeLink {
                events: event_tx,
                outbound: out_rx,
            },
        )
    }

    /// Hands out queued results, then idle connections that never close.
    #[derive(Default)]
    struct FakeConnector {
        queued: Mutex<VecDeque<Result<GatewayConnection, String>>>,
        attempts: Mutex<Vec<Instant>>,
        idle_links: Mutex<Vec<FakeLink>>,
    }

    impl FakeConnector {
        fn with(results: Vec<Result<GatewayConnection, String>>) -> Arc<Self> {
            Arc::new(Self {
                queued: Mutex::new(results.into()),
                ..Self::default()
            })
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().expect("lock attempts").clone()
        }
    }

    #[async_trait]
    impl GatewayConnector for FakeConnector {
        async fn connect(&self) -> Result<GatewayConnection, String> {
            self.attempts
                .lock()
                .expect("lock attempts")
                .push(Instant::now());
            if let Some(next) = self.queued.lock().expect("lock queue").pop_front() {
                return next;
            }
            let (connection, link) = fake_connection(4);
            self.idle_links.lock().expect("lock idle").push(link);
            Ok(connection)
        }
    }

    fn controller(connector: Arc<FakeConnector>, answer: Resolution) -> Arc<SessionController> {
        let config = test_config();
        let pipeline = Arc::new(LinkPipeline::new(&config, StaticResolver::new(answer)));
        Arc::new(SessionController::new(connector, pipeline, &config.bridge))
    }

    fn card_frame(group_id: u64, url: &str) -> String {
        let card = json!({ "meta": { "detail_1": { "appid": "1109937557", "qqdocurl": url } } });
        json!({
            "post_type": "message",
            "message_type": "group",
            "group_id": group_id,
            "message": [ { "type": "json", "data": { "data": card.to_string() } } ]
        })
        .to_string()
    }

    #[test]
    fn reply_delay_stays_in_half_open_range() {
        let delay = ReplyDelay {
            min_ms: 1_000,
            max_ms: 1_500,
        };
        for _ in 0..500 {
            let sample = delay.sample();
            assert!(sample >= Duration::from_millis(1_000));
            assert!(sample < Duration::from_millis(1_500));
        }
        let fixed = ReplyDelay {
            min_ms: 7,
            max_ms: 7,
        };
        assert_eq!(fixed.sample(), Duration::from_millis(7));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_do_not_stop_later_frames() {
        let (connection, mut link) = fake_connection(16);
        let connector = FakeConnector::with(vec![Ok(connection)]);
        let controller = controller(
            connector,
            Resolution::VideoId("BV1xx411x7xx".to_owned()),
        );
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        for frame in [
            "definitely not json".to_owned(),
            r#"{"post_type":"message","message_type":"group","group_id":123456789}"#.to_owned(),
            r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#.to_owned(),
            card_frame(123456789, "https://b23.tv/abc123?spm=1&ts=2"),
        ] {
            link.events
                .send(TransportEvent::Frame(frame))
                .await
                .expect("push frame");
        }

        let sent = link.outbound.recv().await.expect("reply frame");
        let sent: Value = serde_json::from_str(&sent).expect("reply json");
        assert_eq!(sent["action"], "send_group_msg");
        assert_eq!(sent["params"]["group_id"], json!(123456789_u64));
        assert_eq!(
            sent["params"]["message"],
            "链接：https://b23.tv/abc123\n视频BV号：BV1xx411x7xx"
        );
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reply_waits_for_random_delay() {
        let (connection, mut link) = fake_connection(16);
        let connector = FakeConnector::with(vec![Ok(connection)]);
        let controller = controller(connector, Resolution::Unresolved);
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        let pushed_at = Instant::now();
        link.events
            .send(TransportEvent::Frame(card_frame(123456789, "https://b23.tv/x1")))
            .await
            .expect("push frame");
        let sent = link.outbound.recv().await.expect("reply frame");
        let waited = pushed_at.elapsed();
        assert!(waited >= Duration::from_millis(1_000), "waited {waited:?}");
        assert!(waited < Duration::from_millis(1_500), "waited {waited:?}");
        assert!(sent.contains("链接：https://b23.tv/x1"));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn every_qualifying_message_gets_its_own_reply() {
        let (connection, mut link) = fake_connection(16);
        let connector = FakeConnector::with(vec![Ok(connection)]);
        let controller = controller(connector, Resolution::Unresolved);
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        for url in ["https://b23.tv/one", "https://b23.tv/two", "https://b23.tv/one"] {
            link.events
                .send(TransportEvent::Frame(card_frame(123456789, url)))
                .await
                .expect("push frame");
        }
        link.events
            .send(TransportEvent::Frame(card_frame(42, "https://b23.tv/other")))
            .await
            .expect("push frame");

        let mut messages = Vec::new();
        for _ in 0..3 {
            let sent = link.outbound.recv().await.expect("reply frame");
            let sent: Value = serde_json::from_str(&sent).expect("reply json");
            messages.push(sent["params"]["message"].as_str().unwrap_or_default().to_owned());
        }
        messages.sort();
        assert_eq!(
            messages,
            vec![
                "链接：https://b23.tv/one",
                "链接：https://b23.tv/one",
                "链接：https://b23.tv/two",
            ]
        );

        sleep(Duration::from_secs(10)).await;
        assert!(link.outbound.try_recv().is_err(), "filtered group must not get a reply");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_once_after_close_with_configured_delay() {
        let (connection, link) = fake_connection(4);
        let connector = FakeConnector::with(vec![Ok(connection)]);
        let controller = controller(Arc::clone(&connector), Resolution::Unresolved);
        let mut state = controller.subscribe();
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .expect("connected");
        let closed_at = Instant::now();
        link.events
            .send(TransportEvent::Closed {
                code: Some(4_009),
                reason: "kicked".to_owned(),
            })
            .await
            .expect("push close");
        state
            .wait_for(|s| *s == SessionState::Disconnected)
            .await
            .expect("disconnected");

        sleep(Duration::from_millis(4_900)).await;
        assert_eq!(connector.attempts().len(), 1);

        sleep(Duration::from_millis(200)).await;
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].duration_since(closed_at) >= Duration::from_millis(5_000));
        assert_eq!(*state.borrow(), SessionState::Connected);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_and_transport_error_both_schedule_retry() {
        let (connection, link) = fake_connection(4);
        let connector = FakeConnector::with(vec![
            Err("connection refused".to_owned()),
            Ok(connection),
        ]);
        let controller = controller(Arc::clone(&connector), Resolution::Unresolved);
        let mut state = controller.subscribe();
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .expect("connected after retry");
        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].duration_since(attempts[0]) >= Duration::from_millis(5_000));

        link.events
            .send(TransportEvent::Error("protocol violation".to_owned()))
            .await
            .expect("push error");
        sleep(Duration::from_millis(5_100)).await;
        assert_eq!(connector.attempts().len(), 3);
        task.abort();
    }

    #[tokio::test]
    async fn send_on_closed_connection_is_logged_not_fatal() {
        let (connection, link) = fake_connection(4);
        drop(link);
        let reply = OutboundReply {
            group_id: "1".to_owned(),
            text: "x".to_owned(),
        };
        assert!(connection.sender.send(reply.to_frame("e")).await.is_err());
        deliver(&connection.sender, &reply).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reply_in_flight_when_gateway_closes_is_dropped() {
        let (connection, mut link) = fake_connection(16);
        let connector = FakeConnector::with(vec![Ok(connection)]);
        let controller = controller(connector, Resolution::Unresolved);
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        link.events
            .send(TransportEvent::Frame(card_frame(123456789, "https://b23.tv/late1")))
            .await
            .expect("push frame");
        link.events
            .send(TransportEvent::Closed {
                code: Some(1_000),
                reason: String::new(),
            })
            .await
            .expect("push close");

        sleep(Duration::from_millis(2_000)).await;
        assert!(
            link.outbound.try_recv().is_err(),
            "reply must not reach a closed connection"
        );
        task.abort();
    }

    #[tokio::test]
    async fn sender_fails_after_gateway_closes_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("websocket accept");
            ws.close(None).await.expect("send close");
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut gateway = test_config().gateway;
        gateway.url = format!("ws://{addr}/ws");
        let mut connection = WsConnector::new(&gateway, 8)
            .connect()
            .await
            .expect("connect");
        let event = timeout(Duration::from_secs(10), connection.events.recv())
            .await
            .expect("close arrives in time");
        assert!(
            matches!(event, Some(TransportEvent::Closed { .. })),
            "unexpected event {event:?}"
        );

        let sender = connection.sender.clone();
        let reply = OutboundReply {
            group_id: "123456789".to_owned(),
            text: "链接：https://b23.tv/late1".to_owned(),
        };
        assert!(sender.is_closed());
        assert!(sender.send(reply.to_frame("late-echo")).await.is_err());
        server.abort();
    }

    #[test]
    fn echo_tags_are_unique() {
        let tags: HashSet<String> = (0..100).map(|_| next_echo()).collect();
        assert_eq!(tags.len(), 100);
    }

    #[tokio::test]
    async fn websocket_round_trip_with_bearer_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let auth_header = Arc::new(Mutex::new(None::<String>));
        let auth_capture = Arc::clone(&auth_header);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let callback = move |request: &Request,
                                 response: Response|
                  -> Result<Response, ErrorResponse> {
                let value = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);
                if let Ok(mut guard) = auth_capture.lock() {
                    *guard = value;
                }
                Ok(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .expect("websocket accept");
            ws.send(Message::Text(card_frame(123456789, "https://b23.tv/live01?x=1")))
                .await
                .expect("push card");
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected websocket end: {other:?}"),
                }
            }
        });

        let mut config = test_config();
        config.gateway.url = format!("ws://{addr}/ws");
        config.gateway.access_token = Some("napcat-token".to_owned());
        config.bridge.reply_delay_min_ms = 1;
        config.bridge.reply_delay_max_ms = 5;
        let pipeline = Arc::new(LinkPipeline::new(
            &config,
            StaticResolver::new(Resolution::VideoId("BV1GJ411x7h7".to_owned())),
        ));
        let connector = Arc::new(WsConnector::new(
            &config.gateway,
            config.bridge.event_queue_capacity,
        ));
        let controller = Arc::new(SessionController::new(connector, pipeline, &config.bridge));
        let task = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run_forever().await }
        });

        let sent = timeout(Duration::from_secs(10), server)
            .await
            .expect("server finished in time")
            .expect("server task");
        let sent: Value = serde_json::from_str(&sent).expect("reply json");
        assert_eq!(sent["action"], "send_group_msg");
        assert_eq!(
            sent["params"]["message"],
            "链接：https://b23.tv/live01\n视频BV号：BV1GJ411x7h7"
        );
        assert!(sent["echo"]
            .as_str()
            .is_some_and(|echo| echo.starts_with("bili-bridge-")));
        assert_eq!(
            auth_header.lock().expect("lock auth").as_deref(),
            Some("Bearer napcat-token")
        );
        task.abort();
    }
}

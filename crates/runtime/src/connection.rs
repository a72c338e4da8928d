//! Persistent WebSocket connection to the peer.
//!
//! The manager owns the connection state machine:
//!
//! ```text
//! disconnected -> connecting -> open -> disconnected
//!                     ^                      |
//!                     +---- retry (bounded) -+
//! ```
//!
//! Every `connect()` and `close()` bumps a generation counter. Tasks and
//! scheduled reconnects remember the generation they were started under and
//! become inert once it moves on, so a deliberate close is never undone by a
//! late reconnect.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::Message;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{Error, Result};

/// Automatic reconnect attempts after an unexpected close.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Fixed delay before each reconnect attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Settings for the relay endpoint below the host's base URL.
    pub fn for_base_url(base_url: &str) -> Result<Self> {
        Ok(Self::new(endpoint_url(base_url, protocol::ENDPOINT_PATH)?))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Join `endpoint` below `base_url`, mapping `http(s)` to `ws(s)`.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> Result<String> {
    let mut base = Url::parse(base_url)?;
    let scheme = match base.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };
    base.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(base_url.to_string()))?;

    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let url = base.join(endpoint.trim_start_matches('/'))?;
    Ok(url.to_string())
}

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection is open; fires once per successful connect and
    /// carries that connection's generation.
    Opened(u64),
    /// A well-formed message arrived from the peer.
    Message(Message),
    /// An open connection ended, whether the peer dropped it or
    /// `close()` was called.
    Closed,
    /// The retry budget is spent; only a manual `connect()` tries again.
    RetriesExhausted,
}

/// Handle to the relay connection. Cheap to clone.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ConnectionConfig,
    shared: Mutex<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

#[derive(Debug)]
struct Shared {
    state: ConnectionState,
    generation: u64,
    retries: u32,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

impl ConnectionManager {
    /// Create a disconnected manager and the receiver for its events.
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            config,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                generation: 0,
                retries: 0,
                outbound: None,
            }),
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Reconnect attempts made since the last successful open.
    pub fn retries(&self) -> u32 {
        self.lock().retries
    }

    /// Whether the connection that emitted `Opened(generation)` is still
    /// the open one.
    pub fn is_current(&self, generation: u64) -> bool {
        let shared = self.lock();
        shared.generation == generation && shared.state == ConnectionState::Open
    }

    /// Start connecting unless a connection is already open or in progress.
    ///
    /// A caller-initiated connect starts with a fresh retry budget.
    pub fn connect(&self) {
        let mut shared = self.lock();
        if matches!(
            shared.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(state = %shared.state, "connect ignored");
            return;
        }
        shared.retries = 0;
        self.start(&mut shared);
    }

    /// Shut the connection down without reconnecting.
    pub fn close(&self) {
        let mut shared = self.lock();
        shared.generation += 1;
        let was_open = shared.state == ConnectionState::Open;
        let task_running = matches!(
            shared.state,
            ConnectionState::Connecting | ConnectionState::Open
        );
        shared.state = if task_running {
            ConnectionState::Closing
        } else {
            ConnectionState::Disconnected
        };
        // The writer sends a close frame once its sender is gone.
        shared.outbound = None;
        drop(shared);

        info!(url = %self.url(), "connection closed by caller");
        if was_open {
            self.emit(ConnectionEvent::Closed);
        }
    }

    /// Send a message to the peer.
    ///
    /// Only an open connection transmits; otherwise the message is dropped
    /// and [`Error::NotConnected`] returned. Nothing is buffered for later.
    pub fn send(&self, message: &Message) -> Result<()> {
        let shared = self.lock();
        let tx = match (shared.state, shared.outbound.as_ref()) {
            (ConnectionState::Open, Some(tx)) => tx,
            (state, _) => {
                error!(kind = message.kind(), %state, "connection not open, dropping message");
                return Err(Error::NotConnected(state));
            }
        };

        let text = message.to_json()?;
        tx.send(Frame::Text(text))
            .map_err(|_| Error::NotConnected(shared.state))?;
        debug!(kind = message.kind(), "sent message");
        Ok(())
    }

    fn start(&self, shared: &mut Shared) {
        shared.generation += 1;
        shared.state = ConnectionState::Connecting;
        let generation = shared.generation;
        let this = self.clone();
        tokio::spawn(async move { this.run(generation).await });
    }

    async fn run(self, generation: u64) {
        let url = self.inner.config.url.clone();
        info!(%url, generation, "connecting");

        let mut stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(%url, error = %e, "connection attempt failed");
                self.on_closed(generation, false);
                return;
            }
        };

        let (tx, mut outbound) = mpsc::unbounded_channel();
        if !self.on_opened(generation, tx) {
            debug!(generation, "connection closed while connecting, discarding");
            let _ = stream.close(None).await;
            self.on_closed(generation, false);
            return;
        }

        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            error!(error = %e, "failed to write to peer");
                            break;
                        }
                    }
                    None => {
                        let _ = sink.send(Frame::Close(None)).await;
                        break;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.on_text(&text),
                    Some(Ok(Frame::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.on_text(text),
                        Err(_) => warn!(len = bytes.len(), "dropping non UTF-8 binary frame"),
                    },
                    Some(Ok(Frame::Close(frame))) => {
                        info!(?frame, "peer closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "transport error");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.on_closed(generation, true);
    }

    fn on_opened(&self, generation: u64, tx: mpsc::UnboundedSender<Frame>) -> bool {
        let mut shared = self.lock();
        if shared.generation != generation {
            return false;
        }
        shared.state = ConnectionState::Open;
        shared.retries = 0;
        shared.outbound = Some(tx);
        drop(shared);

        info!(url = %self.url(), "connection open");
        self.emit(ConnectionEvent::Opened(generation));
        true
    }

    fn on_text(&self, text: &str) {
        match Message::parse(text) {
            Ok(message) => {
                debug!(kind = message.kind(), "received message");
                self.emit(ConnectionEvent::Message(message));
            }
            Err(e) => warn!(error = %e, "dropping malformed message"),
        }
    }

    fn on_closed(&self, generation: u64, was_open: bool) {
        let mut shared = self.lock();
        if shared.generation != generation {
            if shared.state == ConnectionState::Closing {
                shared.state = ConnectionState::Disconnected;
            }
            debug!(generation, "stale connection task finished");
            return;
        }

        shared.state = ConnectionState::Disconnected;
        shared.outbound = None;
        let max_retries = self.inner.config.max_retries;
        let attempt = if shared.retries < max_retries {
            shared.retries += 1;
            Some(shared.retries)
        } else {
            None
        };
        drop(shared);

        if was_open {
            self.emit(ConnectionEvent::Closed);
        }

        match attempt {
            Some(attempt) => {
                let delay = self.inner.config.retry_delay;
                info!(attempt, max_retries, ?delay, "scheduling reconnect");
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    this.reconnect(generation);
                });
            }
            None => {
                error!(max_retries, url = %self.url(), "giving up after repeated connection failures");
                self.emit(ConnectionEvent::RetriesExhausted);
            }
        }
    }

    fn reconnect(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation || shared.state != ConnectionState::Disconnected {
            debug!(generation, "skipping stale reconnect");
            return;
        }
        self.start(&mut shared);
    }

    fn emit(&self, event: ConnectionEvent) {
        // The receiver may be gone during shutdown.
        let _ = self.inner.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::accept_async;

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    fn fast(url: &str) -> ConnectionConfig {
        ConnectionConfig::new(url).with_retry_delay(Duration::from_millis(10))
    }

    async fn next_event(
        events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> ConnectionEvent {
        timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn opened(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> u64 {
        match next_event(events).await {
            ConnectionEvent::Opened(generation) => generation,
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    /// Accept TCP connections and drop them before the handshake.
    fn refuse_all(listener: TcpListener) -> Arc<AtomicUsize> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        attempts
    }

    /// Accept WebSocket connections and keep them open until the client leaves.
    fn accept_and_hold(listener: TcpListener) -> Arc<AtomicUsize> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if let Ok(mut ws) = accept_async(socket).await {
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                });
            }
        });
        attempts
    }

    #[test]
    fn builds_endpoint_below_base_url() {
        assert_eq!(
            endpoint_url("ws://localhost:8888/", "jupyter-mcp-tools/echo").unwrap(),
            "ws://localhost:8888/jupyter-mcp-tools/echo"
        );
        assert_eq!(
            endpoint_url("https://hub.example/user/ana", "/jupyter-mcp-tools/echo").unwrap(),
            "wss://hub.example/user/ana/jupyter-mcp-tools/echo"
        );
        assert!(matches!(
            endpoint_url("ftp://host/", "x"),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(matches!(endpoint_url("not a url", "x"), Err(Error::Url(_))));
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let (manager, _events) = ConnectionManager::new(ConnectionConfig::new("ws://127.0.0.1:1"));
        let result = manager.send(&Message::apply_tool("notebook run", json!({})));
        assert!(matches!(
            result,
            Err(Error::NotConnected(ConnectionState::Disconnected))
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (listener, url) = bind().await;
        let attempts = refuse_all(listener);
        let (manager, mut events) = ConnectionManager::new(fast(&url));

        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::RetriesExhausted);

        // One initial attempt plus five retries, and nothing after.
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        assert_eq!(manager.retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn successful_open_resets_retry_budget() {
        let (listener, url) = bind().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 4 {
                    if let Ok(mut ws) = accept_async(socket).await {
                        let _ = ws.close(None).await;
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                }
            }
        });

        let (manager, mut events) = ConnectionManager::new(fast(&url));
        manager.connect();

        opened(&mut events).await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Closed);
        assert_eq!(next_event(&mut events).await, ConnectionEvent::RetriesExhausted);

        // Three failures, one open, then a full fresh budget of five.
        assert_eq!(attempts.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn close_does_not_reconnect() {
        let (listener, url) = bind().await;
        let attempts = accept_and_hold(listener);
        let (manager, mut events) = ConnectionManager::new(fast(&url));

        manager.connect();
        let generation = opened(&mut events).await;
        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.is_current(generation));

        manager.close();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Closed);
        assert!(!manager.is_current(generation));

        sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.send(&Message::register_tools(Vec::new())).is_err());
    }

    #[tokio::test]
    async fn close_cancels_pending_reconnect() {
        let (listener, url) = bind().await;
        let attempts = refuse_all(listener);
        let config = ConnectionConfig::new(&url).with_retry_delay(Duration::from_millis(300));
        let (manager, _events) = ConnectionManager::new(config);

        manager.connect();
        timeout(Duration::from_secs(5), async {
            while manager.retries() == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first attempt never failed");

        manager.close();
        sleep(Duration::from_millis(600)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_is_ignored_while_open() {
        let (listener, url) = bind().await;
        let attempts = accept_and_hold(listener);
        let (manager, mut events) = ConnectionManager::new(fast(&url));

        manager.connect();
        manager.connect();
        opened(&mut events).await;
        manager.connect();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        manager.close();
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.send(Frame::Text("not json".into())).await.unwrap();
            ws.send(Frame::Text(r#"{"no_type":true}"#.into())).await.unwrap();
            ws.send(Frame::Text(r#"{"type":"ping","seq":1}"#.into()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (manager, mut events) = ConnectionManager::new(fast(&url));
        manager.connect();

        opened(&mut events).await;
        let ConnectionEvent::Message(message) = next_event(&mut events).await else {
            panic!("expected a message");
        };
        assert_eq!(message.kind(), "ping");
        assert_eq!(manager.state(), ConnectionState::Open);
        manager.close();
    }

    #[tokio::test]
    async fn sent_messages_reach_peer() {
        let (listener, url) = bind().await;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            if let Some(Ok(Frame::Text(text))) = ws.next().await {
                let _ = tx.send(text);
            }
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (manager, mut events) = ConnectionManager::new(fast(&url));
        manager.connect();
        opened(&mut events).await;

        let message = Message::apply_tool("notebook run", json!({"cell": 2}));
        manager.send(&message).unwrap();

        let text = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(Message::parse(&text).unwrap(), message);
        manager.close();
    }
}

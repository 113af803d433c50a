#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each integration test binary uses a different subset of these helpers"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tiingo_stream_sdk::Result;
use tiingo_stream_sdk::stream::{Client, ConnectionState, StreamConfig};
use tiingo_stream_sdk::ws::{Connector, Transport, TransportEvent, WsError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const TOKEN: &str = "test-token";

/// Upper bound for every wait in the tests. Generous because tests running on
/// tokio's paused clock advance straight through it.
pub const WAIT: Duration = Duration::from_secs(600);

#[must_use]
pub fn config() -> StreamConfig {
    config_with(true, 5)
}

#[must_use]
pub fn config_with(reconnect: bool, reconnection_attempts: u32) -> StreamConfig {
    StreamConfig::builder()
        .endpoint("iex")
        .token(TOKEN)
        .threshold_level(5)
        .tickers(vec!["spy".to_owned(), "aapl".to_owned()])
        .reconnect(reconnect)
        .reconnection_attempts(reconnection_attempts)
        .build()
        .unwrap()
}

/// In-memory feed: every transport the client opens shows up here as a [`ServerSide`].
pub struct MockFeed {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<ServerSide>,
}

struct Shared {
    connects: AtomicUsize,
    refuse: AtomicBool,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

#[derive(Clone)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

#[must_use]
pub fn mock_feed() -> (MockConnector, MockFeed) {
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        connects: AtomicUsize::new(0),
        refuse: AtomicBool::new(false),
        accepted: accepted_tx,
    });

    (
        MockConnector {
            shared: Arc::clone(&shared),
        },
        MockFeed { shared, accepted },
    )
}

impl MockFeed {
    /// Next transport opened by the client.
    pub async fn accept(&mut self) -> ServerSide {
        timeout(WAIT, self.accepted.recv()).await.unwrap().unwrap()
    }

    /// Number of transports the client tried to open, refused ones included.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(WsError::Transport("connection refused".to_owned()).into());
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        _ = self.shared.accepted.send(ServerSide {
            to_client: Some(to_client),
            from_client,
        });

        Ok(Box::new(ChannelTransport { incoming, outgoing }))
    }
}

/// Client half of an in-memory connection.
struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.outgoing
            .send(text)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        match self.incoming.recv().await {
            Some(text) => TransportEvent::Text(text),
            None => TransportEvent::Closed,
        }
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// Server half of an in-memory connection.
pub struct ServerSide {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    /// Next frame sent by the client.
    pub async fn recv(&mut self) -> String {
        timeout(WAIT, self.from_client.recv())
            .await
            .unwrap()
            .unwrap()
    }

    pub fn send(&self, frame: &Value) {
        if let Some(tx) = &self.to_client {
            _ = tx.send(frame.to_string());
        }
    }

    /// Acknowledge the subscribe request.
    pub fn ack(&self) {
        self.send(&json!({
            "messageType": "I",
            "response": {"code": 200, "message": "Success"},
            "data": {"subscriptionId": 61},
        }));
    }

    pub fn heartbeat(&self) {
        self.send(&json!({
            "messageType": "H",
            "response": {"code": 200, "message": "HeartBeat"},
        }));
    }

    pub fn data(&self, data: &Value) {
        self.send(&json!({
            "messageType": "A",
            "service": "iex",
            "data": data,
        }));
    }

    /// Hang up; the client observes a closed transport.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Wait until the client has dropped its half of the connection.
    pub async fn closed(&mut self) {
        timeout(WAIT, async {
            while self.from_client.recv().await.is_some() {}
        })
        .await
        .unwrap();
    }
}

/// Receive the subscribe frame and acknowledge it.
pub async fn accept_and_ack(feed: &mut MockFeed) -> ServerSide {
    let mut server = feed.accept().await;
    server.recv().await;
    server.ack();
    server
}

/// Run `connect()` in the background so the test can play the server side.
#[must_use]
pub fn spawn_connect(client: &Client) -> JoinHandle<Result<()>> {
    let client = client.clone();
    tokio::spawn(async move { client.connect().await })
}

/// Connect `client` against `feed` and return the live server side.
pub async fn connected(client: &Client, feed: &mut MockFeed) -> ServerSide {
    let connecting = spawn_connect(client);
    let server = accept_and_ack(feed).await;
    connecting.await.unwrap().unwrap();
    server
}

pub async fn wait_for_state<F>(client: &Client, mut predicate: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    let mut rx = client.state_receiver();
    let state = timeout(WAIT, rx.wait_for(|state| predicate(state)))
        .await
        .unwrap()
        .unwrap()
        .clone();
    state
}

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

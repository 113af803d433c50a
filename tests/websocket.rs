#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tiingo_stream_sdk::Result;
use tiingo_stream_sdk::stream::{Client, ConnectionState, StreamConfig, Tick, TickOptions};
use tiingo_stream_sdk::ws::{Connector, Transport, TungsteniteTransport};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Drops every open connection with a close frame
    disconnect_tx: broadcast::Sender<()>,
    /// Receives subscribe requests from clients
    subscription_rx: mpsc::UnboundedReceiver<String>,
    /// Notified whenever a connection ends
    closed_rx: mpsc::UnboundedReceiver<()>,
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (disconnect_tx, _) = broadcast::channel::<()>(4);
        let (subscription_tx, subscription_rx) = mpsc::unbounded_channel::<String>();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel::<()>();
        let connections = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let disconnect = disconnect_tx.clone();
        let accepted = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accepted.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let sub_tx = subscription_tx.clone();
                let closed_tx = closed_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut disconnect_rx = disconnect.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(sub_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            _ = disconnect_rx.recv() => {
                                drop(write.send(Message::Close(None)).await);
                                break;
                            }
                        }
                    }
                    drop(closed_tx.send(()));
                });
            }
        });

        Self {
            addr,
            message_tx,
            disconnect_tx,
            subscription_rx,
            closed_rx,
            connections,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a message to all connected clients.
    fn send(&self, message: &Value) {
        drop(self.message_tx.send(message.to_string()));
    }

    fn ack(&self) {
        self.send(&json!({
            "messageType": "I",
            "response": {"code": 200, "message": "Success"},
            "data": {"subscriptionId": 7},
        }));
    }

    fn disconnect_all(&self) {
        drop(self.disconnect_tx.send(()));
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Receive the next subscribe request.
    async fn recv_subscription(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.subscription_rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn recv_closed(&mut self) -> Option<()> {
        timeout(Duration::from_secs(2), self.closed_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Routes the client's feed address to the local mock server.
struct LocalConnector {
    url: String,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        let transport = TungsteniteTransport::connect(&self.url).await?;
        Ok(Box::new(transport))
    }
}

fn client_for(server: &MockWsServer) -> Client {
    let config = StreamConfig::builder()
        .endpoint("crypto")
        .token("ws-token")
        .threshold_level(2)
        .tickers(vec!["btcusd".to_owned()])
        .build()
        .unwrap();

    Client::with_connector(
        config,
        LocalConnector {
            url: server.ws_url("/crypto"),
        },
    )
}

async fn connect(client: &Client, server: &mut MockWsServer) {
    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };

    let request = server.recv_subscription().await.unwrap();
    let request: Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["eventName"], "subscribe");
    assert_eq!(request["authorization"], "ws-token");
    assert_eq!(request["eventData"]["tickers"], json!(["btcusd"]));

    server.ack();
    timeout(Duration::from_secs(2), connecting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

async fn wait_connected(client: &Client) {
    let mut state = client.state_receiver();
    timeout(
        Duration::from_secs(5),
        state.wait_for(ConnectionState::is_connected),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn subscribe_handshake_over_websocket() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);

    connect(&client, &mut server).await;

    assert!(client.is_connected());
    assert!(client.stream_id().is_some());
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn data_frames_arrive_as_ticks() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    connect(&client, &mut server).await;

    let mut ticks = Box::pin(client.ticks(TickOptions::default()));
    server.send(&json!({
        "messageType": "A",
        "service": "crypto_data",
        "data": ["T", "btcusd", "2019-07-05T15:49:15.157000+00:00", "bitstamp", 0.02, 11_123.18],
    }));

    let tick = timeout(Duration::from_secs(2), ticks.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        tick,
        Tick::Json(json!([
            "T",
            "btcusd",
            "2019-07-05T15:49:15.157000+00:00",
            "bitstamp",
            0.02,
            11_123.18
        ]))
    );
}

#[tokio::test]
async fn server_disconnect_triggers_reconnect() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    connect(&client, &mut server).await;
    let first_id = client.stream_id().unwrap();

    let mut ticks = Box::pin(client.ticks(TickOptions::default()));

    server.disconnect_all();
    server.recv_closed().await.unwrap();

    // The supervisor reconnects on its own and resubscribes
    let request = server.recv_subscription().await.unwrap();
    assert!(request.contains("\"eventName\":\"subscribe\""));
    server.ack();
    wait_connected(&client).await;

    assert_eq!(server.connections(), 2);
    assert_ne!(client.stream_id().unwrap(), first_id);

    server.send(&json!({"messageType": "A", "data": [42]}));
    let tick = timeout(Duration::from_secs(2), ticks.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(tick, Tick::Json(json!([42])));
}

#[tokio::test]
async fn close_ends_server_connection() {
    let mut server = MockWsServer::start().await;
    let client = client_for(&server);
    connect(&client, &mut server).await;

    client.close().await;

    server.recv_closed().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.connections(), 1);
}

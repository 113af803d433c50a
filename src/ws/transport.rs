#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types expose their domain in the name for clarity"
)]

//! The socket seam the stream supervisor drives.
//!
//! A [`Connector`] opens a [`Transport`]; a transport reports its lifecycle as
//! [`TransportEvent`]s and accepts outbound text frames. The default
//! implementation runs over `tokio-tungstenite`, but anything that can move
//! text frames (an in-process channel pair in tests, a proxy tunnel) plugs in.

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle event observed on an open transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame arrived
    Text(String),
    /// The peer closed the connection, or the socket went away
    Closed,
    /// The socket failed; the transport is unusable afterwards
    Error(crate::error::Error),
}

/// An open, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next lifecycle event.
    ///
    /// Must be cancel-safe: the supervisor polls it inside `select!`.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection. Errors are swallowed; the transport is dropped afterwards.
    async fn close(&mut self);
}

/// Opens transports to a feed endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let transport = TungsteniteTransport::connect(url).await?;
        Ok(Box::new(transport))
    }
}

/// [`Transport`] over a `tokio-tungstenite` WebSocket stream.
pub struct TungsteniteTransport {
    stream: WsStream,
}

impl TungsteniteTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;

        #[cfg(feature = "tracing")]
        tracing::trace!(%url, "WebSocket opened");

        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | None => return TransportEvent::Closed,
                Some(Err(e)) => return TransportEvent::Error(e.into()),
                Some(Ok(_)) => {
                    // Ignore binary frames; tungstenite answers PINGs on its own.
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            #[cfg(feature = "tracing")]
            tracing::trace!(error = %e, "WebSocket close failed");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}

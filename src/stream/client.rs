use std::sync::Arc;

use futures::Stream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::Result;
use crate::error::Error;
use crate::stream::config::StreamConfig;
use crate::stream::dispatcher::{Notification, Tick, TickDispatcher, TickOptions, TickRegistration};
use crate::stream::status::{ConnectionState, TerminalReason};
use crate::stream::supervisor::{Command, Supervisor};
use crate::ws::{Connector, TungsteniteConnector};

/// Broadcast channel capacity for the notification bus.
const BROADCAST_CAPACITY: usize = 1024;

/// Handle to one resilient feed subscription.
///
/// Cloning is cheap; every clone talks to the same background task. The task
/// stops once the last clone is dropped.
///
/// # Examples
///
/// ```rust, no_run
/// use tiingo_stream_sdk::stream::{Client, StreamConfig, TickOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = StreamConfig::builder()
///         .endpoint("iex")
///         .token(std::env::var("TIINGO_API_TOKEN")?)
///         .threshold_level(5)
///         .tickers(vec!["spy".to_owned()])
///         .build()?;
///
///     let client = Client::new(config);
///     client.connect().await?;
///
///     let _registration = client.get_ticks(TickOptions::default(), |tick| {
///         println!("{tick:?}");
///     });
///
///     if let Some(reason) = client.wait_terminal().await {
///         eprintln!("stream failed: {reason:?}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<StreamConfig>,
    /// Command channel into the supervisor task
    commands: mpsc::UnboundedSender<Command>,
    /// Notification bus, kept to subscribe new consumers
    bus: broadcast::Sender<Notification>,
    state: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Create a client over the default WebSocket transport.
    ///
    /// No connection is opened until [`Client::connect`] is called. Must be
    /// called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }

    /// Create a client that opens its transports through `connector`.
    #[must_use]
    pub fn with_connector<C: Connector>(config: StreamConfig, connector: C) -> Self {
        let config = Arc::new(config);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (bus, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let supervisor = Supervisor::new(
            Arc::clone(&config),
            Arc::new(connector),
            bus.clone(),
            state_tx,
        );
        tokio::spawn(supervisor.run(commands_rx));

        Self {
            inner: Arc::new(ClientInner {
                config,
                commands,
                bus,
                state,
            }),
        }
    }

    /// Open the stream and complete the subscribe handshake.
    ///
    /// Returns immediately when already connected. Concurrent callers share one
    /// attempt and all observe its outcome, including a reconnection that is
    /// already under way.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Connect(tx))
            .map_err(|_e| Error::closed())?;
        rx.await.map_err(|_e| Error::closed())?
    }

    /// Deliver every data frame to `callback`, across reconnects.
    pub fn get_ticks<F>(&self, options: TickOptions, callback: F) -> TickRegistration
    where
        F: FnMut(Tick) + Send + 'static,
    {
        let (rx, dispatcher) = self.dispatcher(options);
        dispatcher.spawn_callback(rx, callback)
    }

    /// Deliver every data frame as a stream, across reconnects.
    ///
    /// The stream ends when the client's background task stops.
    pub fn ticks(&self, options: TickOptions) -> impl Stream<Item = Result<Tick>> + use<> {
        let (rx, dispatcher) = self.dispatcher(options);
        dispatcher.into_stream(rx)
    }

    /// Subscribe first, then read the state, so no attach can fall in between.
    fn dispatcher(
        &self,
        options: TickOptions,
    ) -> (broadcast::Receiver<Notification>, TickDispatcher) {
        let rx = self.inner.bus.subscribe();
        let live = match &*self.inner.state.borrow() {
            ConnectionState::Connected {
                generation,
                stream_id,
                ..
            } => Some((*generation, Arc::clone(stream_id))),
            _ => None,
        };
        (rx, TickDispatcher::new(options, live))
    }

    /// Close the stream for good.
    ///
    /// Pending timers are cancelled and the transport is closed; later calls to
    /// [`Client::connect`] fail with [`crate::error::Kind::Closed`].
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Close(tx)).is_ok() {
            _ = rx.await;
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Identifier of the live connection; `None` while not connected.
    #[must_use]
    pub fn stream_id(&self) -> Option<Arc<str>> {
        self.inner.state.borrow().stream_id().cloned()
    }

    /// Wait until the stream is closed or has failed permanently.
    ///
    /// Returns the failure reason, or `None` after an explicit [`Client::close`].
    pub async fn wait_terminal(&self) -> Option<TerminalReason> {
        let mut state = self.inner.state.clone();
        let terminal = state.wait_for(ConnectionState::is_terminal).await.ok()?;
        match &*terminal {
            ConnectionState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }
}

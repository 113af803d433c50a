//! The task that owns a stream's socket and drives every state transition.
//!
//! Caller commands, transport events and timer expiries are all funnelled into
//! one `select!` loop and handled one at a time, so the session, the transport
//! and the retry budget never need a lock. Work that outlives the connection it
//! was started for (health checks, handshake deadlines, retry delays) carries a
//! generation or attempt tag and is dropped on mismatch.

use std::future::pending;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::Result;
use crate::session_event;
use crate::stream::config::StreamConfig;
use crate::stream::dispatcher::Notification;
use crate::stream::handshake::{self, Failure, Step};
use crate::stream::heartbeat::{HealthCheck, HeartbeatMonitor, Verdict};
use crate::stream::reconnect::RetryBudget;
use crate::stream::session::Session;
use crate::stream::status::{ConnectionState, TerminalReason};
use crate::stream::types::response::InboundFrame;
use crate::ws::timer::{Scheduled, Timers};
use crate::ws::{Connector, Transport, TransportEvent};

/// Requests from [`crate::stream::Client`] handles.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
}

/// Timer payloads delivered back into the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    HealthCheck(HealthCheck),
    HandshakeTimeout { attempt: u64 },
    Retry { attempt: u64 },
}

impl From<HealthCheck> for TimerEvent {
    fn from(check: HealthCheck) -> Self {
        Self::HealthCheck(check)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// Requested by a caller
    Connect,
    /// Started after an unexpected disconnect
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Handshaking(Purpose),
    Connected,
    AwaitingRetry,
    Closed,
    Failed(TerminalReason),
}

type Opening = BoxFuture<'static, Result<Box<dyn Transport>>>;

pub(crate) struct Supervisor {
    config: Arc<StreamConfig>,
    connector: Arc<dyn Connector>,
    session: Session,
    budget: RetryBudget,
    heartbeat: HeartbeatMonitor<TimerEvent>,
    timers: Timers<TimerEvent>,
    phase: Phase,
    /// Transport being opened for the current attempt
    opening: Option<Opening>,
    transport: Option<Box<dyn Transport>>,
    handshake_deadline: Option<Scheduled>,
    retry: Option<Scheduled>,
    /// Tags handshake deadlines and retry timers
    attempt: u64,
    /// Callers waiting on the outstanding attempt
    waiters: Vec<oneshot::Sender<Result<()>>>,
    bus: broadcast::Sender<Notification>,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    pub(crate) fn new(
        config: Arc<StreamConfig>,
        connector: Arc<dyn Connector>,
        bus: broadcast::Sender<Notification>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let timers = Timers::new();
        let heartbeat = HeartbeatMonitor::new(config.heartbeat().clone(), timers.scheduler());

        Self {
            budget: RetryBudget::new(config.reconnect()),
            config,
            connector,
            session: Session::new(),
            heartbeat,
            timers,
            phase: Phase::Idle,
            opening: None,
            transport: None,
            handshake_deadline: None,
            retry: None,
            attempt: 0,
            waiters: Vec::new(),
            bus,
            state,
        }
    }

    /// Process events until every command sender is gone.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect(reply)) => self.on_connect(reply),
                    Some(Command::Close(reply)) => {
                        self.on_close().await;
                        _ = reply.send(());
                    }
                    None => break,
                },
                opened = opening(&mut self.opening) => {
                    self.opening = None;
                    self.on_opened(opened).await;
                }
                event = next_event(&mut self.transport) => self.on_transport_event(event).await,
                Some(event) = self.timers.recv() => self.on_timer(event).await,
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("All stream handles dropped, shutting down supervisor");

        self.retire().await;
    }

    fn on_connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        match &self.phase {
            Phase::Closed => {
                _ = reply.send(Err(Failure::Closed.to_error()));
            }
            Phase::Failed(reason) => {
                _ = reply.send(Err(reason.to_error()));
            }
            Phase::Connected => {
                _ = reply.send(Ok(()));
            }
            Phase::Handshaking(_) | Phase::AwaitingRetry => self.waiters.push(reply),
            Phase::Idle => {
                self.waiters.push(reply);
                self.start_attempt(Purpose::Connect);
            }
        }
    }

    fn start_attempt(&mut self, purpose: Purpose) {
        if !self.session.begin_attempt() {
            return;
        }
        self.attempt = self.attempt.wrapping_add(1);
        self.phase = Phase::Handshaking(purpose);
        self.publish(match purpose {
            Purpose::Connect => ConnectionState::Connecting,
            Purpose::Reconnect => ConnectionState::Reconnecting {
                attempt: self.budget.used(),
                remaining: self.budget.remaining(),
            },
        });

        let url = self.config.endpoint().url();
        session_event!(
            self.config.verbose(),
            attempt = self.attempt,
            %url,
            ?purpose,
            "Opening stream transport"
        );

        let connector = Arc::clone(&self.connector);
        self.opening = Some(async move { connector.connect(url).await }.boxed());
        self.handshake_deadline = Some(self.timers.schedule(
            self.config.handshake_timeout(),
            TimerEvent::HandshakeTimeout {
                attempt: self.attempt,
            },
        ));
    }

    async fn on_opened(&mut self, opened: Result<Box<dyn Transport>>) {
        let mut transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                self.attempt_failed(Failure::Transport(e.to_string())).await;
                return;
            }
        };

        let sent = match handshake::subscribe_frame(&self.config) {
            Ok(frame) => transport.send(frame).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                self.transport = Some(transport);
            }
            Err(e) => {
                transport.close().await;
                self.attempt_failed(Failure::Transport(e.to_string())).await;
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.on_text(&text).await,
            TransportEvent::Closed => self.on_transport_lost("closed by peer".to_owned()).await,
            TransportEvent::Error(e) => self.on_transport_lost(e.to_string()).await,
        }
    }

    async fn on_transport_lost(&mut self, reason: String) {
        match self.phase {
            Phase::Handshaking(_) => self.attempt_failed(Failure::Transport(reason)).await,
            Phase::Connected => self.connection_lost(&reason).await,
            _ => {
                self.transport = None;
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Failed to parse stream frame");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        match self.phase {
            Phase::Handshaking(purpose) => match handshake::on_frame(&frame) {
                Step::Pending => {}
                Step::Accepted => self.attempt_succeeded(purpose),
                Step::Failed(failure) => self.attempt_failed(failure).await,
            },
            Phase::Connected => self.on_live_frame(frame).await,
            _ => {}
        }
    }

    async fn on_live_frame(&mut self, frame: InboundFrame) {
        let generation = self.session.generation();
        match frame {
            InboundFrame::Data { data } => {
                _ = self.bus.send(Notification::Data {
                    generation,
                    data: Arc::new(data),
                });
            }
            InboundFrame::Heartbeat => {
                if self.heartbeat.on_heartbeat(&mut self.session, generation) {
                    session_event!(
                        self.config.verbose(),
                        %generation,
                        count = self.session.heartbeats(),
                        "Heartbeat received"
                    );
                }
            }
            InboundFrame::Error { status } => {
                self.terminal(TerminalReason::ProtocolFatal {
                    message: status.message,
                })
                .await;
            }
            InboundFrame::Info { .. } | InboundFrame::Unknown { .. } => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?frame, "Ignoring frame on live connection");
            }
        }
    }

    fn attempt_succeeded(&mut self, purpose: Purpose) {
        self.handshake_deadline = None;
        self.retry = None;

        let (generation, stream_id) = self.session.establish();
        self.heartbeat.arm(generation);
        self.budget.restore();
        self.phase = Phase::Connected;

        self.publish(ConnectionState::Connected {
            since: self.session.connected_at().unwrap_or_else(Utc::now),
            stream_id: Arc::clone(&stream_id),
            generation,
        });
        session_event!(
            self.config.verbose(),
            %generation,
            stream_id = %stream_id,
            ?purpose,
            "Stream subscribed"
        );

        _ = self.bus.send(match purpose {
            Purpose::Connect => Notification::Connected {
                generation,
                stream_id,
            },
            Purpose::Reconnect => Notification::ReconnectSucceeded {
                generation,
                stream_id,
            },
        });

        for waiter in self.waiters.drain(..) {
            _ = waiter.send(Ok(()));
        }
    }

    async fn attempt_failed(&mut self, failure: Failure) {
        let Phase::Handshaking(purpose) = self.phase else {
            return;
        };

        self.handshake_deadline = None;
        self.opening = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.session.abandon_attempt();

        #[cfg(feature = "tracing")]
        tracing::warn!(?failure, ?purpose, "Connection attempt failed");

        if let Failure::Fatal { message } = &failure {
            self.terminal(TerminalReason::ProtocolFatal {
                message: message.clone(),
            })
            .await;
            return;
        }

        if purpose == Purpose::Reconnect && self.budget.remaining() == 0 {
            self.terminal(TerminalReason::RetriesExhausted {
                attempts: self.budget.max(),
            })
            .await;
            return;
        }

        match purpose {
            Purpose::Reconnect => {
                let delay = self.budget.next_delay();
                session_event!(
                    self.config.verbose(),
                    ?delay,
                    remaining = self.budget.remaining(),
                    "Scheduling next reconnection attempt"
                );
                self.retry = Some(self.timers.schedule(
                    delay,
                    TimerEvent::Retry {
                        attempt: self.attempt,
                    },
                ));
                self.phase = Phase::AwaitingRetry;
            }
            Purpose::Connect => {
                self.phase = Phase::Idle;
                self.publish(ConnectionState::Disconnected);
            }
        }

        for waiter in self.waiters.drain(..) {
            _ = waiter.send(Err(failure.to_error()));
        }
    }

    /// The live connection went away without being asked to.
    async fn connection_lost(&mut self, reason: &str) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(%reason, stream_id = ?self.session.stream_id(), "Stream connection lost");
        #[cfg(not(feature = "tracing"))]
        let _: (&str, Option<&Arc<str>>) = (reason, self.session.stream_id());

        self.session.teardown();
        self.heartbeat.disarm();

        if self.config.reconnect().enabled {
            self.session.clear_heartbeat();
            self.reconnect_attempt().await;
        } else {
            self.phase = Phase::Idle;
            self.publish(ConnectionState::Disconnected);
        }
    }

    async fn reconnect_attempt(&mut self) {
        self.retry = None;
        if !self.budget.take() {
            self.terminal(TerminalReason::RetriesExhausted {
                attempts: self.budget.max(),
            })
            .await;
            return;
        }

        session_event!(
            self.config.verbose(),
            attempt = self.budget.used(),
            remaining = self.budget.remaining(),
            "Reconnecting"
        );
        _ = self.bus.send(Notification::ReconnectStarted);
        self.start_attempt(Purpose::Reconnect);
    }

    async fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::HealthCheck(check) => {
                match self.heartbeat.on_check(&self.session, check) {
                    Verdict::Stale => {}
                    Verdict::Alive => {
                        session_event!(
                            self.config.verbose(),
                            generation = %check.generation,
                            "Heartbeat check passed"
                        );
                    }
                    Verdict::Dead => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            generation = %check.generation,
                            "No heartbeat within the check window, forcing the connection closed"
                        );
                        self.connection_lost("heartbeat timeout").await;
                    }
                }
            }
            TimerEvent::HandshakeTimeout { attempt }
                if attempt == self.attempt && matches!(self.phase, Phase::Handshaking(_)) =>
            {
                self.attempt_failed(Failure::Timeout).await;
            }
            TimerEvent::Retry { attempt }
                if attempt == self.attempt && self.phase == Phase::AwaitingRetry =>
            {
                self.reconnect_attempt().await;
            }
            TimerEvent::HandshakeTimeout { .. } | TimerEvent::Retry { .. } => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?event, "Dropping stale timer");
            }
        }
    }

    async fn on_close(&mut self) {
        if matches!(self.phase, Phase::Closed | Phase::Failed(_)) {
            return;
        }

        self.retire().await;
        self.phase = Phase::Closed;
        self.publish(ConnectionState::Closed);
        for waiter in self.waiters.drain(..) {
            _ = waiter.send(Err(Failure::Closed.to_error()));
        }
        session_event!(self.config.verbose(), "Stream closed");
    }

    async fn terminal(&mut self, reason: TerminalReason) {
        self.retire().await;

        #[cfg(feature = "tracing")]
        tracing::error!(?reason, "Stream failed permanently");

        self.phase = Phase::Failed(reason.clone());
        self.publish(ConnectionState::Failed(reason.clone()));
        for waiter in self.waiters.drain(..) {
            _ = waiter.send(Err(reason.to_error()));
        }
    }

    /// Cancel all pending work and drop the transport.
    async fn retire(&mut self) {
        self.opening = None;
        self.handshake_deadline = None;
        self.retry = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.heartbeat.disarm();
        self.session.abandon_attempt();
        if self.session.is_connected() {
            self.session.teardown();
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

async fn opening(opening: &mut Option<Opening>) -> Result<Box<dyn Transport>> {
    match opening {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_event(transport: &mut Option<Box<dyn Transport>>) -> TransportEvent {
    match transport {
        Some(transport) => transport.next_event().await,
        None => pending().await,
    }
}

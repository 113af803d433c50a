//! Delivery of data frames to consumers across reconnects.
//!
//! The supervisor publishes [`Notification`]s on an internal broadcast bus. Each
//! registered consumer runs its own [`TickDispatcher`], which attaches to the
//! generation of the live connection, detaches when a reconnection attempt
//! starts and re-attaches to the replacement once it is subscribed. Frames from
//! any other generation are dropped, so a consumer sees one continuous stream
//! without ever re-registering.

use std::sync::Arc;

use async_stream::stream;
use bon::Builder;
use futures::Stream;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::stream::session::Generation;
use crate::ws::WsError;

/// Events on the internal notification bus.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    /// A caller-initiated connect completed its handshake
    Connected {
        generation: Generation,
        stream_id: Arc<str>,
    },
    /// The supervisor is tearing down the old connection to try a new one
    ReconnectStarted,
    /// A reconnection attempt completed its handshake
    ReconnectSucceeded {
        generation: Generation,
        stream_id: Arc<str>,
    },
    /// A data frame received on `generation`
    Data {
        generation: Generation,
        data: Arc<Value>,
    },
}

/// How ticks are handed to a consumer.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct TickOptions {
    /// Deliver parsed JSON ([`Tick::Json`]) instead of serialized text ([`Tick::Text`])
    #[builder(default = true)]
    pub json: bool,
    /// Append the current stream id to every payload
    #[builder(default)]
    pub attach_session_id: bool,
}

impl Default for TickOptions {
    fn default() -> Self {
        Self {
            json: true,
            attach_session_id: false,
        }
    }
}

/// One data frame as delivered to a consumer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Json(Value),
    Text(String),
}

impl Tick {
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Handle to a consumer registered with [`crate::stream::Client::get_ticks`].
///
/// Delivery stops when the handle is dropped or [`TickRegistration::cancel`] is called.
#[derive(Debug)]
#[must_use = "dropping the registration stops delivery"]
pub struct TickRegistration {
    token: CancellationToken,
}

impl TickRegistration {
    /// Stop delivering ticks to this consumer.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TickRegistration {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone)]
struct Attachment {
    generation: Generation,
    stream_id: Arc<str>,
}

/// Per-consumer attach/detach state machine.
#[derive(Debug)]
pub(crate) struct TickDispatcher {
    options: TickOptions,
    attached: Option<Attachment>,
}

impl TickDispatcher {
    /// `live` is the connection active at registration time, if any.
    pub(crate) fn new(options: TickOptions, live: Option<(Generation, Arc<str>)>) -> Self {
        Self {
            options,
            attached: live.map(|(generation, stream_id)| Attachment {
                generation,
                stream_id,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Apply one bus event; returns the tick to deliver, if any.
    pub(crate) fn handle(&mut self, notification: &Notification) -> Option<Result<Tick>> {
        match notification {
            Notification::Connected {
                generation,
                stream_id,
            }
            | Notification::ReconnectSucceeded {
                generation,
                stream_id,
            } => {
                self.attached = Some(Attachment {
                    generation: *generation,
                    stream_id: Arc::clone(stream_id),
                });
                None
            }
            Notification::ReconnectStarted => {
                self.attached = None;
                None
            }
            Notification::Data { generation, data } => {
                let attachment = self.attached.as_ref()?;
                if attachment.generation != *generation {
                    return None;
                }
                Some(render(data, &attachment.stream_id, self.options))
            }
        }
    }

    /// Drive `callback` from the bus until the returned registration is cancelled
    /// or the bus closes.
    pub(crate) fn spawn_callback<F>(
        mut self,
        mut rx: broadcast::Receiver<Notification>,
        mut callback: F,
    ) -> TickRegistration
    where
        F: FnMut(Tick) + Send + 'static,
    {
        let token = CancellationToken::new();
        let registration = TickRegistration {
            token: token.clone(),
        };

        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    biased;

                    () = token.cancelled() => break,
                    received = rx.recv() => received,
                };

                match notification {
                    Ok(notification) => match self.handle(&notification) {
                        Some(Ok(tick)) => callback(tick),
                        Some(Err(e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(error = %e, "Unable to render tick");
                            #[cfg(not(feature = "tracing"))]
                            let _: &crate::error::Error = &e;
                        }
                        None => {}
                    },
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Tick consumer lagged, missed {n} notifications");
                        #[cfg(not(feature = "tracing"))]
                        let _: u64 = n;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        registration
    }

    /// Same delivery as [`TickDispatcher::spawn_callback`], as a stream.
    ///
    /// Falling behind the bus yields a [`WsError::Lagged`] item; the stream keeps going.
    pub(crate) fn into_stream(
        mut self,
        mut rx: broadcast::Receiver<Notification>,
    ) -> impl Stream<Item = Result<Tick>> {
        stream! {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        if let Some(tick) = self.handle(&notification) {
                            yield tick;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Tick stream lagged, missed {n} notifications");
                        yield Err(WsError::Lagged { count: n }.into());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Shape a data payload according to `options`.
///
/// Array payloads get the stream id appended; any other payload is wrapped as
/// `[payload, stream_id]`. Text output of a string payload is the string itself.
pub(crate) fn render(data: &Value, stream_id: &str, options: TickOptions) -> Result<Tick> {
    let mut payload = data.clone();
    if options.attach_session_id {
        let id = Value::String(stream_id.to_owned());
        match &mut payload {
            Value::Array(items) => items.push(id),
            other => *other = Value::Array(vec![other.take(), id]),
        }
    }

    if options.json {
        return Ok(Tick::Json(payload));
    }
    match payload {
        Value::String(text) => Ok(Tick::Text(text)),
        other => Ok(Tick::Text(serde_json::to_string(&other)?)),
    }
}

//! Core WebSocket infrastructure.
//!
//! This module holds the pieces of the stream client that know nothing about
//! the feed's message vocabulary.
//!
//! # Architecture
//!
//! - [`Connector`] / [`Transport`]: the socket seam, with a `tokio-tungstenite` default
//! - [`config`]: heartbeat and reconnection tuning
//! - `timer`: generation-tagged one-shot timers driving the supervisor task

pub mod config;
pub mod error;
pub(crate) mod timer;
pub mod transport;

#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use transport::{Connector, Transport, TransportEvent, TungsteniteConnector, TungsteniteTransport};

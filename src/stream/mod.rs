//! Resilient subscription to a real-time feed.
//!
//! A [`Client`] keeps one logical subscription alive over a succession of
//! WebSocket connections: it performs the subscribe handshake, watches the
//! feed's heartbeats, reconnects within a bounded budget when the link drops
//! or goes silent, and keeps delivering data frames to registered consumers
//! across those reconnects.
//!
//! # Architecture
//!
//! - [`client`]: the cloneable public handle
//! - `supervisor`: the single task that owns the socket and all state
//! - `handshake`, `heartbeat`, `reconnect`: the supervisor's building blocks
//! - [`dispatcher`]: per-consumer delivery over the internal notification bus

pub mod client;
pub mod config;
pub mod dispatcher;
pub(crate) mod handshake;
pub(crate) mod heartbeat;
pub(crate) mod reconnect;
pub mod session;
pub mod status;
pub(crate) mod supervisor;
pub mod types;

pub use client::Client;
pub use config::{DataFormat, StreamConfig};
pub use dispatcher::{Tick, TickOptions, TickRegistration};
pub use session::Generation;
pub use status::{ConnectionState, TerminalReason};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::stream::session::Generation;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect()` may be called
    Disconnected,
    /// First handshake in progress
    Connecting,
    /// Subscribed and receiving frames
    Connected {
        /// When the handshake completed
        since: DateTime<Utc>,
        /// Identifier minted for this connection
        stream_id: Arc<str>,
        generation: Generation,
    },
    /// Recovering from an unexpected disconnect
    Reconnecting {
        /// Attempts spent during this outage
        attempt: u32,
        /// Attempts left before giving up
        remaining: u32,
    },
    /// Closed by its owner
    Closed,
    /// Given up; the stream will not recover
    Failed(TerminalReason),
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Closed or failed: no further transitions will happen.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    #[must_use]
    pub fn stream_id(&self) -> Option<&Arc<str>> {
        match self {
            Self::Connected { stream_id, .. } => Some(stream_id),
            _ => None,
        }
    }
}

/// Why a stream was abandoned.
///
/// Nothing in this crate exits the process; the owner observes this through
/// [`crate::stream::Client::wait_terminal`] and decides.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// The feed sent an error frame
    ProtocolFatal { message: String },
    /// Every reconnection attempt of the budget failed
    RetriesExhausted { attempts: u32 },
}

impl TerminalReason {
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self {
            Self::ProtocolFatal { message } => Error::fatal(message.clone()),
            Self::RetriesExhausted { attempts } => Error::exhausted(*attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn connected_exposes_stream_id() {
        let state = ConnectionState::Connected {
            since: Utc::now(),
            stream_id: Arc::from("abc"),
            generation: Generation::default(),
        };

        assert!(state.is_connected());
        assert!(!state.is_terminal());
        assert_eq!(state.stream_id().map(|id| &**id), Some("abc"));
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Closed.is_terminal());
        let failed = ConnectionState::Failed(TerminalReason::RetriesExhausted { attempts: 1 });
        assert!(failed.is_terminal());
        assert!(!ConnectionState::Reconnecting { attempt: 1, remaining: 2 }.is_terminal());
    }

    #[test]
    fn reasons_map_to_error_kinds() {
        let fatal = TerminalReason::ProtocolFatal {
            message: "bad".to_owned(),
        };
        assert_eq!(fatal.to_error().kind(), Kind::Fatal);
        assert_eq!(
            TerminalReason::RetriesExhausted { attempts: 4 }
                .to_error()
                .kind(),
            Kind::Exhausted
        );
    }
}

//! The open → subscribe → acknowledge exchange that establishes a session.
//!
//! The supervisor owns the socket; this module only decides what to send and
//! what the first meaningful reply means.

use crate::Result;
use crate::error::Error;
use crate::stream::config::StreamConfig;
use crate::stream::types::request::SubscribeRequest;
use crate::stream::types::response::InboundFrame;
use crate::ws::WsError;

/// Why a connection attempt failed.
///
/// Every caller waiting on the attempt receives its own [`Error`] built from
/// the same `Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    /// Info frame with a non-success status
    Rejected { code: i64, message: String },
    /// Error frame; the stream cannot continue
    Fatal { message: String },
    /// The transport could not be opened or died mid-handshake
    Transport(String),
    /// No acknowledgement within the handshake timeout
    Timeout,
    /// The stream was closed while the attempt was outstanding
    Closed,
}

impl Failure {
    pub(crate) fn to_error(&self) -> Error {
        match self {
            Self::Rejected { code, message } => Error::rejected(*code, message.clone()),
            Self::Fatal { message } => Error::fatal(message.clone()),
            Self::Transport(reason) => WsError::Transport(reason.clone()).into(),
            Self::Timeout => WsError::Timeout.into(),
            Self::Closed => Error::closed(),
        }
    }
}

/// Outcome of feeding one frame to a pending handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Not an acknowledgement; keep waiting
    Pending,
    Accepted,
    Failed(Failure),
}

/// Serialized subscribe frame for `config`.
pub(crate) fn subscribe_frame(config: &StreamConfig) -> Result<String> {
    Ok(serde_json::to_string(&SubscribeRequest::new(config))?)
}

/// Interpret a frame received while the handshake is outstanding.
///
/// Only info and error frames settle the handshake; anything else is ignored.
pub(crate) fn on_frame(frame: &InboundFrame) -> Step {
    match frame {
        InboundFrame::Info { status, .. } if status.is_success() => Step::Accepted,
        InboundFrame::Info { status, .. } => Step::Failed(Failure::Rejected {
            code: status.code,
            message: status.message.clone(),
        }),
        InboundFrame::Error { status } => Step::Failed(Failure::Fatal {
            message: status.message.clone(),
        }),
        _ => Step::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Kind, Rejected};

    fn frame(text: &str) -> InboundFrame {
        InboundFrame::parse(text).unwrap()
    }

    #[test]
    fn success_status_is_accepted() {
        let step = on_frame(&frame(
            r#"{"messageType":"I","response":{"code":200,"message":"Success"}}"#,
        ));
        assert_eq!(step, Step::Accepted);
    }

    #[test]
    fn other_status_is_rejected() {
        let step = on_frame(&frame(
            r#"{"messageType":"I","response":{"code":401,"message":"Invalid token"}}"#,
        ));

        let Step::Failed(failure) = step else {
            panic!("expected failure");
        };
        let error = failure.to_error();
        assert_eq!(error.kind(), Kind::Rejected);
        assert_eq!(error.downcast_ref::<Rejected>().unwrap().code, 401);
    }

    #[test]
    fn error_frame_is_fatal() {
        let step = on_frame(&frame(
            r#"{"messageType":"E","response":{"code":400,"message":"authorization failed"}}"#,
        ));

        assert_eq!(
            step,
            Step::Failed(Failure::Fatal {
                message: "authorization failed".to_owned()
            })
        );
    }

    #[test]
    fn data_and_heartbeat_do_not_settle_handshake() {
        assert_eq!(
            on_frame(&frame(r#"{"messageType":"H","response":{"code":200}}"#)),
            Step::Pending
        );
        assert_eq!(
            on_frame(&frame(r#"{"messageType":"A","data":[1]}"#)),
            Step::Pending
        );
    }

    #[test]
    fn transport_failures_map_to_websocket_errors() {
        assert_eq!(Failure::Timeout.to_error().kind(), Kind::WebSocket);
        assert_eq!(
            Failure::Transport("reset".to_owned()).to_error().kind(),
            Kind::WebSocket
        );
        assert_eq!(Failure::Closed.to_error().kind(), Kind::Closed);
    }
}

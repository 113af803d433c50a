use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::ws::WsError;

/// Status code the feed uses for a successful subscribe acknowledgement.
pub const SUCCESS_CODE: i64 = 200;

/// `response` object carried by info, error and heartbeat frames.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl ResponseStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Wire shape shared by every inbound frame; split into [`InboundFrame`] by `messageType`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    message_type: String,
    #[serde(default)]
    response: Option<ResponseStatus>,
    #[serde(default)]
    data: Value,
}

/// A decoded frame received from the feed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `"I"`: subscribe acknowledgement (or refusal)
    Info {
        status: ResponseStatus,
        data: Value,
    },
    /// `"E"`: protocol error; the stream cannot continue
    Error { status: ResponseStatus },
    /// `"H"`: liveness beacon
    Heartbeat,
    /// `"A"`: market data
    Data { data: Value },
    /// Any other `messageType`; ignored
    Unknown { message_type: String },
}

impl InboundFrame {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let RawFrame {
            message_type,
            response,
            data,
        } = serde_json::from_str(text).map_err(WsError::MessageParse)?;
        let status = response.unwrap_or(ResponseStatus {
            code: 0,
            message: String::new(),
        });

        Ok(match message_type.as_str() {
            "I" => Self::Info { status, data },
            "E" => Self::Error { status },
            "H" => Self::Heartbeat,
            "A" => Self::Data { data },
            _ => Self::Unknown { message_type },
        })
    }
}

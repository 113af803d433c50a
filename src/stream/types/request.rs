use secrecy::ExposeSecret as _;
use serde::Serialize;

use crate::stream::config::{DataFormat, StreamConfig};

/// Subscribe request sent once per handshake.
///
/// # Security
///
/// When serialized, this struct exposes the API token (`authorization`) in plaintext.
/// Ensure it is only sent over secure WebSocket connections (`wss://`)
/// and never logged or exposed in error messages.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest<'a> {
    /// Always `"subscribe"`
    pub event_name: &'static str,
    pub authorization: &'a str,
    pub data_format: DataFormat,
    pub event_data: EventData<'a>,
}

/// Subscription parameters nested under `eventData`.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData<'a> {
    pub threshold_level: u32,
    pub tickers: &'a [String],
}

impl<'a> SubscribeRequest<'a> {
    #[must_use]
    pub fn new(config: &'a StreamConfig) -> Self {
        Self {
            event_name: "subscribe",
            authorization: config.token().expose_secret(),
            data_format: config.data_format(),
            event_data: EventData {
                threshold_level: config.threshold_level(),
                tickers: config.tickers(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_subscribe_frame() {
        let config = StreamConfig::builder()
            .endpoint("iex")
            .token("secret-token")
            .threshold_level(6)
            .tickers(vec!["spy".to_owned(), "uso".to_owned()])
            .data_format(DataFormat::Csv)
            .build()
            .unwrap();

        let value = serde_json::to_value(SubscribeRequest::new(&config)).unwrap();

        assert_eq!(
            value,
            json!({
                "eventName": "subscribe",
                "authorization": "secret-token",
                "dataFormat": "csv",
                "eventData": {
                    "thresholdLevel": 6,
                    "tickers": ["spy", "uso"]
                }
            })
        );
    }
}

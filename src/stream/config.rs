#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::str::FromStr;
use std::time::Duration;

use bon::bon;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ws::config::{HeartbeatConfig, ReconnectConfig};
use crate::{Endpoint, Result};

const DEFAULT_MINIMUM_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 100;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire format the feed uses for data frames.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::validation(
                "data_format",
                format!("{s} is not one of json, csv"),
            )),
        }
    }
}

/// Immutable, validated settings for one logical stream.
///
/// Built through [`StreamConfig::builder`]; `build()` checks every field and fails
/// with a [`crate::error::Kind::Validation`] error naming the first bad one, so no
/// socket is ever opened for a malformed configuration.
///
/// ```
/// use tiingo_stream_sdk::stream::StreamConfig;
///
/// let config = StreamConfig::builder()
///     .endpoint("iex")
///     .token("my-token")
///     .threshold_level(5)
///     .tickers(vec!["spy".to_owned(), "aapl".to_owned()])
///     .build()?;
/// assert!(config.reconnect().enabled);
/// # Ok::<_, tiingo_stream_sdk::error::Error>(())
/// ```
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct StreamConfig {
    endpoint: Endpoint,
    token: SecretString,
    threshold_level: u32,
    tickers: Vec<String>,
    verbose: bool,
    data_format: DataFormat,
    reconnect: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    handshake_timeout: Duration,
}

#[bon]
impl StreamConfig {
    #[builder]
    pub fn new(
        // Feed name (`iex`, `fx`, `crypto`) or its full `wss://` address
        #[builder(into)]
        endpoint: String,
        // API token sent with the subscribe request
        #[builder(into)]
        token: String,
        // Feed-specific sampling granularity
        threshold_level: u32,
        // Symbols to subscribe to; `"*"` subscribes to everything
        tickers: Vec<String>,
        // Promote lifecycle logging to `info`
        #[builder(default)]
        verbose: bool,
        #[builder(default)] data_format: DataFormat,
        // Reconnect after unexpected disconnects
        #[builder(default = true)]
        reconnect: bool,
        #[builder(default = DEFAULT_MINIMUM_RECONNECTION_DELAY)] minimum_reconnection_delay: Duration,
        // Attempts allowed per outage
        #[builder(default = DEFAULT_RECONNECTION_ATTEMPTS)]
        reconnection_attempts: u32,
        #[builder(default)] heartbeat: HeartbeatConfig,
        // Upper bound on open + subscribe + acknowledge
        #[builder(default = DEFAULT_HANDSHAKE_TIMEOUT)]
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.parse::<Endpoint>()?;

        if token.trim().is_empty() {
            return Err(Error::validation("token", "must not be empty"));
        }
        if tickers.is_empty() {
            return Err(Error::validation("tickers", "at least one ticker is required"));
        }
        if let Some(position) = tickers.iter().position(|t| t.trim().is_empty()) {
            return Err(Error::validation(
                "tickers",
                format!("entry {position} is empty"),
            ));
        }
        if heartbeat.interval.is_zero() {
            return Err(Error::validation("heartbeat", "interval must be positive"));
        }
        if heartbeat.jitter_permille.is_empty() {
            return Err(Error::validation("heartbeat", "jitter range is empty"));
        }
        if handshake_timeout.is_zero() {
            return Err(Error::validation(
                "handshake_timeout",
                "must be positive",
            ));
        }

        Ok(Self {
            endpoint,
            token: SecretString::from(token),
            threshold_level,
            tickers,
            verbose,
            data_format,
            reconnect: ReconnectConfig {
                enabled: reconnect,
                minimum_delay: minimum_reconnection_delay,
                max_attempts: reconnection_attempts,
            },
            heartbeat,
            handshake_timeout,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    #[must_use]
    pub fn threshold_level(&self) -> u32 {
        self.threshold_level
    }

    #[must_use]
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    #[must_use]
    pub fn reconnect(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

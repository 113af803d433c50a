#![cfg_attr(doc, doc = include_str!("../README.md"))]

/// Log a session lifecycle event: `info` for verbose streams, `debug` otherwise.
macro_rules! session_event {
    ($verbose:expr, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            if $verbose {
                tracing::info!($($arg)+);
            } else {
                tracing::debug!($($arg)+);
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _: bool = $verbose;
        }
    };
}
pub(crate) use session_event;

pub mod error;
pub mod stream;
pub mod ws;

use std::str::FromStr;

use phf::phf_map;
use url::Url;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Host serving every real-time feed.
pub const FEED_HOST: &str = "api.tiingo.com";

/// Environment variable conventionally holding the API token.
pub const TOKEN_VAR: &str = "TIINGO_API_TOKEN";

static ENDPOINTS: phf::Map<&'static str, Endpoint> = phf_map! {
    "iex" => Endpoint::Iex,
    "fx" => Endpoint::Fx,
    "crypto" => Endpoint::Crypto,
};

/// The allow-listed real-time feeds, one per asset class.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Endpoint {
    /// IEX equities
    Iex,
    /// Foreign exchange
    Fx,
    /// Crypto currencies
    Crypto,
}

impl Endpoint {
    /// WebSocket address of this feed.
    #[must_use]
    pub const fn url(self) -> &'static str {
        match self {
            Self::Iex => "wss://api.tiingo.com/iex",
            Self::Fx => "wss://api.tiingo.com/fx",
            Self::Crypto => "wss://api.tiingo.com/crypto",
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Accepts either the short feed name (`"iex"`) or its full `wss://` address.
    fn from_str(s: &str) -> Result<Self> {
        let name = if s.contains("://") {
            let url = Url::parse(s).map_err(|e| Error::validation("endpoint", e.to_string()))?;
            if url.scheme() != "wss" || url.host_str() != Some(FEED_HOST) {
                return Err(Error::validation(
                    "endpoint",
                    format!("{s} is not a {FEED_HOST} feed address"),
                ));
            }
            url.path().trim_matches('/').to_owned()
        } else {
            s.trim().to_ascii_lowercase()
        };

        ENDPOINTS.get(name.as_str()).copied().ok_or_else(|| {
            Error::validation("endpoint", format!("{s} is not one of iex, fx, crypto"))
        })
    }
}

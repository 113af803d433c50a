//! Streams ticks from one Tiingo feed until the stream fails or Ctrl-C.
//!
//! Run with tracing enabled:
//! ```sh
//! TIINGO_API_TOKEN=... RUST_LOG=info,tungstenite=off cargo run --example stream -- crypto btcusd ethusd
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=stream.log TIINGO_API_TOKEN=... RUST_LOG=debug cargo run --example stream -- iex spy
//! ```

use std::fs::File;

use futures::StreamExt as _;
use tiingo_stream_sdk::TOKEN_VAR;
use tiingo_stream_sdk::stream::{Client, StreamConfig, TickOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let mut args = std::env::args().skip(1);
    let endpoint = args.next().unwrap_or_else(|| "iex".to_owned());
    let mut tickers: Vec<String> = args.collect();
    if tickers.is_empty() {
        tickers.push("*".to_owned());
    }

    let config = StreamConfig::builder()
        .endpoint(endpoint)
        .token(std::env::var(TOKEN_VAR)?)
        .threshold_level(5)
        .tickers(tickers)
        .verbose(true)
        .build()?;

    let client = Client::new(config);
    client.connect().await?;
    info!(stream_id = ?client.stream_id(), "Connected");

    let mut ticks = Box::pin(client.ticks(TickOptions::builder().attach_session_id(true).build()));

    loop {
        tokio::select! {
            tick = ticks.next() => match tick {
                Some(Ok(tick)) => info!(?tick),
                Some(Err(e)) => warn!(error = %e, "Tick stream error"),
                None => break,
            },
            reason = client.wait_terminal() => {
                if let Some(reason) = reason {
                    error!(?reason, "Stream failed");
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                client.close().await;
                break;
            }
        }
    }

    Ok(())
}

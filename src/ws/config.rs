#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::ops::RangeInclusive;
use std::time::Duration;

use bon::Builder;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(120);
/// Health checks fire 10%-25% later than the base interval.
const DEFAULT_HEARTBEAT_JITTER_PERMILLE: RangeInclusive<u32> = 100..=250;
const DEFAULT_MINIMUM_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 100;
/// Reconnection delays are inflated by 10%-20%.
pub(crate) const RECONNECT_JITTER_PERMILLE: RangeInclusive<u32> = 100..=200;

/// Configuration for heartbeat-based liveness checks.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct HeartbeatConfig {
    /// Base delay between health checks
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub interval: Duration,
    /// Random inflation applied to every check, in thousandths of `interval`
    #[builder(default = DEFAULT_HEARTBEAT_JITTER_PERMILLE)]
    pub jitter_permille: RangeInclusive<u32>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            jitter_permille: DEFAULT_HEARTBEAT_JITTER_PERMILLE,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether unexpected disconnects are followed by reconnection attempts
    pub enabled: bool,
    /// Delay baseline between attempts, jittered upwards per attempt
    pub minimum_delay: Duration,
    /// Attempts allowed per outage; restored after every successful reconnection
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_delay: DEFAULT_MINIMUM_RECONNECTION_DELAY,
            max_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
        }
    }
}

/// Inflate `base` by a random amount drawn from `permille` (thousandths of `base`).
pub(crate) fn jittered(base: Duration, permille: &RangeInclusive<u32>) -> Duration {
    use rand::Rng as _;

    let extra = if permille.is_empty() {
        0
    } else {
        rand::rng().random_range(permille.clone())
    };
    base.saturating_mul(1000_u32.saturating_add(extra)) / 1000
}

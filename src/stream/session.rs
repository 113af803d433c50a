use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Connection generation.
///
/// Bumped whenever in-flight async work (timers, pending frames) could belong to a
/// superseded connection: on every successful handshake and on every teardown.
/// Delayed work carries the generation it was scheduled under and becomes a no-op
/// once it no longer matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and liveness bookkeeping for one logical stream.
#[derive(Debug, Default)]
pub(crate) struct Session {
    connected: bool,
    in_flight: bool,
    stream_id: Option<Arc<str>>,
    generation: Generation,
    connected_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
    heartbeats: u64,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    pub(crate) fn stream_id(&self) -> Option<&Arc<str>> {
        self.stream_id.as_ref()
    }

    pub(crate) fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub(crate) fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Number of heartbeats recorded since the last reset.
    pub(crate) fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    /// Claim the in-flight slot. Returns `false` if an attempt is already outstanding.
    pub(crate) fn begin_attempt(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub(crate) fn abandon_attempt(&mut self) {
        self.in_flight = false;
    }

    /// Record a successful handshake: new stream id, new generation, cleared heartbeat.
    pub(crate) fn establish(&mut self) -> (Generation, Arc<str>) {
        let stream_id: Arc<str> = Arc::from(Uuid::new_v4().to_string());
        self.in_flight = false;
        self.connected = true;
        self.generation = self.generation.next();
        self.stream_id = Some(Arc::clone(&stream_id));
        self.connected_at = Some(Utc::now());
        self.clear_heartbeat();
        (self.generation, stream_id)
    }

    /// Mark the connection gone and invalidate everything scheduled under it.
    pub(crate) fn teardown(&mut self) {
        self.connected = false;
        self.generation = self.generation.next();
    }

    pub(crate) fn record_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
        self.heartbeats = self.heartbeats.wrapping_add(1);
    }

    pub(crate) fn clear_heartbeat(&mut self) {
        self.last_heartbeat = None;
        self.heartbeats = 0;
    }
}

//! Liveness detection from the feed's heartbeat frames.
//!
//! The feed pushes a heartbeat frame periodically. The first one on a connection
//! schedules a health check; each check compares the heartbeat count it captured
//! when scheduled against the live count. Movement means the link is alive and
//! the check is rescheduled, no movement means the socket went silent and the
//! supervisor must force it closed.

use crate::stream::session::{Generation, Session};
use crate::ws::config::{HeartbeatConfig, jittered};
use crate::ws::timer::{Scheduled, Scheduler};

/// Timer payload for a pending health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HealthCheck {
    pub(crate) generation: Generation,
    /// Heartbeat count when the check was scheduled
    pub(crate) seen: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The check belongs to a superseded connection
    Stale,
    /// Heartbeats kept arriving; the next check is already scheduled
    Alive,
    /// No heartbeat during the whole window
    Dead,
}

pub(crate) struct HeartbeatMonitor<E> {
    config: HeartbeatConfig,
    scheduler: Scheduler<E>,
    armed: Option<Generation>,
    pending: Option<Scheduled>,
}

impl<E: From<HealthCheck> + Send + 'static> HeartbeatMonitor<E> {
    pub(crate) fn new(config: HeartbeatConfig, scheduler: Scheduler<E>) -> Self {
        Self {
            config,
            scheduler,
            armed: None,
            pending: None,
        }
    }

    /// Start watching `generation`; any earlier check is cancelled.
    pub(crate) fn arm(&mut self, generation: Generation) {
        self.armed = Some(generation);
        self.pending = None;
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = None;
        self.pending = None;
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a heartbeat received on `generation`.
    ///
    /// Returns `false` (and changes nothing) when `generation` is not the armed, live one.
    pub(crate) fn on_heartbeat(&mut self, session: &mut Session, generation: Generation) -> bool {
        if self.armed != Some(generation) || !session.is_current(generation) {
            return false;
        }

        let first = session.last_heartbeat().is_none();
        session.record_heartbeat();
        if first && self.pending.is_none() {
            self.schedule(generation, session.heartbeats());
        }
        true
    }

    /// Evaluate a fired health check.
    pub(crate) fn on_check(&mut self, session: &Session, check: HealthCheck) -> Verdict {
        if self.armed != Some(check.generation) || !session.is_current(check.generation) {
            return Verdict::Stale;
        }

        self.pending = None;
        if session.heartbeats() == check.seen {
            Verdict::Dead
        } else {
            self.schedule(check.generation, session.heartbeats());
            Verdict::Alive
        }
    }

    fn schedule(&mut self, generation: Generation, seen: u64) {
        let delay = jittered(self.config.interval, &self.config.jitter_permille);

        #[cfg(feature = "tracing")]
        tracing::trace!(%generation, ?delay, "Scheduling heartbeat health check");

        self.pending = Some(
            self.scheduler
                .schedule(delay, HealthCheck { generation, seen }.into()),
        );
    }
}

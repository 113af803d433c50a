//! One-shot timers whose expiry is delivered back to the owning task as an event.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Receiving half: the owner polls [`Timers::recv`] in its event loop.
pub(crate) struct Timers<E> {
    scheduler: Scheduler<E>,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E: Send + 'static> Timers<E> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            scheduler: Scheduler { tx },
            rx,
        }
    }

    pub(crate) fn scheduler(&self) -> Scheduler<E> {
        self.scheduler.clone()
    }

    pub(crate) fn schedule(&self, delay: Duration, event: E) -> Scheduled {
        self.scheduler.schedule(delay, event)
    }

    /// Next expired timer. Never returns `None` while `self` is alive.
    pub(crate) async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }
}

pub(crate) struct Scheduler<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> Scheduler<E> {
    pub(crate) fn schedule(&self, delay: Duration, event: E) -> Scheduled {
        let tx = self.tx.clone();
        Scheduled(tokio::spawn(async move {
            sleep(delay).await;
            _ = tx.send(event);
        }))
    }
}

/// A pending timer. Dropping it cancels the timer if it has not fired yet.
#[derive(Debug)]
pub(crate) struct Scheduled(JoinHandle<()>);

impl Drop for Scheduled {
    fn drop(&mut self) {
        self.0.abort();
    }
}

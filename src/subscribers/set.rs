//! # Non-blocking event fan-out to registered observers.
//!
//! [`SubscriberSet`] gives each observer a bounded queue and a dedicated
//! worker task:
//!
//! ```text
//! deliver(event)
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()
//!     ├──► [queue 2] ──► worker 2 ──► observer2.on_event()
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//! ```
//!
//! ## Rules
//! - `deliver()` uses `try_send` and returns immediately — the supervisor is
//!   never delayed by an observer, even while holding its exclusive lock.
//! - A full or closed queue drops the event **for that observer only** and
//!   publishes [`EventKind::ObserverOverflow`] on the bus (overflow events
//!   themselves are never re-reported, to avoid feedback loops).
//! - A panicking observer is isolated via `catch_unwind`; its worker keeps
//!   processing subsequent events.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Queue handle for one observer.
struct ObserverQueue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for registered observers.
pub struct SubscriberSet {
    queues: Vec<ObserverQueue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per observer.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut queues = Vec::with_capacity(subscribers.len());
        let mut workers = Vec::with_capacity(subscribers.len());

        for sub in subscribers {
            let name = sub.name();
            let cap = sub.queue_capacity().max(1);
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    // Observer panics must not take down the delivery worker.
                    let _ = std::panic::AssertUnwindSafe(fut).catch_unwind().await;
                }
            }));
            queues.push(ObserverQueue { name, tx });
        }
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Delivers an event to every observer queue without blocking.
    pub fn deliver(&self, event: Arc<Event>) {
        let is_overflow = matches!(event.kind, EventKind::ObserverOverflow { .. });

        for q in &self.queues {
            match q.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow {
                        self.bus.publish(Event::observer_overflow(q.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow {
                        self.bus.publish(Event::observer_overflow(q.name, "closed"));
                    }
                }
            }
        }
    }

    /// Closes all queues and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.queues);
        for w in self.workers {
            let _ = w.await;
        }
    }
}

//! # Broadcast bus for status and log events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the supervisor, its drainer
//! tasks, and the health monitor can publish without ever blocking — a
//! requirement, since status is published while the supervisor's exclusive
//! lock is held.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` calls `broadcast::Sender::send`
//!   and returns immediately.
//! - **Bounded capacity**: one ring buffer shared by all receivers; slow
//!   receivers observe `RecvError::Lagged(n)` and skip the `n` oldest items.
//! - **No persistence**: events published with no live receivers are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events.
///
/// Cheap to clone (the sender is `Arc`-backed internally); every receiver
/// obtained via [`Bus::subscribe`] sees events published after it subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given ring-buffer capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; never blocks.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

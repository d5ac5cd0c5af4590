//! # Observer trait for supervisor events.
//!
//! Implement [`Subscribe`] to receive every [`Event`] the supervisor
//! publishes: status transitions, forwarded process output, observer
//! overflow notices. Handlers run on a dedicated worker task per subscriber,
//! so a slow observer delays only itself.

use async_trait::async_trait;

use crate::events::Event;

/// # Asynchronous event observer.
///
/// A subscriber has a stable [`name`](Subscribe::name) (used in overflow
/// reports) and an async [`on_event`](Subscribe::on_event) handler.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tunnelvisor::{Event, EventKind, Subscribe};
///
/// struct StatusPrinter;
///
/// #[async_trait]
/// impl Subscribe for StatusPrinter {
///     fn name(&self) -> &'static str { "status-printer" }
///
///     async fn on_event(&self, ev: &Event) {
///         if let EventKind::Status(snap) = &ev.kind {
///             println!("tunnel={} forwarder={}",
///                 snap.tunnel.as_label(), snap.forwarder.as_label());
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Stable subscriber name, used in overflow/panic reports.
    fn name(&self) -> &'static str;

    /// Handles one event. Must not assume any cross-subscriber ordering.
    async fn on_event(&self, ev: &Event);

    /// Capacity of this subscriber's delivery queue (minimum 1 enforced).
    fn queue_capacity(&self) -> usize {
        128
    }
}

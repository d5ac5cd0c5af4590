//! Status and log events published by the supervisor.
//!
//! ## Contents
//! - [`StageStatus`] / [`StatusSnapshot`] — per-stage status and the
//!   two-stage snapshot consumed by observers
//! - [`Event`] / [`EventKind`] — the envelope published on the bus
//! - [`Bus`] — broadcast channel with non-blocking publish
//!
//! Structured status transitions are the primary egress channel; raw process
//! output lines are forwarded as auxiliary [`EventKind::Log`] events.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, StageStatus, StatusSnapshot};

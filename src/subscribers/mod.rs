//! Observer fan-out for status and log events.
//!
//! ## Contents
//! - [`Subscribe`] — trait implemented by observers (UI bridges, log sinks,
//!   tests)
//! - [`SubscriberSet`] — per-observer queues and workers; delivery never
//!   blocks the publisher
//! - `LogWriter` — built-in stdout observer for debugging and demos
//!   (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;

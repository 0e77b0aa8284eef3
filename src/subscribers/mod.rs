//! # Announce-stream subscribers.
//!
//! This module provides the [`Subscribe`] trait, the non-blocking
//! [`SubscriberSet`] fan-out hub, and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Runner/Dispatcher ── publish(Event) ──► Bus ──► hub task
//!                                                     │
//!                                                SubscriberSet::emit_arc
//!                                                     │
//!                                     ┌───────────────┼───────────────┐
//!                                     ▼               ▼               ▼
//!                                 [queue S1]      [queue S2]      [queue SN]
//!                                     ▼               ▼               ▼
//!                                  LogWriter     WebSocket hub    custom ...
//! ```
//!
//! A single hub task (owned by `monitor::Monitor`) drains the broadcast bus
//! and hands each event to the set; producers therefore pay one broadcast
//! send regardless of the number of subscribers, and a slow subscriber only
//! ever loses its own events.

mod log;
mod set;
mod subscribe;

pub use self::log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

//! Announce events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by service runners, the deployed
//! tracker, the action dispatcher and the orchestrator.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `monitor::Runner` (version/approval events),
//!   `actions::Dispatcher` (per-action results), `monitor::Monitor`
//!   (lifecycle), `subscribers::SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber fan-out hub (see `subscribers/`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! # Announce events emitted by the monitoring runtime.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Version events**: promotion flow (new latest, deployed change, approval)
//! - **Action events**: dispatch results per notifier/command/webhook
//! - **Lifecycle events**: service add/remove and shutdown progress
//! - **Subscriber events**: fan-out overflow/panic diagnostics
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! service identifier, version strings, error messages, and attempt counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Events for one service are published from that service's
//! runner in program order; `seq` lets consumers re-establish order across
//! async channel boundaries.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of announce events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Version events ===
    /// A new latest version was promoted for a service.
    NewLatestVersion,
    /// A latest-version poll failed with a surfaced (non-transient) error.
    LatestQueryFailed,
    /// The deployed-version tracker observed a change.
    DeployedVersionUpdated,
    /// The operator approved a version for dispatch.
    VersionApproved,
    /// The operator skipped a version (`SKIP_<version>` recorded).
    VersionSkipped,

    // === Action events ===
    /// One action (notify/command/webhook) succeeded.
    ActionSucceeded,
    /// One action exhausted its retries.
    ActionFailed,

    // === Lifecycle events ===
    /// A service runner was registered and started.
    ServiceAdded,
    /// A service runner stopped and was deregistered.
    ServiceRemoved,
    /// Shutdown requested (OS signal or explicit stop).
    ShutdownRequested,
    /// All runners stopped within the configured grace period.
    AllStoppedWithin,
    /// Grace period exceeded; some runners did not stop in time.
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
}

/// Announce event with optional metadata.
///
/// Carries information about promotions, approvals, dispatch results and
/// runtime lifecycle. Subscribers receive copies; the runtime never hands out
/// references into its own mutable state.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp of publication.
    pub at: DateTime<Utc>,
    /// The kind of event.
    pub kind: EventKind,
    /// Service identifier, if applicable.
    pub service: Option<String>,
    /// Version string the event refers to (promoted/approved/deployed).
    pub version: Option<String>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Attempt count for action events (starting from 1).
    pub attempt: Option<u32>,
    /// Action family for action events (`notify`, `command`, `webhook`).
    pub action_kind: Option<&'static str>,
    /// Configured identifier of the action.
    pub action_id: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            service: None,
            version: None,
            error: None,
            attempt: None,
            action_kind: None,
            action_id: None,
        }
    }

    /// Attaches a service identifier.
    pub fn with_service(mut self, id: impl Into<String>) -> Self {
        self.service = Some(id.into());
        self
    }

    /// Attaches a version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches an attempt count.
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches the action family and identifier.
    pub fn with_action(mut self, kind: &'static str, id: impl Into<String>) -> Self {
        self.action_kind = Some(kind);
        self.action_id = Some(id.into());
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_error(format!("subscriber={subscriber} panic={info}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::NewLatestVersion);
        let b = Event::now(EventKind::NewLatestVersion);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::ActionFailed)
            .with_service("argus")
            .with_version("1.2.3")
            .with_action("webhook", "wh-main")
            .with_attempt(3)
            .with_error("status 500");
        assert_eq!(ev.service.as_deref(), Some("argus"));
        assert_eq!(ev.version.as_deref(), Some("1.2.3"));
        assert_eq!(ev.action_kind, Some("webhook"));
        assert_eq!(ev.action_id.as_deref(), Some("wh-main"));
        assert_eq!(ev.attempt, Some(3));
    }
}

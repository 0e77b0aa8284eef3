//! # Mutable runtime state of one service.
//!
//! [`Status`] is owned and mutated exclusively by the service's runner task;
//! everything else reads through [`StatusReader`] snapshots (copy-out, never
//! references into the live maps).
//!
//! Every mutation does three things, in order:
//! 1. update the live fields,
//! 2. refresh the shared snapshot for readers,
//! 3. mirror the change to the database channel and announce bus.
//!
//! ## Invariants
//! - A stored version is either empty or was accepted by the resolver
//!   (semantically valid when `semantic_versioning` is on).
//! - `latest_version_timestamp` is stamped after `last_queried` of the poll
//!   that produced it.
//! - `approved_version ∈ {"", "SKIP_<v>", v}` for some prior latest `v`.
//! - Action fail flags reset to `false` at the start of each dispatch round;
//!   they never accumulate across rounds.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Bus, Event, EventKind};
use crate::persist::{DbMessage, DbSender, StatusField};

/// Prefix recording an operator's "skip this version" decision.
pub const SKIP_PREFIX: &str = "SKIP_";

/// Persisted/readable status record of one service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub latest_version_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deployed_version: String,
    #[serde(default)]
    pub deployed_version_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_version: String,
    #[serde(default)]
    pub last_queried: Option<DateTime<Utc>>,
}

/// Cheap cloneable read handle over a service's status.
#[derive(Clone)]
pub struct StatusReader {
    shared: Arc<RwLock<StatusSnapshot>>,
}

impl StatusReader {
    /// Returns a copy of the current status.
    pub fn get(&self) -> StatusSnapshot {
        self.shared.read().expect("status lock poisoned").clone()
    }
}

/// Fail flags of the last dispatch round, keyed like the action config.
#[derive(Clone, Debug, Default)]
pub struct ActionFails {
    pub notify: BTreeMap<String, bool>,
    pub command: Vec<bool>,
    pub webhook: BTreeMap<String, bool>,
}

/// Runtime state of one service; single writer (the runner).
pub struct Status {
    service_id: String,
    snapshot: StatusSnapshot,
    fails: ActionFails,
    shared: Arc<RwLock<StatusSnapshot>>,
    announce: Bus,
    db: DbSender,
}

impl Status {
    /// Creates empty status wired to the announce bus and database channel.
    pub fn new(service_id: impl Into<String>, announce: Bus, db: DbSender) -> Self {
        let service_id = service_id.into();
        Self {
            service_id,
            snapshot: StatusSnapshot::default(),
            fails: ActionFails::default(),
            shared: Arc::new(RwLock::new(StatusSnapshot::default())),
            announce,
            db,
        }
    }

    /// Restores a prior record (process restart) without announcing.
    pub fn load(&mut self, record: StatusSnapshot) {
        self.snapshot = record;
        self.refresh_shared();
    }

    /// Returns a read handle safe to hand across tasks.
    pub fn reader(&self) -> StatusReader {
        StatusReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The owning service's identifier.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn latest_version(&self) -> &str {
        &self.snapshot.latest_version
    }

    pub fn deployed_version(&self) -> &str {
        &self.snapshot.deployed_version
    }

    pub fn approved_version(&self) -> &str {
        &self.snapshot.approved_version
    }

    pub fn last_queried(&self) -> Option<DateTime<Utc>> {
        self.snapshot.last_queried
    }

    /// Fail flags of the last dispatch round.
    pub fn fails(&self) -> &ActionFails {
        &self.fails
    }

    /// Publishes an event on the announce bus.
    ///
    /// Routed through status so a runner's events interleave with its
    /// mutations in program order.
    pub fn announce(&self, ev: Event) {
        self.announce.publish(ev);
    }

    /// Stamps the start of a poll.
    pub fn set_last_queried(&mut self) {
        self.snapshot.last_queried = Some(Utc::now());
        self.refresh_shared();
    }

    /// Promotes a new latest version: stamps it, persists it, announces it.
    pub async fn set_latest_version(&mut self, version: &str) {
        let now = Utc::now();
        self.snapshot.latest_version = version.to_string();
        self.snapshot.latest_version_timestamp = Some(now);
        self.refresh_shared();

        self.persist(StatusField::LatestVersion, version).await;
        self.persist(StatusField::LatestVersionTimestamp, &now.to_rfc3339())
            .await;
        self.announce.publish(
            Event::now(EventKind::NewLatestVersion)
                .with_service(&self.service_id)
                .with_version(version),
        );
    }

    /// Records a change of the running instance's version.
    pub async fn set_deployed_version(&mut self, version: &str) {
        let now = Utc::now();
        self.snapshot.deployed_version = version.to_string();
        self.snapshot.deployed_version_timestamp = Some(now);
        self.refresh_shared();

        self.persist(StatusField::DeployedVersion, version).await;
        self.persist(StatusField::DeployedVersionTimestamp, &now.to_rfc3339())
            .await;
        self.announce.publish(
            Event::now(EventKind::DeployedVersionUpdated)
                .with_service(&self.service_id)
                .with_version(version),
        );
    }

    /// Records operator approval of `version` for dispatch.
    pub async fn approve(&mut self, version: &str) {
        self.snapshot.approved_version = version.to_string();
        self.refresh_shared();
        self.persist(StatusField::ApprovedVersion, version).await;
        self.announce.publish(
            Event::now(EventKind::VersionApproved)
                .with_service(&self.service_id)
                .with_version(version),
        );
    }

    /// Records an operator's decision to skip `version`.
    ///
    /// The marker persists as `SKIP_<version>` and suppresses exactly one
    /// dispatch, auto-approve included; the next promotion clears it by
    /// referring to a different version.
    pub async fn skip(&mut self, version: &str) {
        let marker = format!("{SKIP_PREFIX}{version}");
        self.snapshot.approved_version = marker.clone();
        self.refresh_shared();
        self.persist(StatusField::ApprovedVersion, &marker).await;
        self.announce.publish(
            Event::now(EventKind::VersionSkipped)
                .with_service(&self.service_id)
                .with_version(version),
        );
    }

    /// True if the operator approved exactly `version`.
    pub fn is_approved(&self, version: &str) -> bool {
        !version.is_empty() && self.snapshot.approved_version == version
    }

    /// True if the operator skipped exactly `version`.
    pub fn is_skipped(&self, version: &str) -> bool {
        !version.is_empty()
            && self
                .snapshot
                .approved_version
                .strip_prefix(SKIP_PREFIX)
                .is_some_and(|v| v == version)
    }

    /// The dispatch gate: a promotion to `version` may fan out actions when
    /// it was approved, or auto-approve is on and it was not skipped.
    pub fn dispatch_approved(&self, version: &str, auto_approve: bool) -> bool {
        if self.is_skipped(version) {
            return false;
        }
        auto_approve || self.is_approved(version)
    }

    /// Resets all fail flags to `false` for a new dispatch round.
    ///
    /// The key sets mirror the service's configured actions so that flags for
    /// removed actions disappear rather than lingering.
    pub fn reset_fails<'a>(
        &mut self,
        notify_ids: impl Iterator<Item = &'a str>,
        command_len: usize,
        webhook_ids: impl Iterator<Item = &'a str>,
    ) {
        self.fails.notify = notify_ids.map(|id| (id.to_string(), false)).collect();
        self.fails.command = vec![false; command_len];
        self.fails.webhook = webhook_ids.map(|id| (id.to_string(), false)).collect();
    }

    /// Records one notifier's outcome.
    pub fn set_notify_fail(&mut self, id: &str, failed: bool) {
        self.fails.notify.insert(id.to_string(), failed);
    }

    /// Records one command's outcome by its slice position.
    pub fn set_command_fail(&mut self, index: usize, failed: bool) {
        if let Some(slot) = self.fails.command.get_mut(index) {
            *slot = failed;
        }
    }

    /// Records one webhook's outcome.
    pub fn set_webhook_fail(&mut self, id: &str, failed: bool) {
        self.fails.webhook.insert(id.to_string(), failed);
    }

    /// Returns the current record (copy).
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.clone()
    }

    /// Flushes the full record to the database channel (used on stop).
    pub async fn save(&self) {
        self.persist(StatusField::LatestVersion, &self.snapshot.latest_version)
            .await;
        if let Some(ts) = self.snapshot.latest_version_timestamp {
            self.persist(StatusField::LatestVersionTimestamp, &ts.to_rfc3339())
                .await;
        }
        self.persist(StatusField::DeployedVersion, &self.snapshot.deployed_version)
            .await;
        if let Some(ts) = self.snapshot.deployed_version_timestamp {
            self.persist(StatusField::DeployedVersionTimestamp, &ts.to_rfc3339())
                .await;
        }
        self.persist(StatusField::ApprovedVersion, &self.snapshot.approved_version)
            .await;
    }

    fn refresh_shared(&self) {
        *self.shared.write().expect("status lock poisoned") = self.snapshot.clone();
    }

    async fn persist(&self, field: StatusField, value: &str) {
        self.db
            .send(DbMessage {
                service_id: self.service_id.clone(),
                field,
                value: value.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{spawn_worker, NoopSink};
    use std::time::Duration;

    fn status() -> Status {
        let (db, _worker) = spawn_worker(
            std::sync::Arc::new(NoopSink),
            16,
            Duration::from_millis(10),
        );
        Status::new("svc", Bus::new(16), db)
    }

    #[tokio::test]
    async fn promotion_stamps_after_last_queried() {
        let mut st = status();
        st.set_last_queried();
        st.set_latest_version("1.2.3").await;

        let snap = st.snapshot();
        assert_eq!(snap.latest_version, "1.2.3");
        assert!(snap.latest_version_timestamp.unwrap() >= snap.last_queried.unwrap());
    }

    #[tokio::test]
    async fn promotion_announces() {
        let (db, _worker) = spawn_worker(
            std::sync::Arc::new(NoopSink),
            16,
            Duration::from_millis(10),
        );
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let mut st = Status::new("svc", bus, db);

        st.set_latest_version("2.0.0").await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::NewLatestVersion);
        assert_eq!(ev.version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn approval_gate_semantics() {
        let mut st = status();
        st.set_latest_version("1.0.0").await;

        // Nothing approved, no auto-approve: hold.
        assert!(!st.dispatch_approved("1.0.0", false));
        // Auto-approve alone opens the gate.
        assert!(st.dispatch_approved("1.0.0", true));

        st.approve("1.0.0").await;
        assert!(st.dispatch_approved("1.0.0", false));

        // Skip suppresses even under auto-approve...
        st.skip("1.0.0").await;
        assert_eq!(st.approved_version(), "SKIP_1.0.0");
        assert!(!st.dispatch_approved("1.0.0", true));
        // ...but only for that version.
        assert!(st.dispatch_approved("1.1.0", true));
    }

    #[tokio::test]
    async fn empty_versions_never_approve() {
        let st = status();
        assert!(!st.is_approved(""));
        assert!(!st.is_skipped(""));
    }

    #[tokio::test]
    async fn fail_flags_reset_per_round() {
        let mut st = status();
        st.reset_fails(["discord"].into_iter(), 2, ["wh"].into_iter());
        st.set_notify_fail("discord", true);
        st.set_command_fail(1, true);
        assert!(st.fails().notify["discord"]);
        assert!(st.fails().command[1]);

        st.reset_fails(["discord"].into_iter(), 2, ["wh"].into_iter());
        assert!(!st.fails().notify["discord"]);
        assert_eq!(st.fails().command, vec![false, false]);
        assert!(!st.fails().webhook["wh"]);
    }

    #[tokio::test]
    async fn reader_sees_copies() {
        let mut st = status();
        let reader = st.reader();
        st.set_latest_version("3.0.0").await;

        let snap = reader.get();
        assert_eq!(snap.latest_version, "3.0.0");

        // Mutating the copy does not touch live state.
        let mut copy = reader.get();
        copy.latest_version = "tampered".into();
        assert_eq!(reader.get().latest_version, "3.0.0");
    }
}

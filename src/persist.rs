//! # Database channel and persistence worker.
//!
//! Status mutations are mirrored to an embedded store through a bounded
//! channel drained by a single worker. The in-memory state always stays
//! authoritative: when the channel is saturated for longer than a short
//! grace, the message is dropped and logged rather than stalling a runner.
//!
//! ## Guarantees
//! - The worker applies messages in receipt order.
//! - Two updates to the same `(service, field)` may be coalesced by the sink;
//!   only the final state must ultimately be observable.
//! - Producers block for at most [`DbSender::grace`], never indefinitely.
//!
//! The actual storage engine lives outside this crate; it plugs in through
//! [`StatusSink`].

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// Status field a database message updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    LatestVersion,
    LatestVersionTimestamp,
    DeployedVersion,
    DeployedVersionTimestamp,
    ApprovedVersion,
}

impl StatusField {
    /// Stable column/key name used by sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusField::LatestVersion => "latest_version",
            StatusField::LatestVersionTimestamp => "latest_version_timestamp",
            StatusField::DeployedVersion => "deployed_version",
            StatusField::DeployedVersionTimestamp => "deployed_version_timestamp",
            StatusField::ApprovedVersion => "approved_version",
        }
    }
}

/// One cell update for the persistence worker.
#[derive(Debug, Clone)]
pub struct DbMessage {
    pub service_id: String,
    pub field: StatusField,
    pub value: String,
}

/// Persistent store the worker writes into.
///
/// Implementations live in the embedding daemon (embedded key-value store,
/// SQL, flat file). Writes for one service arrive in receipt order.
#[async_trait]
pub trait StatusSink: Send + Sync + 'static {
    async fn write(&self, msg: DbMessage);
}

/// Producer handle for the database channel.
#[derive(Clone)]
pub struct DbSender {
    tx: mpsc::Sender<DbMessage>,
    grace: Duration,
}

impl DbSender {
    /// How long `send` may wait on a full channel.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Enqueues a status update.
    ///
    /// Fast path is a lock-free `try_send`; on a full channel the producer
    /// waits up to the grace window, then drops the message and logs it.
    pub async fn send(&self, msg: DbMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                let service = msg.service_id.clone();
                let field = msg.field;
                if timeout(self.grace, self.tx.send(msg)).await.is_err() {
                    warn!(
                        "db channel full; dropped update service={service} field={}",
                        field.as_str()
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!(
                    "db channel closed; dropped update service={} field={}",
                    msg.service_id,
                    msg.field.as_str()
                );
            }
        }
    }
}

/// Handle to the running persistence worker.
pub struct DbWorker {
    handle: JoinHandle<()>,
}

impl DbWorker {
    /// Waits for the worker to drain and exit (all senders dropped).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Spawns the persistence worker and returns the producer handle.
///
/// The worker exits once every [`DbSender`] clone has been dropped and the
/// channel is drained.
pub fn spawn_worker(
    sink: Arc<dyn StatusSink>,
    capacity: usize,
    grace: Duration,
) -> (DbSender, DbWorker) {
    let (tx, mut rx) = mpsc::channel::<DbMessage>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            sink.write(msg).await;
        }
    });
    (DbSender { tx, grace }, DbWorker { handle })
}

/// Sink that discards every write; for setups without persistence.
pub struct NoopSink;

#[async_trait]
impl StatusSink for NoopSink {
    async fn write(&self, _msg: DbMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Collecting {
        rows: Mutex<Vec<(String, &'static str, String)>>,
    }

    #[async_trait]
    impl StatusSink for Collecting {
        async fn write(&self, msg: DbMessage) {
            self.rows
                .lock()
                .await
                .push((msg.service_id, msg.field.as_str(), msg.value));
        }
    }

    #[tokio::test]
    async fn worker_drains_in_receipt_order() {
        let sink = Arc::new(Collecting {
            rows: Mutex::new(Vec::new()),
        });
        let (tx, worker) = spawn_worker(sink.clone(), 8, Duration::from_millis(50));

        for v in ["1.0.0", "1.1.0", "1.2.0"] {
            tx.send(DbMessage {
                service_id: "svc".into(),
                field: StatusField::LatestVersion,
                value: v.into(),
            })
            .await;
        }
        drop(tx);
        worker.join().await;

        let rows = sink.rows.lock().await;
        let versions: Vec<&str> = rows.iter().map(|r| r.2.as_str()).collect();
        assert_eq!(versions, ["1.0.0", "1.1.0", "1.2.0"]);
    }

    struct Blocking;

    #[async_trait]
    impl StatusSink for Blocking {
        async fn write(&self, _msg: DbMessage) {
            futures::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn saturated_channel_drops_after_grace() {
        let (tx, _worker) = spawn_worker(Arc::new(Blocking), 1, Duration::from_millis(10));

        // Worker parks on the first message; capacity 1 buffers the second;
        // the third must time out of the grace window without hanging us.
        for i in 0..3u32 {
            tx.send(DbMessage {
                service_id: "svc".into(),
                field: StatusField::ApprovedVersion,
                value: i.to_string(),
            })
            .await;
        }
    }
}

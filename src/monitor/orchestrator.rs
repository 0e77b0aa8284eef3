//! # Monitor: orchestrates service runners and graceful shutdown.
//!
//! The [`Monitor`] owns the runtime components (announce bus, subscriber
//! fan-out, persistence worker, dispatcher) and the lifecycle of every
//! service runner from registration to drained exit.
//!
//! ## Architecture
//! ```text
//! Service ──► Monitor::add_service()
//!                  │
//!                  ├──► spawn Runner (owns Status, single writer)
//!                  │         └──► publishes events to Bus
//!                  │
//!                  ├──► hub listener
//!                  │         └──► SubscriberSet (per-subscriber queues)
//!                  │
//!                  └──► persistence worker ◄── database channel
//!
//! shutdown: cancel runtime token ──► runners drain & save ──► grace window
//! ```
//!
//! ## Rules
//! - One runner per service id; duplicates are rejected.
//! - Removal cancels the runner, awaits its drain, and announces it.
//! - Shutdown waits at most `Config::grace`; runners still alive after the
//!   window are reported stuck in `RuntimeError::GraceExceeded`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::actions::{Dispatcher, NotificationRouter};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::latest::github;
use crate::metrics::Observe;
use crate::persist::{spawn_worker, DbSender, StatusSink};
use crate::service::{Service, Status, StatusReader, StatusSnapshot};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::runner::{Runner, ServiceCommand};
use super::shutdown::wait_for_shutdown_signal;

/// Handle to a running service runner.
struct RunnerHandle {
    control: mpsc::Sender<ServiceCommand>,
    join: JoinHandle<()>,
    cancel: CancellationToken,
    reader: StatusReader,
}

/// Orchestrates service runners, event delivery, and graceful shutdown.
pub struct Monitor {
    cfg: Config,
    bus: Bus,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<dyn Observe>,
    db: DbSender,
    runtime_token: CancellationToken,
    runners: RwLock<HashMap<String, RunnerHandle>>,
}

impl Monitor {
    /// Creates the monitor and spawns its background plumbing (subscriber
    /// hub and persistence worker).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        cfg: Config,
        router: Arc<dyn NotificationRouter>,
        metrics: Arc<dyn Observe>,
        sink: Arc<dyn StatusSink>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        Self::spawn_hub_listener(&bus, subs);

        let (db, _worker) = spawn_worker(sink, cfg.db_capacity, cfg.db_send_grace);
        let dispatcher = Arc::new(Dispatcher::new(router, Arc::clone(&metrics), bus.clone()));

        Self {
            cfg,
            bus,
            dispatcher,
            metrics,
            db,
            runtime_token: CancellationToken::new(),
            runners: RwLock::new(HashMap::new()),
        }
    }

    /// Captures the GitHub empty-list sentinel; call once at startup.
    pub async fn probe_github_sentinel(&self) {
        github::probe_empty_list_etag(&self.cfg).await;
    }

    /// Registers a service and starts its runner.
    ///
    /// `record` restores persisted status (restart) without re-announcing.
    /// Returns a read handle over the service's status.
    pub async fn add_service(
        &self,
        service: Service,
        record: Option<StatusSnapshot>,
    ) -> Result<StatusReader, RuntimeError> {
        let id = service.id.clone();
        {
            let runners = self.runners.read().await;
            if runners.contains_key(&id) {
                return Err(RuntimeError::ServiceAlreadyExists { id });
            }
        }

        let mut status = Status::new(&id, self.bus.clone(), self.db.clone());
        if let Some(record) = record {
            status.load(record);
        }
        let reader = status.reader();

        let (control_tx, control_rx) = mpsc::channel(8);
        let runner = Runner::new(
            service,
            status,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.metrics),
            self.cfg.clone(),
            control_rx,
        );
        let cancel = self.runtime_token.child_token();
        let join = tokio::spawn(runner.run(cancel.clone()));

        let handle = RunnerHandle {
            control: control_tx,
            join,
            cancel,
            reader: reader.clone(),
        };
        let mut runners = self.runners.write().await;
        if runners.insert(id.clone(), handle).is_some() {
            // Lost a race with a concurrent add of the same id.
            warn!("service {id:?} registered twice; keeping the newcomer");
        }
        drop(runners);

        self.bus
            .publish(Event::now(EventKind::ServiceAdded).with_service(&id));
        info!("service {id:?} registered");
        Ok(reader)
    }

    /// Stops a service's runner and forgets it (config reload removal).
    pub async fn remove_service(&self, id: &str) -> Result<(), RuntimeError> {
        let handle = {
            let mut runners = self.runners.write().await;
            runners
                .remove(id)
                .ok_or_else(|| RuntimeError::ServiceNotFound { id: id.to_string() })?
        };

        handle.cancel.cancel();
        if let Err(e) = handle.join.await {
            warn!("service {id:?} runner panicked during removal: {e}");
        }
        self.bus
            .publish(Event::now(EventKind::ServiceRemoved).with_service(id));
        info!("service {id:?} removed");
        Ok(())
    }

    /// Sends a control command to one runner.
    pub async fn command(&self, id: &str, cmd: ServiceCommand) -> Result<(), RuntimeError> {
        let runners = self.runners.read().await;
        let handle = runners
            .get(id)
            .ok_or_else(|| RuntimeError::ServiceNotFound { id: id.to_string() })?;
        handle
            .control
            .send(cmd)
            .await
            .map_err(|_| RuntimeError::ServiceNotFound { id: id.to_string() })
    }

    /// Copy of one service's status.
    pub async fn status(&self, id: &str) -> Option<StatusSnapshot> {
        let runners = self.runners.read().await;
        runners.get(id).map(|h| h.reader.get())
    }

    /// Sorted identifiers of every monitored service.
    pub async fn services(&self) -> Vec<String> {
        let runners = self.runners.read().await;
        let mut ids: Vec<String> = runners.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Subscribes directly to the announce bus (for WebSocket hubs etc.).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Blocks until an OS termination signal, then shuts down gracefully.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        self.probe_github_sentinel().await;
        let _ = wait_for_shutdown_signal().await;
        self.shutdown().await
    }

    /// Cancels every runner and waits up to the grace window for drains.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.runtime_token.cancel();

        let handles: Vec<(String, RunnerHandle)> = {
            let mut runners = self.runners.write().await;
            runners.drain().collect()
        };

        let grace = self.cfg.grace;
        let mut joins = Vec::new();
        let mut ids = Vec::new();
        for (id, handle) in handles {
            handle.cancel.cancel();
            ids.push(id);
            joins.push(handle.join);
        }

        let all = async {
            for join in &mut joins {
                let _ = join.await;
            }
        };
        match timeout(grace, all).await {
            Ok(()) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                let stuck: Vec<String> = ids
                    .iter()
                    .zip(&joins)
                    .filter(|(_, join)| !join.is_finished())
                    .map(|(id, _)| id.clone())
                    .collect();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Forwards every bus event to the subscriber set.
    ///
    /// A single hub task pays the fan-out; producers only ever touch the
    /// broadcast channel. Lagged hubs skip the backlog rather than blocking.
    fn spawn_hub_listener(bus: &Bus, subs: Arc<SubscriberSet>) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => subs.emit_arc(Arc::new(ev)),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("announce hub lagged; skipped {skipped} event(s)");
                        continue;
                    }
                }
            }
        });
    }
}

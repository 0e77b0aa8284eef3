//! # Per-service runner.
//!
//! One runner task owns one service: its ticker(s), its [`Status`], and the
//! decision to dispatch. This is the single writer of the service's state;
//! every mutation funnels through this loop.
//!
//! ## Loop
//! ```text
//! loop {
//!   select! {
//!     cancellation      → drain, save status, exit
//!     latest ticker     → query latest → compare/filter/promote → gate → dispatch
//!     deployed ticker   → query deployed (never dispatches)
//!     control command   → RefreshNow / Approve / Skip / Stop
//!   }
//! }
//! ```
//!
//! Dispatch runs inline (awaited) so a stop request observed on the next
//! iteration finds no orphaned action tasks: cancellation reaches them
//! through the runner's token at their next suspension point.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionKey, Dispatcher};
use crate::config::Config;
use crate::error::QueryError;
use crate::events::{Event, EventKind};
use crate::metrics::Observe;
use crate::service::{Service, Status};

/// External command addressed to one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Poll both lookups now, without waiting for the tickers.
    RefreshNow,
    /// Record approval of a version; dispatches if it is the current latest.
    Approve(String),
    /// Record `SKIP_<version>`; suppresses one dispatch, auto-approve included.
    Skip(String),
    /// Drain and exit.
    Stop,
}

/// The task driving one service.
pub struct Runner {
    service: Service,
    status: Status,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<dyn Observe>,
    cfg: Config,
    control: mpsc::Receiver<ServiceCommand>,
}

impl Runner {
    pub fn new(
        service: Service,
        status: Status,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<dyn Observe>,
        cfg: Config,
        control: mpsc::Receiver<ServiceCommand>,
    ) -> Self {
        Self {
            service,
            status,
            dispatcher,
            metrics,
            cfg,
            control,
        }
    }

    /// Runs until cancellation or a `Stop` command; saves status on the way
    /// out.
    pub async fn run(mut self, token: CancellationToken) {
        if !self.service.options.active() {
            // Inactive services keep their status readable but never poll;
            // control commands are drained and ignored so senders never jam.
            debug!("service {:?} is inactive; runner parked", self.service.id);
            loop {
                select! {
                    _ = token.cancelled() => return,
                    cmd = self.control.recv() => match cmd {
                        None | Some(ServiceCommand::Stop) => return,
                        Some(_) => continue,
                    },
                }
            }
        }

        let latest_every = self
            .service
            .options
            .interval(&self.cfg)
            .max(Duration::from_secs(1));
        let mut latest_tick = interval(latest_every);
        latest_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deployed_every = self
            .service
            .deployed
            .as_ref()
            .and_then(|d| d.interval)
            .unwrap_or(latest_every);
        let mut deployed_tick = interval(deployed_every.max(Duration::from_secs(1)));
        deployed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let track_deployed = self.service.deployed.is_some();

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = latest_tick.tick() => {
                    self.poll_latest(&token).await;
                }
                _ = deployed_tick.tick(), if track_deployed => {
                    self.poll_deployed().await;
                }
                cmd = self.control.recv() => match cmd {
                    None | Some(ServiceCommand::Stop) => break,
                    Some(cmd) => self.handle_command(cmd, &token).await,
                },
            }
        }

        self.status.save().await;
        debug!("service {:?} runner drained", self.service.id);
    }

    async fn handle_command(&mut self, cmd: ServiceCommand, token: &CancellationToken) {
        match cmd {
            ServiceCommand::RefreshNow => {
                self.poll_latest(token).await;
                if self.service.deployed.is_some() {
                    self.poll_deployed().await;
                }
            }
            ServiceCommand::Approve(version) => {
                self.status.approve(&version).await;
                if self.status.latest_version() == version {
                    self.maybe_dispatch(token).await;
                }
            }
            ServiceCommand::Skip(version) => {
                self.status.skip(&version).await;
            }
            ServiceCommand::Stop => unreachable!("handled by the caller"),
        }
    }

    /// One latest-version poll, with promotion and dispatch.
    async fn poll_latest(&mut self, token: &CancellationToken) {
        let vars = self.service.template_vars(self.status.latest_version());
        let result = self
            .service
            .latest
            .query(&mut self.status, &self.service.options, &vars, &self.cfg)
            .await;

        match result {
            Ok(promoted) => {
                self.metrics.latest_version_query(&self.service.id, true);
                if promoted {
                    self.maybe_dispatch(token).await;
                }
            }
            Err(e) => {
                self.metrics.latest_version_query(&self.service.id, false);
                self.report_query_error(e);
            }
        }
    }

    /// One deployed-version poll; never dispatches.
    async fn poll_deployed(&mut self) {
        let Some(lookup) = &self.service.deployed else {
            return;
        };
        let result = lookup
            .query(&mut self.status, &self.service.options, &self.cfg)
            .await;
        match result {
            Ok(_) => self.metrics.deployed_version_query(&self.service.id, true),
            Err(e) => {
                self.metrics.deployed_version_query(&self.service.id, false);
                warn!(
                    "service {:?}: deployed-version query failed: {e} ({})",
                    self.service.id,
                    e.as_label()
                );
            }
        }
    }

    /// Transient errors retry at the next tick; the rest are broadcast.
    fn report_query_error(&self, e: QueryError) {
        if e.is_transient() {
            warn!(
                "service {:?}: latest-version query failed: {e} ({})",
                self.service.id,
                e.as_label()
            );
            return;
        }
        warn!(
            "service {:?}: latest-version query error: {e} ({})",
            self.service.id,
            e.as_label()
        );
        self.status_bus_publish(
            Event::now(EventKind::LatestQueryFailed)
                .with_service(&self.service.id)
                .with_error(format!("{}: {e}", e.as_label())),
        );
    }

    fn status_bus_publish(&self, ev: Event) {
        // The status owns the announce handle; route through it so events
        // stay in runner-local order with status mutations.
        self.status.announce(ev);
    }

    /// Fans out actions if the approval gate is open for the current latest.
    async fn maybe_dispatch(&mut self, token: &CancellationToken) {
        let version = self.status.latest_version().to_string();
        if version.is_empty() {
            return;
        }
        if !self
            .status
            .dispatch_approved(&version, self.service.dashboard.auto_approve)
        {
            info!(
                "service {:?}: version {version:?} awaits approval",
                self.service.id
            );
            return;
        }

        self.status.reset_fails(
            self.service.notify.keys().map(String::as_str),
            self.service.command.len(),
            self.service.webhook.keys().map(String::as_str),
        );

        let vars = self.service.template_vars(&version);
        let outcomes = self
            .dispatcher
            .dispatch(
                &self.service.id,
                &vars,
                &self.service.notify,
                &self.service.command,
                &self.service.webhook,
                &self.cfg,
                token,
            )
            .await;

        for outcome in outcomes {
            let failed = !outcome.ok;
            match outcome.key {
                ActionKey::Notify(id) => self.status.set_notify_fail(&id, failed),
                ActionKey::Command(index) => self.status.set_command_fail(index, failed),
                ActionKey::Webhook(id) => self.status.set_webhook_fail(&id, failed),
            }
        }
    }
}

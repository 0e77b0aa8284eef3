//! # Action dispatcher.
//!
//! Fans out every configured action of a service when a promotion clears the
//! approval gate. All three families run concurrently, and actions within a
//! family run in parallel too; each action owns its delay/retry schedule:
//!
//! ```text
//! promotion ──► Dispatcher::dispatch
//!                  ├─► notify[discord]   delay → send → backoff → ...
//!                  ├─► notify[smtp]      ...
//!                  ├─► command[0]        ...
//!                  ├─► webhook[deploy]   ... ──(exhausted, !silent_fails)──► cascade
//!                  └─► webhook[audit]    ...
//! ```
//!
//! Each finished action publishes `ActionSucceeded`/`ActionFailed` on the
//! announce bus and reports to the metrics observer. `dispatch` returns once
//! every action has succeeded, exhausted its retries, or been cancelled.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ActionError;
use crate::events::{Bus, Event, EventKind};
use crate::metrics::Observe;
use crate::template::TemplateVars;

use super::notify::{NotificationRouter, Notify};
use super::retry::{run_with_retries, RetryOutcome, RetryPolicy};
use super::command::ShellCommand;
use super::webhook::WebHook;

/// Which configured action an outcome belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKey {
    Notify(String),
    Command(usize),
    Webhook(String),
}

/// Terminal result of one action's dispatch round.
#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    pub key: ActionKey,
    /// Action family (`notify`, `command`, `webhook`).
    pub kind: &'static str,
    /// `false` covers both exhaustion and cancellation.
    pub ok: bool,
    /// Attempts consumed (0 when cancelled before the first).
    pub attempts: u32,
    /// Final error for exhausted actions.
    pub error: Option<String>,
}

/// Fans actions out and funnels their results back.
pub struct Dispatcher {
    router: Arc<dyn NotificationRouter>,
    metrics: Arc<dyn Observe>,
    bus: Bus,
}

impl Dispatcher {
    pub fn new(router: Arc<dyn NotificationRouter>, metrics: Arc<dyn Observe>, bus: Bus) -> Self {
        Self {
            router,
            metrics,
            bus,
        }
    }

    /// Runs every action of the service for one promotion.
    ///
    /// Returns when all actions reached a terminal state. The caller applies
    /// the outcomes to the service's fail flags (single-writer status).
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        service_id: &str,
        vars: &TemplateVars,
        notifiers: &BTreeMap<String, Notify>,
        commands: &[ShellCommand],
        webhooks: &BTreeMap<String, WebHook>,
        cfg: &Config,
        token: &CancellationToken,
    ) -> Vec<DispatchOutcome> {
        info!(
            "service {service_id:?}: dispatching {} notifier(s), {} command(s), {} webhook(s) for version {:?}",
            notifiers.len(),
            commands.len(),
            webhooks.len(),
            vars.version
        );

        let mut set: JoinSet<DispatchOutcome> = JoinSet::new();

        for (id, notify) in notifiers {
            let policy = RetryPolicy {
                delay: notify.delay(),
                max_tries: notify.max_tries(cfg),
                backoff: cfg.retry_backoff,
            };
            let notify = notify.clone();
            let id = id.clone();
            let router = Arc::clone(&self.router);
            let vars = vars.clone();
            let token = token.clone();
            set.spawn(async move {
                let label = format!("notify {id:?}");
                let outcome = run_with_retries(policy, &label, &token, |_n| {
                    let notify = notify.clone();
                    let router = Arc::clone(&router);
                    let vars = vars.clone();
                    async move { notify.send_once(router.as_ref(), &vars).await }
                })
                .await;
                into_outcome(ActionKey::Notify(id), "notify", outcome)
            });
        }

        for (index, command) in commands.iter().enumerate() {
            let policy = RetryPolicy {
                delay: command.delay.unwrap_or_default(),
                max_tries: command.max_tries.unwrap_or(cfg.max_tries),
                backoff: cfg.retry_backoff,
            };
            let command = command.clone();
            let vars = vars.clone();
            let cfg = cfg.clone();
            let token = token.clone();
            set.spawn(async move {
                let label = format!("command {:?}", command.display());
                let outcome = run_with_retries(policy, &label, &token, |_n| {
                    let command = command.clone();
                    let vars = vars.clone();
                    let cfg = cfg.clone();
                    async move { command.run_once(&vars, &cfg).await }
                })
                .await;
                into_outcome(ActionKey::Command(index), "command", outcome)
            });
        }

        for (id, webhook) in webhooks {
            let policy = RetryPolicy {
                delay: webhook.delay.unwrap_or_default(),
                max_tries: webhook.max_tries.unwrap_or(cfg.max_tries),
                backoff: cfg.retry_backoff,
            };
            let webhook = webhook.clone();
            let id = id.clone();
            let cascade = self.cascade_notifiers(&webhook, notifiers);
            let router = Arc::clone(&self.router);
            let vars = vars.clone();
            let cfg = cfg.clone();
            let token = token.clone();
            set.spawn(async move {
                let label = format!("webhook {id:?}");
                let outcome = run_with_retries(policy, &label, &token, |_n| {
                    let webhook = webhook.clone();
                    let vars = vars.clone();
                    let cfg = cfg.clone();
                    async move { webhook.send_once(&vars, &cfg).await }
                })
                .await;

                if matches!(outcome, RetryOutcome::Exhausted { .. }) && !webhook.silent_fails {
                    cascade_failure(&webhook, &cascade, router.as_ref(), &vars, &cfg, &token)
                        .await;
                }
                into_outcome(ActionKey::Webhook(id), "webhook", outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.report(service_id, &vars.version, &outcome);
                    outcomes.push(outcome);
                }
                Err(e) => warn!("service {service_id:?}: action task panicked: {e}"),
            }
        }
        outcomes
    }

    /// The notifiers a webhook falls back to on final failure.
    fn cascade_notifiers(
        &self,
        webhook: &WebHook,
        notifiers: &BTreeMap<String, Notify>,
    ) -> Vec<Notify> {
        match &webhook.notify_override {
            Some(ids) => ids
                .iter()
                .filter_map(|id| notifiers.get(id).cloned())
                .collect(),
            None => notifiers.values().cloned().collect(),
        }
    }

    /// Publishes the announce event and metrics for one outcome.
    fn report(&self, service_id: &str, version: &str, outcome: &DispatchOutcome) {
        let id = match &outcome.key {
            ActionKey::Notify(id) | ActionKey::Webhook(id) => id.clone(),
            ActionKey::Command(index) => index.to_string(),
        };
        self.metrics
            .action_result(service_id, outcome.kind, &id, outcome.ok);

        let kind = if outcome.ok {
            EventKind::ActionSucceeded
        } else {
            EventKind::ActionFailed
        };
        let mut ev = Event::now(kind)
            .with_service(service_id)
            .with_version(version)
            .with_action(outcome.kind, id)
            .with_attempt(outcome.attempts);
        if let Some(err) = &outcome.error {
            ev = ev.with_error(err.clone());
        }
        self.bus.publish(ev);
    }
}

/// Sends the cascade notifications for an exhausted webhook.
async fn cascade_failure(
    webhook: &WebHook,
    notifiers: &[Notify],
    router: &dyn NotificationRouter,
    vars: &TemplateVars,
    cfg: &Config,
    token: &CancellationToken,
) {
    let message = format!(
        "webhook {:?} failed for {} version {}",
        webhook.id, vars.service_id, vars.version
    );

    for notify in notifiers {
        let policy = RetryPolicy {
            delay: std::time::Duration::ZERO,
            max_tries: notify.max_tries(cfg),
            backoff: cfg.retry_backoff,
        };
        let label = format!("cascade notify {:?}", notify.id);
        let message = message.clone();
        let outcome = run_with_retries(policy, &label, token, |_n| {
            let notify = notify.clone();
            let vars = vars.clone();
            let message = message.clone();
            async move {
                let url = notify.build_url(&vars);
                router.send(&url, &notify.title(&vars), &message).await
            }
        })
        .await;
        if !outcome.is_success() {
            warn!("cascade for webhook {:?} could not notify", webhook.id);
        }
    }
}

fn into_outcome(key: ActionKey, kind: &'static str, outcome: RetryOutcome) -> DispatchOutcome {
    match outcome {
        RetryOutcome::Success { attempt } => DispatchOutcome {
            key,
            kind,
            ok: true,
            attempts: attempt,
            error: None,
        },
        RetryOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            let id = match &key {
                ActionKey::Notify(id) | ActionKey::Webhook(id) => id.clone(),
                ActionKey::Command(index) => index.to_string(),
            };
            let err = ActionError::Exhausted {
                kind,
                id,
                tries: attempts,
                reason: last_error,
            };
            DispatchOutcome {
                key,
                kind,
                ok: false,
                attempts,
                error: Some(err.to_string()),
            }
        }
        RetryOutcome::Cancelled => DispatchOutcome {
            key,
            kind,
            ok: false,
            attempts: 0,
            error: Some("cancelled".to_string()),
        },
    }
}

//! # Abstract metrics observer.
//!
//! The engine never talks to a metrics registry directly; it reports through
//! [`Observe`], and the embedding daemon maps the calls onto its counters and
//! gauges. [`NoopObserve`] is the default when no registry is wired up.
//!
//! ## Semantics
//! - `latest_version_query` / `deployed_version_query` carry gauge semantics:
//!   `ok` flips the per-service liveness between 1 (`true`) and 0 (`false`).
//! - `action_result` carries counter semantics: one increment per finished
//!   action attempt series (success or exhaustion).

/// Sink for runtime measurements.
///
/// Implementations must be cheap and non-blocking; they are called from every
/// poller and dispatcher task.
pub trait Observe: Send + Sync + 'static {
    /// A latest-version poll finished; `ok` is the liveness gauge value.
    fn latest_version_query(&self, service_id: &str, ok: bool) {
        let _ = (service_id, ok);
    }

    /// A deployed-version poll finished; `ok` is the liveness gauge value.
    fn deployed_version_query(&self, service_id: &str, ok: bool) {
        let _ = (service_id, ok);
    }

    /// An action finished its dispatch round.
    ///
    /// `kind` is one of `notify`, `command`, `webhook`; `id` is the
    /// configured action identifier.
    fn action_result(&self, service_id: &str, kind: &'static str, id: &str, ok: bool) {
        let _ = (service_id, kind, id, ok);
    }
}

/// Observer that discards every measurement.
pub struct NoopObserve;

impl Observe for NoopObserve {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        actions: AtomicUsize,
    }

    impl Observe for Counting {
        fn action_result(&self, _service: &str, _kind: &'static str, _id: &str, _ok: bool) {
            self.actions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn custom_observer_receives_calls() {
        let obs = Arc::new(Counting {
            actions: AtomicUsize::new(0),
        });
        let dyn_obs: Arc<dyn Observe> = obs.clone();
        dyn_obs.latest_version_query("svc", true);
        dyn_obs.action_result("svc", "webhook", "wh-1", false);
        assert_eq!(obs.actions.load(Ordering::Relaxed), 1);
    }
}

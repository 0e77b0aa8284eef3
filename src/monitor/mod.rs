//! Runtime core: orchestration and lifecycle.
//!
//! ## Files & responsibilities
//! - **orchestrator.rs**: public facade; owns the runtime (Bus, SubscriberSet,
//!   persistence worker, Dispatcher), registers/removes runners, routes
//!   control commands, drives graceful shutdown.
//! - **runner.rs**: per-service loop (single status writer): tickers for the
//!   latest/deployed lookups, control channel, approval gate, dispatch.
//! - **shutdown.rs**: cross-platform OS signal handling used by `Monitor`.
//!
//! ## Event data-plane (who publishes & who consumes)
//!
//! Producers (publish to Bus):
//! - **Monitor**    → `ServiceAdded`, `ServiceRemoved`, `ShutdownRequested`,
//!   `AllStoppedWithin`, `GraceExceeded`
//! - **Runner**     → `NewLatestVersion`, `LatestQueryFailed`,
//!   `DeployedVersionUpdated`, `VersionApproved`, `VersionSkipped`
//!   (via its Status)
//! - **Dispatcher** → `ActionSucceeded`, `ActionFailed`
//! - **SubscriberSet workers** → `SubscriberOverflow`, `SubscriberPanicked`
//!
//! Consumers (subscribe to Bus):
//! - **Monitor's hub listener** (single fan-out point) → `SubscriberSet`
//!   (per-subscriber mpsc queues, drop-on-slow)
//! - Any external `subscribe()` caller (WebSocket hub, tests)
//!
//! ## Shutdown timeline
//! ```text
//! OS signal → Monitor publishes ShutdownRequested → cancel runtime token
//! → each Runner drains (finishes in-flight dispatch, saves status)
//! → AllStoppedWithin OR GraceExceeded{grace, stuck}
//! ```

mod orchestrator;
mod runner;
mod shutdown;

pub use orchestrator::Monitor;
pub use runner::{Runner, ServiceCommand};
pub use shutdown::wait_for_shutdown_signal;

//! # argus
//!
//! **Argus** is a release-monitoring engine: it watches software projects for
//! new versions and, on discovering one, announces it, optionally waits for
//! operator approval, and dispatches side-effects (notifications, shell
//! commands, and HTTP webhooks) with bounded retries. The *deployed* version
//! of each service is tracked independently so operators can see drift
//! between "latest available" and "what is running".
//!
//! The crate is the engine only; HTTP APIs, YAML loading, metrics registries
//! and storage plug in through the traits at the seams.
//!
//! ## Features
//!
//! | Area                 | Description                                                    | Key types / traits                         |
//! |----------------------|----------------------------------------------------------------|--------------------------------------------|
//! | **Resolution**       | URL scrape or GitHub releases → one version string.            | [`LatestLookup`], [`UrlCommand`]           |
//! | **Filtering**        | Regex/command/registry predicates gating promotion.            | [`Require`], [`DockerCheck`]               |
//! | **Deployed tracking**| Independent poll of the running instance.                      | [`DeployedLookup`]                         |
//! | **Dispatch**         | Concurrent notify/command/webhook fan-out with retries.        | [`Dispatcher`], [`NotificationRouter`]     |
//! | **Orchestration**    | Per-service runners, control commands, graceful shutdown.      | [`Monitor`], [`ServiceCommand`]            |
//! | **Events**           | Bounded announce broadcast with drop-on-slow subscribers.      | [`Event`], [`Bus`], [`Subscribe`]          |
//! | **Persistence**      | Ordered status mirror through a bounded channel.               | [`StatusSink`]                             |
//!
//! ```no_run
//! use std::sync::Arc;
//! use argus::{
//!     Config, LatestLookup, Monitor, NoopObserve, NoopSink, Service, UrlCommand, UrlLookup,
//! };
//! # use async_trait::async_trait;
//! # struct MyRouter;
//! # #[async_trait]
//! # impl argus::NotificationRouter for MyRouter {
//! #     async fn send(&self, _u: &str, _t: &str, _m: &str) -> Result<(), String> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Monitor::new(
//!         Config::default(),
//!         Arc::new(MyRouter),
//!         Arc::new(NoopObserve),
//!         Arc::new(NoopSink),
//!         Vec::new(),
//!     );
//!
//!     let service = Service::new(
//!         "argus",
//!         LatestLookup::url(UrlLookup {
//!             url: "https://release-argus.io/demo".into(),
//!             url_commands: vec![UrlCommand::Regex {
//!                 pattern: r#"stable version: "v?([0-9.]+)""#.into(),
//!                 index: 0,
//!                 template: None,
//!             }],
//!             ..UrlLookup::default()
//!         }),
//!     );
//!     monitor.add_service(service, None).await?;
//!     monitor.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod http;
mod metrics;
mod template;
mod util;

pub mod actions;
pub mod deployed;
pub mod events;
pub mod latest;
pub mod monitor;
pub mod persist;
pub mod service;
pub mod subscribers;

// ---- Public re-exports ----

pub use actions::{
    ActionKey, DispatchOutcome, Dispatcher, NotificationRouter, Notify, NotifyBundle,
    RetryPolicy, ShellCommand, WebHook, WebHookType,
};
pub use config::Config;
pub use deployed::DeployedLookup;
pub use error::{ActionError, QueryError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use http::{BasicAuth, Header};
pub use latest::{
    DockerCheck, GitHubLookup, LatestLookup, Registry, Require, UrlCommand, UrlLookup,
};
pub use metrics::{NoopObserve, Observe};
pub use monitor::{Monitor, ServiceCommand};
pub use persist::{DbMessage, NoopSink, StatusField, StatusSink};
pub use service::{Dashboard, Service, ServiceOptions, StatusReader, StatusSnapshot};
pub use subscribers::{LogWriter, Subscribe};
pub use template::{check, render, TemplateVars};
pub use util::parse_duration;

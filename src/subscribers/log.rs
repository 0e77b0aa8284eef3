//! # Logging subscriber.
//!
//! [`LogWriter`] forwards announce events to the `log` facade in a compact
//! key=value format. Useful as the default subscriber for daemons that have a
//! logger installed but no richer sink.
//!
//! ## Output format
//! ```text
//! [new-version] service=argus version=1.2.3
//! [query-failed] service=argus err="regression ..."
//! [action-ok] service=argus kind=webhook id=wh-main attempt=2
//! [action-fail] service=argus kind=notify id=discord err="..."
//! [shutdown-requested]
//! ```

use async_trait::async_trait;
use log::{info, warn};

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Subscriber that renders events through the `log` facade.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::NewLatestVersion => {
                info!(
                    "[new-version] service={service} version={}",
                    e.version.as_deref().unwrap_or("-")
                );
            }
            EventKind::LatestQueryFailed => {
                warn!(
                    "[query-failed] service={service} err={:?}",
                    e.error.as_deref().unwrap_or("-")
                );
            }
            EventKind::DeployedVersionUpdated => {
                info!(
                    "[deployed] service={service} version={}",
                    e.version.as_deref().unwrap_or("-")
                );
            }
            EventKind::VersionApproved => {
                info!(
                    "[approved] service={service} version={}",
                    e.version.as_deref().unwrap_or("-")
                );
            }
            EventKind::VersionSkipped => {
                info!(
                    "[skipped] service={service} version={}",
                    e.version.as_deref().unwrap_or("-")
                );
            }
            EventKind::ActionSucceeded => {
                info!(
                    "[action-ok] service={service} kind={} id={} attempt={:?}",
                    e.action_kind.unwrap_or("-"),
                    e.action_id.as_deref().unwrap_or("-"),
                    e.attempt
                );
            }
            EventKind::ActionFailed => {
                warn!(
                    "[action-fail] service={service} kind={} id={} err={:?}",
                    e.action_kind.unwrap_or("-"),
                    e.action_id.as_deref().unwrap_or("-"),
                    e.error.as_deref().unwrap_or("-")
                );
            }
            EventKind::ServiceAdded => info!("[service-added] service={service}"),
            EventKind::ServiceRemoved => info!("[service-removed] service={service}"),
            EventKind::ShutdownRequested => info!("[shutdown-requested]"),
            EventKind::AllStoppedWithin => info!("[all-stopped-within-grace]"),
            EventKind::GraceExceeded => warn!("[grace-exceeded]"),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!("[subscriber] err={:?}", e.error.as_deref().unwrap_or("-"));
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

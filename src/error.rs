//! # Error types used by the monitoring runtime and its queries.
//!
//! This module defines three error enums:
//!
//! - [`QueryError`] errors raised while resolving a latest/deployed version.
//! - [`ActionError`] errors raised while dispatching notifiers, commands and webhooks.
//! - [`RuntimeError`] errors raised by the orchestration runtime itself.
//!
//! All types provide `as_label` returning a short stable string for logs and
//! metrics. [`QueryError`] additionally classifies itself with `is_transient()`:
//! transient failures are retried at the next poll interval and never mark a
//! service unhealthy beyond flipping the liveness gauge.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while resolving a version (latest or deployed).
///
/// The variants mirror the failure taxonomy surfaced to operators: each maps
/// to one compact label, and the rendered message never contains credentials.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum QueryError {
    /// Connection-level failure (DNS, refused, reset, timeout).
    #[error("network error: {reason}")]
    Network { reason: String },

    /// TLS negotiation failure (distinct from generic network errors so that
    /// `allow_invalid_certs` misconfiguration is visible at a glance).
    #[error("tls error: {reason}")]
    Tls { reason: String },

    /// Upstream answered with a non-2xx status code.
    #[error("unexpected response status: {code}")]
    Status { code: u16 },

    /// Body could not be decoded (JSON, UTF-8).
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// A regex or split found nothing to work with.
    /// `snippet` holds at most the first 64 bytes of the searched text.
    #[error("{pattern:?} didn't match on {snippet:?}")]
    NoMatch { pattern: String, snippet: String },

    /// An element index fell outside the matched/split set.
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: isize, len: usize },

    /// The new candidate failed semantic-version parsing.
    #[error("failed to convert {version:?} to a semantic version")]
    InvalidSemver { version: String },

    /// The *stored* version fails semantic-version parsing; the operator must
    /// correct the stored state (or disable semantic versioning).
    #[error("stored version {version:?} is not a semantic version; correct it or disable semantic_versioning")]
    StaleInvalidSemver { version: String },

    /// Candidate is older than the version already promoted.
    #[error("version {candidate:?} is older than the current {current:?}")]
    Regression { candidate: String, current: String },

    /// Every release was filtered out (e.g. all pre-releases).
    #[error("no releases matched the filters")]
    NoReleasesMatch,

    /// A promotion filter vetoed the candidate.
    #[error("filter {filter} rejected version {version:?}: {reason}")]
    FilterFail {
        filter: &'static str,
        version: String,
        reason: String,
    },

    /// Lookup configuration cannot be used (bad regex, bad URL, ...).
    #[error("invalid config: {reason}")]
    ConfigInvalid { reason: String },
}

impl QueryError {
    /// Returns a short stable label (kebab-case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueryError::Network { .. } => "network",
            QueryError::Tls { .. } => "tls",
            QueryError::Status { .. } => "status-non-2xx",
            QueryError::Parse { .. } => "parse",
            QueryError::NoMatch { .. } => "no-match",
            QueryError::IndexOutOfRange { .. } => "index-out-of-range",
            QueryError::InvalidSemver { .. } => "invalid-semver",
            QueryError::StaleInvalidSemver { .. } => "stale-invalid-semver",
            QueryError::Regression { .. } => "regression",
            QueryError::NoReleasesMatch => "no-releases-match",
            QueryError::FilterFail { .. } => "filter-fail",
            QueryError::ConfigInvalid { .. } => "config-invalid",
        }
    }

    /// Transient failures are logged and retried at the next interval;
    /// the rest are surfaced in status and broadcast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueryError::Network { .. }
                | QueryError::Tls { .. }
                | QueryError::Status { .. }
                | QueryError::Parse { .. }
                | QueryError::NoMatch { .. }
        )
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors render their URL; strip it so credentials embedded
        // in lookup URLs never reach logs or status.
        if let Some(code) = e.status() {
            QueryError::Status { code: code.as_u16() }
        } else if e.is_decode() || e.is_body() {
            QueryError::Parse {
                reason: sanitize_reqwest(e),
            }
        } else {
            QueryError::Network {
                reason: sanitize_reqwest(e),
            }
        }
    }
}

/// Renders a reqwest error without its URL component.
fn sanitize_reqwest(e: reqwest::Error) -> String {
    use std::error::Error as _;

    let stripped = e.without_url();
    match stripped.source() {
        Some(src) => format!("{stripped}: {src}"),
        None => stripped.to_string(),
    }
}

/// Errors produced while dispatching a single action.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActionError {
    /// The action failed on every attempt it was allowed.
    #[error("{kind} {id:?} failed after {tries} attempt(s): {reason}")]
    Exhausted {
        /// Action family (`notify`, `command`, `webhook`).
        kind: &'static str,
        /// The configured identifier of the action.
        id: String,
        /// Attempts consumed (== `max_tries`).
        tries: u32,
        /// Final attempt's failure, rendered compactly.
        reason: String,
    },

    /// Command wall-clock budget expired; the process (group) was killed.
    #[error("command {id:?} timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    /// The action cannot be built from its configuration.
    #[error("invalid config for {kind} {id:?}: {reason}")]
    ConfigInvalid {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

impl ActionError {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Exhausted { .. } => "action-fail",
            ActionError::Timeout { .. } => "action-timeout",
            ActionError::ConfigInvalid { .. } => "config-invalid",
        }
    }
}

/// Errors produced by the monitoring runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some runners remained stuck.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Service identifiers that did not stop in time.
        stuck: Vec<String>,
    },

    /// Attempted to watch a service whose identifier is already registered.
    #[error("service {id:?} is already being monitored")]
    ServiceAlreadyExists { id: String },

    /// Attempted to address a service that is not registered.
    #[error("service {id:?} is not being monitored")]
    ServiceNotFound { id: String },
}

impl RuntimeError {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::ServiceAlreadyExists { .. } => "runtime_service_already_exists",
            RuntimeError::ServiceNotFound { .. } => "runtime_service_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_labels_are_stable() {
        assert_eq!(QueryError::Status { code: 404 }.as_label(), "status-non-2xx");
        assert_eq!(
            QueryError::Regression {
                candidate: "1.0.0".into(),
                current: "1.2.0".into()
            }
            .as_label(),
            "regression"
        );
        assert_eq!(QueryError::NoReleasesMatch.as_label(), "no-releases-match");
    }

    #[test]
    fn transient_classification() {
        assert!(QueryError::Network {
            reason: "refused".into()
        }
        .is_transient());
        assert!(QueryError::Status { code: 500 }.is_transient());
        assert!(!QueryError::Regression {
            candidate: "1.0.0".into(),
            current: "1.2.0".into()
        }
        .is_transient());
        assert!(!QueryError::InvalidSemver { version: "x".into() }.is_transient());
    }

    #[test]
    fn no_match_renders_snippet() {
        let e = QueryError::NoMatch {
            pattern: "v([0-9]+)".into(),
            snippet: "hello world".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("v([0-9]+)"));
        assert!(msg.contains("hello world"));
    }
}

//! # Latest-version resolution.
//!
//! One poll runs the pipeline `fetch → extract → filter → compare → promote`:
//!
//! ```text
//! UrlLookup / GitHubLookup ──► candidate ──► Require filters
//!                                                │pass
//!              status.latest_version ◄── promote ┘
//! ```
//!
//! ## Contents
//! - [`UrlCommand`], [`run_pipeline`] text-transform chain
//! - [`UrlLookup`] page-scrape variant
//! - [`GitHubLookup`] releases-API variant with ETag caching
//! - [`Require`] promotion filters (regex/command/docker)
//! - [`LatestLookup`] the combined per-service query operation
//!
//! ## Comparison rules
//! With semantic versioning on (the default), both the candidate and the
//! stored version must parse (after coercion: leading `v` stripped, missing
//! `.minor`/`.patch` padded with zeros). An unparseable candidate fails with
//! `invalid-semver`; an unparseable *stored* version fails with
//! `stale-invalid-semver` and needs operator attention. With semantic
//! versioning off, versions order lexicographically.

pub mod command;
pub mod github;
pub mod require;
pub mod url;

pub use command::{run_pipeline, UrlCommand};
pub use github::{GitHubData, GitHubLookup};
pub use require::{DockerCheck, Registry, Require};
pub use url::UrlLookup;

use std::cmp::Ordering;

use log::{debug, info};
use semver::Version;

use crate::config::Config;
use crate::error::QueryError;
use crate::service::{ServiceOptions, Status};
use crate::template::TemplateVars;

/// Which upstream a service resolves its latest version from.
#[derive(Clone, Debug)]
pub enum LookupKind {
    Url(UrlLookup),
    GitHub(GitHubLookup),
}

/// The per-service latest-version query operation.
#[derive(Clone, Debug)]
pub struct LatestLookup {
    pub kind: LookupKind,
    pub require: Require,
}

impl LatestLookup {
    pub fn url(lookup: UrlLookup) -> Self {
        Self {
            kind: LookupKind::Url(lookup),
            require: Require::default(),
        }
    }

    pub fn github(lookup: GitHubLookup) -> Self {
        Self {
            kind: LookupKind::GitHub(lookup),
            require: Require::default(),
        }
    }

    /// Polls upstream once.
    ///
    /// Returns `Ok(true)` when a new version was promoted into `status`,
    /// `Ok(false)` when upstream is unchanged. Filters veto with
    /// `filter-fail`; comparison problems surface per the taxonomy.
    pub async fn query(
        &mut self,
        status: &mut Status,
        opts: &ServiceOptions,
        vars: &TemplateVars,
        cfg: &Config,
    ) -> Result<bool, QueryError> {
        status.set_last_queried();

        let candidate = match &mut self.kind {
            LookupKind::Url(lookup) => lookup.fetch_candidate(cfg).await?,
            LookupKind::GitHub(lookup) => lookup.fetch_candidate(cfg).await?,
        };

        let current = status.latest_version().to_string();
        match is_newer(&candidate, &current, opts.semantic_versioning())? {
            None => {
                debug!(
                    "latest-version query for {:?}: {candidate:?} unchanged",
                    status.service_id()
                );
                Ok(false)
            }
            Some(false) => Err(QueryError::Regression {
                candidate,
                current,
            }),
            Some(true) => {
                let mut filter_vars = vars.clone();
                filter_vars.version = candidate.clone();
                self.require.check(&candidate, &filter_vars, cfg).await?;

                info!(
                    "service {:?}: new latest version {candidate:?}",
                    status.service_id()
                );
                status.set_latest_version(&candidate).await;
                Ok(true)
            }
        }
    }
}

/// Orders `candidate` against `current`.
///
/// - `Ok(None)` → equal (no change)
/// - `Ok(Some(true))` → candidate is newer (or `current` is empty)
/// - `Ok(Some(false))` → candidate is older (regression)
pub fn is_newer(
    candidate: &str,
    current: &str,
    semantic: bool,
) -> Result<Option<bool>, QueryError> {
    if current.is_empty() {
        // First resolution; nothing to regress from.
        if semantic && coerce_semver(candidate).is_none() {
            return Err(QueryError::InvalidSemver {
                version: candidate.to_string(),
            });
        }
        return Ok(Some(true));
    }

    let ordering = if semantic {
        let new = coerce_semver(candidate).ok_or_else(|| QueryError::InvalidSemver {
            version: candidate.to_string(),
        })?;
        let cur = coerce_semver(current).ok_or_else(|| QueryError::StaleInvalidSemver {
            version: current.to_string(),
        })?;
        new.cmp(&cur)
    } else {
        candidate.cmp(current)
    };

    Ok(match ordering {
        Ordering::Equal => None,
        Ordering::Greater => Some(true),
        Ordering::Less => Some(false),
    })
}

/// Parses a version leniently: strips a leading `v`, pads a missing minor or
/// patch with `.0`, keeps any `-prerelease`/`+build` tail.
pub fn coerce_semver(version: &str) -> Option<Version> {
    let bare = version.strip_prefix(['v', 'V']).unwrap_or(version);
    if bare.is_empty() {
        return None;
    }

    let tail_at = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, tail) = bare.split_at(tail_at);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), tail)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_pads_and_strips() {
        assert_eq!(coerce_semver("v1.2.3").unwrap(), Version::parse("1.2.3").unwrap());
        assert_eq!(coerce_semver("1.2").unwrap(), Version::parse("1.2.0").unwrap());
        assert_eq!(coerce_semver("2").unwrap(), Version::parse("2.0.0").unwrap());
        assert_eq!(
            coerce_semver("1.2.3-rc1").unwrap(),
            Version::parse("1.2.3-rc1").unwrap()
        );
        assert!(coerce_semver("latest").is_none());
        assert!(coerce_semver("").is_none());
        assert!(coerce_semver("1.2.3.4").is_none());
    }

    #[test]
    fn ordering_is_reflexive_and_antisymmetric() {
        let versions = ["0.9.0", "1.0.0", "1.0.1", "1.1.0-rc1", "1.1.0"];
        for a in versions {
            // Reflexive: every version equals itself.
            assert_eq!(is_newer(a, a, true).unwrap(), None);
            for b in versions {
                // Antisymmetric: a>b implies b<a.
                if is_newer(a, b, true).unwrap() == Some(true) {
                    assert_eq!(is_newer(b, a, true).unwrap(), Some(false));
                }
            }
        }
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert_eq!(is_newer("1.1.0", "1.1.0-rc1", true).unwrap(), Some(true));
        assert_eq!(is_newer("1.1.0-rc1", "1.1.0", true).unwrap(), Some(false));
    }

    #[test]
    fn empty_current_promotes_first_candidate() {
        assert_eq!(is_newer("1.2.3", "", true).unwrap(), Some(true));
        assert!(matches!(
            is_newer("not-a-version", "", true),
            Err(QueryError::InvalidSemver { .. })
        ));
    }

    #[test]
    fn unparseable_inputs_map_to_the_right_label() {
        assert!(matches!(
            is_newer("garbage", "1.0.0", true),
            Err(QueryError::InvalidSemver { .. })
        ));
        assert!(matches!(
            is_newer("1.0.1", "garbage", true),
            Err(QueryError::StaleInvalidSemver { .. })
        ));
    }

    #[test]
    fn lexicographic_when_semantic_is_off() {
        assert_eq!(is_newer("2021-06", "2021-05", false).unwrap(), Some(true));
        assert_eq!(is_newer("abc", "abd", false).unwrap(), Some(false));
        assert_eq!(is_newer("same", "same", false).unwrap(), None);
        // Strings that aren't semver at all are fine here.
        assert_eq!(is_newer("build-10", "", false).unwrap(), Some(true));
    }
}

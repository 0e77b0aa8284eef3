//! # GitHub latest-version lookup.
//!
//! Queries the releases API for `owner/repo` with conditional requests:
//! the last `ETag` is replayed via `If-None-Match`, and a `304` answer reuses
//! the cached release list without re-parsing anything.
//!
//! ## Cache behaviour
//! - `200` → store the new ETag **and** the releases it came with (monotonic:
//!   a new ETag always replaces both).
//! - `304` → reuse the cached releases; upstream has not changed.
//! - A `200` with an **empty** release list whose ETag equals the process-wide
//!   empty-list sentinel flips the lookup to the `/tags` endpoint (tags carry
//!   no prerelease flag and are treated as full releases).
//!
//! The sentinel is captured once per process from a probe against a repo
//! known to have zero releases; it is never hard-coded.

use std::sync::OnceLock;

use log::{debug, info};
use serde::Deserialize;

use crate::config::Config;
use crate::error::QueryError;
use crate::http;

use super::command::{run_pipeline, UrlCommand};

/// Repo with zero releases used to learn the empty-list ETag.
const EMPTY_LIST_PROBE_REPO: &str = "release-argus/.github";

/// API host for release/tag queries.
const API_BASE: &str = "https://api.github.com";

/// ETag the releases API returns for repositories with zero releases.
/// Captured once per process; read-only afterwards.
static EMPTY_LIST_ETAG: OnceLock<String> = OnceLock::new();

/// One release as returned by the releases endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// One release asset (name + download URL is all the engine needs).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Whether a poll round hit or refreshed the release cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// `304`: upstream unchanged, cached releases reused.
    Hit,
    /// `200`: new ETag and releases stored.
    MissUpdated,
}

/// Conditional-request state: the ETag and the releases it vouches for.
#[derive(Clone, Debug, Default)]
pub struct GitHubData {
    etag: String,
    releases: Vec<Release>,
    /// Set once an empty release list matching the sentinel is seen.
    tag_fallback: bool,
}

impl GitHubData {
    /// The cached ETag ("" before the first successful query).
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// The cached releases.
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// True once the lookup switched to the `/tags` endpoint.
    pub fn tag_fallback(&self) -> bool {
        self.tag_fallback
    }

    /// Applies a `304 Not Modified` answer.
    pub fn apply_not_modified(&self) -> CacheOutcome {
        CacheOutcome::Hit
    }

    /// Applies a `200` answer from the releases endpoint.
    pub fn apply_ok(&mut self, etag: Option<&str>, body: &[u8]) -> Result<CacheOutcome, QueryError> {
        let releases: Vec<Release> =
            serde_json::from_slice(body).map_err(|e| QueryError::Parse {
                reason: format!("releases json: {e}"),
            })?;
        if let Some(etag) = etag {
            self.etag = etag.to_string();
        }
        if releases.is_empty() {
            if let Some(sentinel) = empty_list_etag() {
                if sentinel == self.etag {
                    self.tag_fallback = true;
                }
            }
        }
        self.releases = releases;
        Ok(CacheOutcome::MissUpdated)
    }

    /// Applies a `200` answer from the tags endpoint.
    ///
    /// Tags provide no prerelease flag; each is treated as a full release.
    pub fn apply_tags_ok(
        &mut self,
        etag: Option<&str>,
        body: &[u8],
    ) -> Result<CacheOutcome, QueryError> {
        let tags: Vec<TagEntry> = serde_json::from_slice(body).map_err(|e| QueryError::Parse {
            reason: format!("tags json: {e}"),
        })?;
        if let Some(etag) = etag {
            self.etag = etag.to_string();
        }
        self.releases = tags
            .into_iter()
            .map(|t| Release {
                tag_name: t.name,
                prerelease: false,
                ..Release::default()
            })
            .collect();
        Ok(CacheOutcome::MissUpdated)
    }
}

/// Latest-version lookup against the GitHub releases API.
#[derive(Clone, Debug, Default)]
pub struct GitHubLookup {
    /// `owner/repo`.
    pub repo: String,
    /// Personal access token for private repos / higher rate limits.
    pub access_token: Option<String>,
    /// Keep prereleases as candidates.
    pub use_prerelease: bool,
    /// Optional transform chain applied to the winning tag name.
    pub url_commands: Vec<UrlCommand>,
    /// Conditional-request cache.
    pub data: GitHubData,
}

impl GitHubLookup {
    /// Fetches (or reuses) the release list and returns the candidate version.
    pub async fn fetch_candidate(&mut self, cfg: &Config) -> Result<String, QueryError> {
        let outcome = self.refresh(cfg).await?;
        match outcome {
            CacheOutcome::Hit => info!("github lookup {:?}: ETag unchanged", self.repo),
            CacheOutcome::MissUpdated => info!("github lookup {:?}: ETag changed", self.repo),
        }
        self.candidate_from_cache()
    }

    /// Issues the conditional request and updates the cache.
    async fn refresh(&mut self, cfg: &Config) -> Result<CacheOutcome, QueryError> {
        let was_fallback = self.data.tag_fallback();
        let Some((etag, body)) = self.request(cfg, was_fallback).await? else {
            return Ok(self.data.apply_not_modified());
        };

        if was_fallback {
            return self.data.apply_tags_ok(etag.as_deref(), &body);
        }

        let outcome = self.data.apply_ok(etag.as_deref(), &body)?;
        if !self.data.tag_fallback() {
            return Ok(outcome);
        }
        // Empty release list matched the sentinel; follow up against /tags
        // immediately so this poll still produces a candidate.
        debug!(
            "github lookup {:?}: empty release list matches sentinel; falling back to /tags",
            self.repo
        );
        match self.request(cfg, true).await? {
            Some((etag, body)) => self.data.apply_tags_ok(etag.as_deref(), &body),
            None => Ok(self.data.apply_not_modified()),
        }
    }

    /// One conditional GET; `Ok(None)` means `304 Not Modified`.
    async fn request(
        &self,
        cfg: &Config,
        tags: bool,
    ) -> Result<Option<(Option<String>, bytes::Bytes)>, QueryError> {
        let endpoint = if tags {
            format!("{API_BASE}/repos/{}/tags", self.repo)
        } else {
            format!("{API_BASE}/repos/{}/releases", self.repo)
        };

        let client = http::build_client(cfg.http_timeout(), false)?;
        let mut req = client
            .get(&endpoint)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "Argus");
        if let Some(token) = &self.access_token {
            req = req.header("Authorization", format!("token {token}"));
        }
        if !self.data.etag().is_empty() {
            req = req.header("If-None-Match", self.data.etag().to_string());
        }

        let resp = req.send().await.map_err(http::classify)?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(QueryError::Status {
                code: status.as_u16(),
            });
        }

        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(http::classify)?;
        Ok(Some((etag, body)))
    }

    /// Reduces the cached releases to a single candidate version.
    pub fn candidate_from_cache(&self) -> Result<String, QueryError> {
        let winner = self
            .data
            .releases()
            .iter()
            .find(|r| self.use_prerelease || !r.prerelease)
            .ok_or(QueryError::NoReleasesMatch)?;

        let shaped = run_pipeline(&self.url_commands, &winner.tag_name)?;
        Ok(strip_v(&shaped).to_string())
    }
}

/// Strips one leading `v`/`V` from a tag name.
fn strip_v(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// The process-wide empty-list sentinel, if captured.
pub fn empty_list_etag() -> Option<&'static str> {
    EMPTY_LIST_ETAG.get().map(String::as_str)
}

/// Captures the empty-list sentinel from a probe request.
///
/// Called once during startup; later calls are no-ops once a value is set.
/// Failures are logged and skipped; the sentinel only enables the `/tags`
/// fallback, it is not required for normal operation.
pub async fn probe_empty_list_etag(cfg: &Config) {
    if EMPTY_LIST_ETAG.get().is_some() {
        return;
    }
    let url = format!("{API_BASE}/repos/{EMPTY_LIST_PROBE_REPO}/releases");
    let client = match http::build_client(cfg.http_timeout(), false) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("empty-list probe skipped: {e}");
            return;
        }
    };
    let resp = client
        .get(&url)
        .header("Accept", "application/vnd.github.v3+json")
        .header("User-Agent", "Argus")
        .send()
        .await;
    match resp {
        Ok(resp) if resp.status().is_success() => {
            if let Some(etag) = resp
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
            {
                let _ = EMPTY_LIST_ETAG.set(etag.to_string());
                debug!("captured empty-list ETag");
            }
        }
        Ok(resp) => log::warn!("empty-list probe got status {}", resp.status()),
        Err(e) => log::warn!("empty-list probe failed: {}", http::classify(e)),
    }
}

#[cfg(test)]
pub(crate) fn set_empty_list_etag_for_tests(etag: &str) {
    let _ = EMPTY_LIST_ETAG.set(etag.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn releases_body(tags: &[(&str, bool)]) -> Vec<u8> {
        let rendered: Vec<String> = tags
            .iter()
            .map(|(tag, pre)| format!(r#"{{"tag_name":"{tag}","prerelease":{pre}}}"#))
            .collect();
        format!("[{}]", rendered.join(",")).into_bytes()
    }

    #[test]
    fn unchanged_upstream_is_one_miss_then_hits() {
        let mut data = GitHubData::default();
        let body = releases_body(&[("v0.9.0", false)]);

        let first = data.apply_ok(Some("\"etag-1\""), &body).unwrap();
        let second = data.apply_not_modified();
        let third = data.apply_not_modified();

        assert_eq!(first, CacheOutcome::MissUpdated);
        assert_eq!(second, CacheOutcome::Hit);
        assert_eq!(third, CacheOutcome::Hit);
        assert_eq!(data.etag(), "\"etag-1\"");
        assert_eq!(data.releases().len(), 1);
    }

    #[test]
    fn new_etag_replaces_cache_monotonically() {
        let mut data = GitHubData::default();
        data.apply_ok(Some("\"a\""), &releases_body(&[("v1.0.0", false)]))
            .unwrap();
        data.apply_ok(Some("\"b\""), &releases_body(&[("v1.1.0", false), ("v1.0.0", false)]))
            .unwrap();
        assert_eq!(data.etag(), "\"b\"");
        assert_eq!(data.releases()[0].tag_name, "v1.1.0");
    }

    #[test]
    fn cached_releases_yield_candidate_after_hit() {
        let mut lookup = GitHubLookup {
            repo: "owner/repo".into(),
            ..GitHubLookup::default()
        };
        lookup
            .data
            .apply_ok(Some("\"e\""), &releases_body(&[("v0.9.0", false)]))
            .unwrap();
        // A later 304 leaves the cache usable.
        lookup.data.apply_not_modified();
        assert_eq!(lookup.candidate_from_cache().unwrap(), "0.9.0");
    }

    #[test]
    fn prereleases_drop_unless_requested() {
        let mut lookup = GitHubLookup {
            repo: "owner/repo".into(),
            ..GitHubLookup::default()
        };
        lookup
            .data
            .apply_ok(
                Some("\"e\""),
                &releases_body(&[("v2.0.0-rc1", true), ("v1.9.0", false)]),
            )
            .unwrap();
        assert_eq!(lookup.candidate_from_cache().unwrap(), "1.9.0");

        lookup.use_prerelease = true;
        assert_eq!(lookup.candidate_from_cache().unwrap(), "2.0.0-rc1");
    }

    #[test]
    fn all_filtered_out_is_no_releases_match() {
        let mut lookup = GitHubLookup {
            repo: "owner/repo".into(),
            ..GitHubLookup::default()
        };
        lookup
            .data
            .apply_ok(Some("\"e\""), &releases_body(&[("v2.0.0-rc1", true)]))
            .unwrap();
        assert!(matches!(
            lookup.candidate_from_cache(),
            Err(QueryError::NoReleasesMatch)
        ));
    }

    #[test]
    fn empty_list_matching_sentinel_enables_tag_fallback() {
        set_empty_list_etag_for_tests("\"empty-sentinel\"");
        let mut data = GitHubData::default();
        data.apply_ok(Some("\"empty-sentinel\""), b"[]").unwrap();
        assert!(data.tag_fallback());

        // Tags carry no prerelease flag; all become full releases.
        data.apply_tags_ok(Some("\"tags-etag\""), br#"[{"name":"v3.1.4"}]"#)
            .unwrap();
        assert_eq!(data.releases().len(), 1);
        assert!(!data.releases()[0].prerelease);
        assert_eq!(data.releases()[0].tag_name, "v3.1.4");
    }

    #[test]
    fn tag_names_strip_leading_v() {
        assert_eq!(strip_v("v1.2.3"), "1.2.3");
        assert_eq!(strip_v("V2.0.0"), "2.0.0");
        assert_eq!(strip_v("1.2.3"), "1.2.3");
    }
}

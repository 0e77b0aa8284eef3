//! # Deployed-version tracker.
//!
//! Polls the *running* instance of a service on its own interval, independent
//! of the latest-version lookup, so operators can see drift between "newest
//! available" and "what is deployed". A change updates
//! `status.deployed_version` and announces it; the tracker never triggers
//! action dispatch.

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::config::Config;
use crate::error::QueryError;
use crate::http::{self, BasicAuth, Header};
use crate::latest::coerce_semver;
use crate::service::{ServiceOptions, Status};

/// Poll of a user-supplied endpoint that reports the running version.
#[derive(Clone, Debug, Default)]
pub struct DeployedLookup {
    /// Endpoint reporting the running version.
    pub url: String,
    /// Accept invalid/self-signed certificates.
    pub allow_invalid_certs: bool,
    /// Optional HTTP Basic Auth.
    pub basic_auth: Option<BasicAuth>,
    /// Extra request headers.
    pub headers: Vec<Header>,
    /// Dotted JSON path to the version value (e.g. `"data.version"`).
    pub json: Option<String>,
    /// Regex over the raw body; first match, capture 1 if present.
    pub regex: Option<String>,
    /// Poll interval; `None` inherits the latest-version interval.
    pub interval: Option<std::time::Duration>,
}

impl DeployedLookup {
    /// Polls the endpoint once.
    ///
    /// Returns `Ok(true)` when the deployed version changed. An extraction
    /// that fails the semantic check leaves state untouched.
    pub async fn query(
        &self,
        status: &mut Status,
        opts: &ServiceOptions,
        cfg: &Config,
    ) -> Result<bool, QueryError> {
        let body = self.fetch_body(cfg).await?;
        let version = self.extract(&body)?;

        if opts.semantic_versioning() && coerce_semver(&version).is_none() {
            return Err(QueryError::InvalidSemver { version });
        }

        if status.deployed_version() == version {
            return Ok(false);
        }
        debug!(
            "service {:?}: deployed version now {version:?}",
            status.service_id()
        );
        status.set_deployed_version(&version).await;
        Ok(true)
    }

    /// Reduces the body to the version string via JSON path or regex.
    pub fn extract(&self, body: &str) -> Result<String, QueryError> {
        if let Some(path) = &self.json {
            return extract_json(body, path);
        }
        if let Some(pattern) = &self.regex {
            return extract_regex(body, pattern);
        }
        // No extractor: the body itself is the version.
        Ok(body.trim().to_string())
    }

    async fn fetch_body(&self, cfg: &Config) -> Result<String, QueryError> {
        let client = http::build_client(cfg.http_timeout(), self.allow_invalid_certs)?;
        let req = http::apply_auth_headers(
            client.get(&self.url),
            self.basic_auth.as_ref(),
            &self.headers,
        );
        let resp = req.send().await.map_err(http::classify)?;
        if !resp.status().is_success() {
            return Err(QueryError::Status {
                code: resp.status().as_u16(),
            });
        }
        resp.text().await.map_err(http::classify)
    }
}

/// Navigates a dotted path through a JSON document.
///
/// Array elements are addressed by numeric segments. Non-string leaves are
/// stringified (numbers, booleans).
fn extract_json(body: &str, path: &str) -> Result<String, QueryError> {
    let root: Value = serde_json::from_str(body).map_err(|e| QueryError::Parse {
        reason: format!("json body: {e}"),
    })?;

    let mut node = &root;
    for segment in path.split('.') {
        node = match node {
            Value::Object(map) => map.get(segment).ok_or_else(|| QueryError::NoMatch {
                pattern: path.to_string(),
                snippet: format!("missing key {segment:?}"),
            })?,
            Value::Array(items) => {
                let idx: usize = segment.parse().map_err(|_| QueryError::NoMatch {
                    pattern: path.to_string(),
                    snippet: format!("{segment:?} is not an array index"),
                })?;
                items.get(idx).ok_or(QueryError::IndexOutOfRange {
                    index: idx as isize,
                    len: items.len(),
                })?
            }
            _ => {
                return Err(QueryError::NoMatch {
                    pattern: path.to_string(),
                    snippet: format!("{segment:?} has no children"),
                })
            }
        };
    }

    Ok(match node {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// First regex match over the body; capture 1 if the pattern has one.
fn extract_regex(body: &str, pattern: &str) -> Result<String, QueryError> {
    let re = Regex::new(pattern).map_err(|e| QueryError::ConfigInvalid {
        reason: format!("deployed regex {pattern:?}: {e}"),
    })?;
    let caps = re.captures(body).ok_or_else(|| QueryError::NoMatch {
        pattern: pattern.to_string(),
        snippet: body.chars().take(64).collect(),
    })?;
    let m = caps.get(1).or_else(|| caps.get(0));
    Ok(m.map(|m| m.as_str()).unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_path_reads_nested_strings() {
        let body = r#"{"data":{"version":"1.2.3","build":7}}"#;
        assert_eq!(extract_json(body, "data.version").unwrap(), "1.2.3");
    }

    #[test]
    fn json_non_string_values_stringify() {
        let body = r#"{"version":1.2,"ok":true}"#;
        assert_eq!(extract_json(body, "version").unwrap(), "1.2");
        assert_eq!(extract_json(body, "ok").unwrap(), "true");
    }

    #[test]
    fn json_arrays_use_numeric_segments() {
        let body = r#"{"releases":[{"tag":"v9"},{"tag":"v8"}]}"#;
        assert_eq!(extract_json(body, "releases.0.tag").unwrap(), "v9");
        assert!(matches!(
            extract_json(body, "releases.5.tag"),
            Err(QueryError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn json_missing_key_is_no_match() {
        assert!(matches!(
            extract_json(r#"{"a":1}"#, "b"),
            Err(QueryError::NoMatch { .. })
        ));
    }

    #[test]
    fn regex_prefers_first_capture() {
        assert_eq!(
            extract_regex("version=1.4.2;", r"version=([0-9.]+)").unwrap(),
            "1.4.2"
        );
        assert_eq!(
            extract_regex("running 2.0.1", r"[0-9.]+").unwrap(),
            "2.0.1"
        );
    }

    #[test]
    fn bare_body_is_trimmed_version() {
        let lookup = DeployedLookup::default();
        assert_eq!(lookup.extract("  1.0.0\n").unwrap(), "1.0.0");
    }
}

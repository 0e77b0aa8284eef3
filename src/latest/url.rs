//! # URL latest-version lookup.
//!
//! Fetches a page (HTML, text, JSON, anything) and reduces the body to a
//! candidate version string through the URL-command pipeline.

use log::debug;

use crate::config::Config;
use crate::error::QueryError;
use crate::http::{self, BasicAuth, Header};

use super::command::{run_pipeline, UrlCommand};

/// How much of a response body is read into memory.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Latest-version lookup against an arbitrary URL.
#[derive(Clone, Debug, Default)]
pub struct UrlLookup {
    /// Page to fetch.
    pub url: String,
    /// Accept invalid/self-signed certificates.
    pub allow_invalid_certs: bool,
    /// Optional HTTP Basic Auth.
    pub basic_auth: Option<BasicAuth>,
    /// Extra request headers.
    pub headers: Vec<Header>,
    /// Transform chain reducing the body to a version.
    pub url_commands: Vec<UrlCommand>,
}

impl UrlLookup {
    /// Fetches the page and runs the pipeline, returning the candidate.
    pub async fn fetch_candidate(&self, cfg: &Config) -> Result<String, QueryError> {
        let body = self.fetch_body(cfg).await?;
        let candidate = run_pipeline(&self.url_commands, &body)?;
        debug!("url lookup {:?} candidate {candidate:?}", self.url);
        Ok(candidate)
    }

    /// Issues the GET and returns the (bounded) body text.
    async fn fetch_body(&self, cfg: &Config) -> Result<String, QueryError> {
        let client = http::build_client(cfg.http_timeout(), self.allow_invalid_certs)?;
        let req = http::apply_auth_headers(
            client.get(&self.url),
            self.basic_auth.as_ref(),
            &self.headers,
        );
        let resp = req.send().await.map_err(http::classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QueryError::Status {
                code: status.as_u16(),
            });
        }

        let mut body: Vec<u8> = Vec::new();
        let mut resp = resp;
        while let Some(chunk) = resp.chunk().await.map_err(http::classify)? {
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                body.extend_from_slice(&chunk[..MAX_BODY_BYTES - body.len()]);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        String::from_utf8(body).map_err(|e| QueryError::Parse {
            reason: format!("body is not utf-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Network paths are exercised through the pipeline working over captured
    // bodies; transport behaviour itself belongs to reqwest.
    #[test]
    fn pipeline_runs_over_scraped_body() {
        let lookup = UrlLookup {
            url_commands: vec![UrlCommand::Regex {
                pattern: r#"stable version: "v?([0-9.]+)""#.to_string(),
                index: 0,
                template: None,
            }],
            ..UrlLookup::default()
        };
        let body = r#"<p>stable version: "v1.2.3"</p>"#;
        assert_eq!(
            run_pipeline(&lookup.url_commands, body).unwrap(),
            "1.2.3"
        );
    }
}

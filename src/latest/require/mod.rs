//! # Promotion filters.
//!
//! A candidate version that is newer than the current latest must still pass
//! every configured filter before it is promoted. Filters run in declaration
//! order (version regex, content regex, command, docker) and the first
//! failure short-circuits with `filter-fail`.

mod docker;

pub use docker::{DockerCheck, Registry};

use log::debug;
use regex::Regex;
use tokio::process::Command;

use crate::config::Config;
use crate::error::QueryError;
use crate::template::{render, TemplateVars};

/// Content assertion against a secondary URL.
#[derive(Clone, Debug)]
pub struct RegexContent {
    /// URL template; `{{ version }}` is expanded before the GET.
    pub url: String,
    /// Pattern that must match the fetched body.
    pub pattern: String,
}

/// The filter set gating promotion of a candidate version.
#[derive(Clone, Debug, Default)]
pub struct Require {
    /// Candidate (with any leading `v` stripped) must match this pattern.
    pub regex_version: Option<String>,
    /// A template-expanded URL's body must match this pattern.
    pub regex_content: Option<RegexContent>,
    /// Argv whose zero exit approves the candidate; elements are
    /// template-expanded.
    pub command: Option<Vec<String>>,
    /// The image tag must exist in its registry.
    pub docker: Option<DockerCheck>,
}

impl Require {
    /// True when no filter is configured.
    pub fn is_empty(&self) -> bool {
        self.regex_version.is_none()
            && self.regex_content.is_none()
            && self.command.is_none()
            && self.docker.is_none()
    }

    /// Runs every configured filter against `version`.
    ///
    /// `vars` carries the service's template context with `version` already
    /// set to the candidate.
    pub async fn check(
        &self,
        version: &str,
        vars: &TemplateVars,
        cfg: &Config,
    ) -> Result<(), QueryError> {
        if let Some(pattern) = &self.regex_version {
            self.check_regex_version(pattern, version)?;
        }
        if let Some(content) = &self.regex_content {
            self.check_regex_content(content, version, vars, cfg).await?;
        }
        if let Some(argv) = &self.command {
            self.check_command(argv, version, vars, cfg).await?;
        }
        if let Some(docker) = &self.docker {
            let tag = render(&docker.tag, vars)
                .map_err(|e| QueryError::ConfigInvalid {
                    reason: format!("docker tag template: {e}"),
                })?
                .into_owned();
            docker.tag_exists(&tag, cfg).await?;
        }
        debug!("require: version {version:?} passed all filters");
        Ok(())
    }

    fn check_regex_version(&self, pattern: &str, version: &str) -> Result<(), QueryError> {
        let re = Regex::new(pattern).map_err(|e| QueryError::ConfigInvalid {
            reason: format!("regex_version {pattern:?}: {e}"),
        })?;
        let bare = version.strip_prefix(['v', 'V']).unwrap_or(version);
        if re.is_match(bare) {
            Ok(())
        } else {
            Err(QueryError::FilterFail {
                filter: "regex_version",
                version: version.to_string(),
                reason: format!("{bare:?} doesn't match {pattern:?}"),
            })
        }
    }

    async fn check_regex_content(
        &self,
        content: &RegexContent,
        version: &str,
        vars: &TemplateVars,
        cfg: &Config,
    ) -> Result<(), QueryError> {
        let re = Regex::new(&content.pattern).map_err(|e| QueryError::ConfigInvalid {
            reason: format!("regex_content {:?}: {e}", content.pattern),
        })?;
        let url = render(&content.url, vars)
            .map_err(|e| QueryError::ConfigInvalid {
                reason: format!("regex_content url template: {e}"),
            })?
            .into_owned();

        let client = crate::http::build_client(cfg.http_timeout(), false)?;
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(crate::http::classify)?;
        if !resp.status().is_success() {
            return Err(QueryError::Status {
                code: resp.status().as_u16(),
            });
        }
        let body = resp.text().await.map_err(crate::http::classify)?;

        if re.is_match(&body) {
            Ok(())
        } else {
            Err(QueryError::FilterFail {
                filter: "regex_content",
                version: version.to_string(),
                reason: format!("{:?} not found in body of {url:?}", content.pattern),
            })
        }
    }

    async fn check_command(
        &self,
        argv: &[String],
        version: &str,
        vars: &TemplateVars,
        cfg: &Config,
    ) -> Result<(), QueryError> {
        if argv.is_empty() {
            return Err(QueryError::ConfigInvalid {
                reason: "require.command is empty".to_string(),
            });
        }
        let mut expanded = Vec::with_capacity(argv.len());
        for arg in argv {
            expanded.push(
                render(arg, vars)
                    .map_err(|e| QueryError::ConfigInvalid {
                        reason: format!("command arg template: {e}"),
                    })?
                    .into_owned(),
            );
        }

        let mut cmd = Command::new(&expanded[0]);
        cmd.args(&expanded[1..]).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let spawned = cmd.status();
        let status = match cfg.command_timeout() {
            Some(t) => tokio::time::timeout(t, spawned)
                .await
                .map_err(|_| QueryError::FilterFail {
                    filter: "command",
                    version: version.to_string(),
                    reason: format!("timed out after {t:?}"),
                })?,
            None => spawned.await,
        }
        .map_err(|e| QueryError::FilterFail {
            filter: "command",
            version: version.to_string(),
            reason: format!("spawn {:?}: {e}", expanded[0]),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(QueryError::FilterFail {
                filter: "command",
                version: version.to_string(),
                reason: format!("exit status {:?}", status.code()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(version: &str) -> TemplateVars {
        TemplateVars::new("svc", "", "", version)
    }

    #[tokio::test]
    async fn empty_require_passes_everything() {
        let req = Require::default();
        assert!(req.is_empty());
        assert!(req
            .check("1.2.3", &vars("1.2.3"), &Config::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn regex_version_vetoes_mismatches() {
        let req = Require {
            regex_version: Some("^v[0-9]+$".into()),
            ..Require::default()
        };
        // Candidate 1.2.3 doesn't match ^v[0-9]+$ (the leading v is stripped
        // before matching, and dots aren't allowed by the pattern).
        let err = req
            .check("1.2.3", &vars("1.2.3"), &Config::default())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "filter-fail");
    }

    #[tokio::test]
    async fn regex_version_matches_bare_form() {
        let req = Require {
            regex_version: Some(r"^[0-9.]+$".into()),
            ..Require::default()
        };
        assert!(req
            .check("v1.2.3", &vars("v1.2.3"), &Config::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn command_zero_exit_passes() {
        let req = Require {
            command: Some(vec!["true".into()]),
            ..Require::default()
        };
        assert!(req
            .check("1.0.0", &vars("1.0.0"), &Config::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn command_nonzero_exit_vetoes() {
        let req = Require {
            command: Some(vec!["false".into()]),
            ..Require::default()
        };
        let err = req
            .check("1.0.0", &vars("1.0.0"), &Config::default())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "filter-fail");
    }

    #[tokio::test]
    async fn command_args_are_template_expanded() {
        let req = Require {
            command: Some(vec!["test".into(), "1.2.3".into(), "=".into(), "{{ version }}".into()]),
            ..Require::default()
        };
        assert!(req
            .check("1.2.3", &vars("1.2.3"), &Config::default())
            .await
            .is_ok());
    }
}

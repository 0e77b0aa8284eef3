//! # Webhook action.
//!
//! POSTs a signed payload to a configured URL when a promotion dispatches.
//! Two payload flavours exist:
//!
//! - `github`: a push-style JSON body signed with the shared secret
//!   (`X-Hub-Signature-256: sha256=<hmac>`), plus `X-GitHub-Event: push`.
//! - `gitlab`: an empty JSON body with the secret as `X-Gitlab-Token`.
//!
//! `desired_status_code = 0` accepts any 2xx; any other value must match
//! exactly. On final failure the dispatcher cascades to the webhook's
//! attached notifiers unless `silent_fails` is set.

use std::collections::BTreeMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use log::debug;
use sha2::Sha256;

use crate::config::Config;
use crate::http::{self, Header};
use crate::template::{render, TemplateVars};
use crate::util::mask_map;

type HmacSha256 = Hmac<Sha256>;

/// Payload flavour of a webhook.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WebHookType {
    #[default]
    GitHub,
    GitLab,
}

impl WebHookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebHookType::GitHub => "github",
            WebHookType::GitLab => "gitlab",
        }
    }
}

/// One configured webhook of a service.
#[derive(Clone, Debug, Default)]
pub struct WebHook {
    /// Key of this webhook in the service's map.
    pub id: String,
    /// Payload flavour.
    pub wtype: WebHookType,
    /// Target URL template; `{{ version }}` etc. are expanded per dispatch.
    pub url: String,
    /// Shared secret (HMAC key / gitlab token).
    pub secret: String,
    /// Extra headers; values are template-expanded.
    pub custom_headers: Vec<Header>,
    /// Exact status required; `0` accepts any 2xx.
    pub desired_status_code: u16,
    /// Accept invalid/self-signed certificates.
    pub allow_invalid_certs: bool,
    /// Suppress the notifier cascade on final failure.
    pub silent_fails: bool,
    /// Wait before the first attempt; `None` inherits zero.
    pub delay: Option<Duration>,
    /// Attempts allowed; `None` inherits the global default.
    pub max_tries: Option<u32>,
    /// Cascade targets by notifier id; `None` uses the service's notifiers.
    pub notify_override: Option<Vec<String>>,
}

impl WebHook {
    /// Runs one attempt: build, sign, POST, check the status code.
    pub async fn send_once(&self, vars: &TemplateVars, cfg: &Config) -> Result<(), String> {
        let url = render(&self.url, vars)
            .map_err(|e| format!("url template: {e}"))?
            .into_owned();
        let body = self.payload(vars);

        let client = http::build_client(cfg.http_timeout(), self.allow_invalid_certs)
            .map_err(|e| e.to_string())?;
        let mut req = client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body.clone());

        match self.wtype {
            WebHookType::GitHub => {
                req = req
                    .header("X-GitHub-Event", "push")
                    .header("X-Hub-Signature-256", sign_sha256(&self.secret, &body));
            }
            WebHookType::GitLab => {
                req = req.header("X-Gitlab-Token", &self.secret);
            }
        }
        for h in &self.custom_headers {
            let value = render(&h.value, vars)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| h.value.clone());
            req = req.header(&h.key, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| http::classify(e).to_string())?;
        let code = resp.status().as_u16();
        debug!("webhook {:?} answered {code}", self.id);

        let accepted = if self.desired_status_code == 0 {
            (200..300).contains(&code)
        } else {
            code == self.desired_status_code
        };
        if accepted {
            Ok(())
        } else {
            Err(format!("status {code}"))
        }
    }

    /// The JSON body for this webhook's flavour.
    fn payload(&self, vars: &TemplateVars) -> String {
        match self.wtype {
            WebHookType::GitHub => serde_json::json!({
                "ref": "refs/heads/master",
                "before": format!("{:0>40}", ""),
                "after": format!("{:0>40}", ""),
                "repository": { "name": &vars.service_id },
                "head_commit": { "message": format!("release {}", vars.version) },
            })
            .to_string(),
            WebHookType::GitLab => "{}".to_string(),
        }
    }

    /// Config view with the secret masked; safe for APIs and logs.
    pub fn masked_view(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), self.wtype.as_str().to_string());
        map.insert("url".to_string(), self.url.clone());
        map.insert("secret".to_string(), self.secret.clone());
        map.insert(
            "desired_status_code".to_string(),
            self.desired_status_code.to_string(),
        );
        mask_map(&map)
    }
}

/// `sha256=<hex hmac>` over `body` with `secret` as the key.
fn sign_sha256(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body.as_bytes());
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256={hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex() {
        let sig = sign_sha256("secret", "{}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        // Same inputs, same signature.
        assert_eq!(sig, sign_sha256("secret", "{}"));
        // Different key, different signature.
        assert_ne!(sig, sign_sha256("other", "{}"));
    }

    #[test]
    fn github_payload_mentions_service_and_version() {
        let wh = WebHook {
            id: "wh".into(),
            ..WebHook::default()
        };
        let vars = TemplateVars::new("argus", "", "", "1.2.3");
        let body = wh.payload(&vars);
        assert!(body.contains("\"argus\""));
        assert!(body.contains("release 1.2.3"));

        let gitlab = WebHook {
            wtype: WebHookType::GitLab,
            ..wh
        };
        assert_eq!(gitlab.payload(&vars), "{}");
    }

    #[test]
    fn masked_view_hides_the_secret() {
        let wh = WebHook {
            id: "wh".into(),
            url: "https://deploy.example.com/hook".into(),
            secret: "hunter2".into(),
            ..WebHook::default()
        };
        let view = wh.masked_view();
        assert_eq!(view["secret"], "<secret>");
        assert_eq!(view["url"], "https://deploy.example.com/hook");
        assert!(!format!("{view:?}").contains("hunter2"));
    }
}

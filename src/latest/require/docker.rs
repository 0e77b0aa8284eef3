//! # Docker-registry tag existence check.
//!
//! Verifies that `image:tag` exists in a container registry before a version
//! is promoted. Three registries are supported, each with its own token
//! bootstrap:
//!
//! | registry | token flow | manifest check |
//! |---|---|---|
//! | `hub`  | `auth.docker.io/token` (scoped pull token, optional basic auth) | `registry-1.docker.io/v2/` |
//! | `ghcr` | configured PAT base64-encoded, else anonymous `ghcr.io/token` | `ghcr.io/v2/` |
//! | `quay` | configured bearer token used directly | `quay.io/v2/` |
//!
//! Query tokens are cached process-wide with their expiry; services sharing
//! the same registry/image/credentials inherit the cached token. Writers are
//! rare (only on expiry), so the cache sits behind a read-biased lock.

use std::collections::HashMap;
use std::sync::OnceLock;

use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::QueryError;
use crate::http;

/// Accept header covering the manifest flavours registries serve.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.index.v1+json";

/// Fallback token lifetime when the registry doesn't state one.
const DEFAULT_TOKEN_TTL_SECS: i64 = 300;

/// Supported registries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Registry {
    Hub,
    Ghcr,
    Quay,
}

impl Registry {
    /// Stable name used in config and error labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Registry::Hub => "hub",
            Registry::Ghcr => "ghcr",
            Registry::Quay => "quay",
        }
    }
}

/// Tag-existence filter configuration.
#[derive(Clone, Debug)]
pub struct DockerCheck {
    pub registry: Registry,
    /// Image path (`owner/name`; bare Hub names gain the `library/` prefix).
    pub image: String,
    /// Tag template; `{{ version }}` is expanded before the check.
    pub tag: String,
    /// Registry username (Hub token flow).
    pub username: Option<String>,
    /// Registry credential (Hub password / GHCR PAT / Quay bearer).
    pub token: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    valid_until: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct TokenKey {
    registry: Registry,
    image: String,
    username: String,
}

/// Process-wide pull-token cache shared by all services.
fn token_cache() -> &'static RwLock<HashMap<TokenKey, CachedToken>> {
    static CACHE: OnceLock<RwLock<HashMap<TokenKey, CachedToken>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl DockerCheck {
    /// Checks that `image:<tag>` exists; `tag` arrives template-expanded.
    ///
    /// `401`/`404` mean the tag is absent (or unreadable) and veto the
    /// promotion; other failures surface through the usual taxonomy.
    pub async fn tag_exists(&self, tag: &str, cfg: &Config) -> Result<(), QueryError> {
        let token = self.query_token(cfg).await?;
        let image = self.normalized_image();
        let url = match self.registry {
            Registry::Hub => {
                format!("https://registry-1.docker.io/v2/{image}/manifests/{tag}")
            }
            Registry::Ghcr => format!("https://ghcr.io/v2/{image}/manifests/{tag}"),
            Registry::Quay => format!("https://quay.io/v2/{image}/manifests/{tag}"),
        };

        let client = http::build_client(cfg.http_timeout(), false)?;
        let mut req = client.head(&url).header("Accept", MANIFEST_ACCEPT);
        if !token.is_empty() {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let resp = req.send().await.map_err(http::classify)?;

        match resp.status().as_u16() {
            code if (200..300).contains(&code) => Ok(()),
            401 | 404 => Err(QueryError::FilterFail {
                filter: "docker",
                version: tag.to_string(),
                reason: format!(
                    "{}:{tag} not found in {} registry",
                    image,
                    self.registry.as_str()
                ),
            }),
            code => Err(QueryError::Status { code }),
        }
    }

    /// Returns a pull token, reusing the shared cache while it is valid.
    async fn query_token(&self, cfg: &Config) -> Result<String, QueryError> {
        let key = TokenKey {
            registry: self.registry,
            image: self.normalized_image(),
            username: self.username.clone().unwrap_or_default(),
        };

        {
            let cache = token_cache().read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.is_valid(Utc::now()) {
                    return Ok(entry.token.clone());
                }
            }
        }

        let fresh = self.fetch_token(cfg).await?;
        debug!(
            "docker token refreshed registry={} image={}",
            self.registry.as_str(),
            key.image
        );
        token_cache().write().await.insert(key, fresh.clone());
        Ok(fresh.token)
    }

    /// Runs the registry-specific token bootstrap.
    async fn fetch_token(&self, cfg: &Config) -> Result<CachedToken, QueryError> {
        match self.registry {
            Registry::Hub => {
                let url = format!(
                    "https://auth.docker.io/token?service=registry.docker.io&scope=repository:{}:pull",
                    self.normalized_image()
                );
                let client = http::build_client(cfg.http_timeout(), false)?;
                let mut req = client.get(&url);
                if let (Some(user), Some(pass)) = (&self.username, &self.token) {
                    req = req.basic_auth(user, Some(pass));
                }
                let resp = req.send().await.map_err(http::classify)?;
                if !resp.status().is_success() {
                    return Err(QueryError::Status {
                        code: resp.status().as_u16(),
                    });
                }
                let body: TokenResponse = resp.json().await.map_err(http::classify)?;
                Ok(parse_token_response(body, Utc::now()))
            }
            Registry::Ghcr => {
                if let Some(pat) = &self.token {
                    // A configured PAT is used as-is (base64, per the ghcr
                    // token exchange) and never expires on our side.
                    return Ok(CachedToken {
                        token: base64::engine::general_purpose::STANDARD.encode(pat),
                        valid_until: DateTime::<Utc>::MAX_UTC,
                    });
                }
                let url = format!(
                    "https://ghcr.io/token?scope=repository:{}:pull&service=ghcr.io",
                    self.normalized_image()
                );
                let client = http::build_client(cfg.http_timeout(), false)?;
                let resp = client.get(&url).send().await.map_err(http::classify)?;
                if !resp.status().is_success() {
                    return Err(QueryError::Status {
                        code: resp.status().as_u16(),
                    });
                }
                let body: TokenResponse = resp.json().await.map_err(http::classify)?;
                Ok(parse_token_response(body, Utc::now()))
            }
            Registry::Quay => Ok(CachedToken {
                token: self.token.clone().unwrap_or_default(),
                valid_until: DateTime::<Utc>::MAX_UTC,
            }),
        }
    }

    /// Hub images without a namespace live under `library/`.
    fn normalized_image(&self) -> String {
        if self.registry == Registry::Hub && !self.image.contains('/') {
            format!("library/{}", self.image)
        } else {
            self.image.clone()
        }
    }
}

fn parse_token_response(body: TokenResponse, now: DateTime<Utc>) -> CachedToken {
    let ttl = body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    CachedToken {
        token: body.token,
        valid_until: now + ChronoDuration::seconds(ttl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hub_images_gain_library_prefix() {
        let check = DockerCheck {
            registry: Registry::Hub,
            image: "nginx".into(),
            tag: "{{ version }}".into(),
            username: None,
            token: None,
        };
        assert_eq!(check.normalized_image(), "library/nginx");

        let namespaced = DockerCheck {
            image: "release-argus/argus".into(),
            ..check.clone()
        };
        assert_eq!(namespaced.normalized_image(), "release-argus/argus");

        let ghcr = DockerCheck {
            registry: Registry::Ghcr,
            image: "nginx".into(),
            ..check
        };
        assert_eq!(ghcr.normalized_image(), "nginx");
    }

    #[test]
    fn token_validity_follows_expiry() {
        let now = Utc::now();
        let fresh = parse_token_response(
            TokenResponse {
                token: "t".into(),
                expires_in: Some(300),
            },
            now,
        );
        assert!(fresh.is_valid(now));
        assert!(fresh.is_valid(now + ChronoDuration::seconds(299)));
        assert!(!fresh.is_valid(now + ChronoDuration::seconds(301)));
    }

    #[test]
    fn missing_expiry_uses_default_ttl() {
        let now = Utc::now();
        let t = parse_token_response(
            TokenResponse {
                token: "t".into(),
                expires_in: None,
            },
            now,
        );
        assert_eq!(t.valid_until, now + ChronoDuration::seconds(300));
    }

    #[tokio::test]
    async fn services_with_same_credentials_share_the_cache() {
        let key = TokenKey {
            registry: Registry::Quay,
            image: "org/app".into(),
            username: String::new(),
        };
        token_cache().write().await.insert(
            key.clone(),
            CachedToken {
                token: "shared".into(),
                valid_until: DateTime::<Utc>::MAX_UTC,
            },
        );

        // A second service with identical coordinates hits the same entry.
        let check = DockerCheck {
            registry: Registry::Quay,
            image: "org/app".into(),
            tag: "{{ version }}".into(),
            username: None,
            token: Some("ignored-while-cache-valid".into()),
        };
        let got = check.query_token(&Config::default()).await.unwrap();
        assert_eq!(got, "shared");
    }
}

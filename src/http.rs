//! # Outbound HTTP plumbing shared by lookups, filters and webhooks.
//!
//! Every outbound request carries a hard deadline and optionally tolerates
//! invalid certificates (per lookup/webhook config). Credentials are applied
//! here so call sites never format auth headers themselves.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};

use crate::error::QueryError;

/// HTTP Basic Auth credentials.
#[derive(Clone, Debug, Default)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// One custom request header.
#[derive(Clone, Debug)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// Builds a client with the given deadline and certificate policy.
///
/// `timeout = None` leaves requests unbounded (not recommended; the global
/// config default is 30s).
pub fn build_client(
    timeout: Option<Duration>,
    allow_invalid_certs: bool,
) -> Result<Client, QueryError> {
    let mut builder = Client::builder().danger_accept_invalid_certs(allow_invalid_certs);
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder.build().map_err(|e| QueryError::ConfigInvalid {
        reason: format!("http client: {e}"),
    })
}

/// Applies optional basic auth and custom headers to a request.
pub fn apply_auth_headers(
    mut req: RequestBuilder,
    basic_auth: Option<&BasicAuth>,
    headers: &[Header],
) -> RequestBuilder {
    if let Some(auth) = basic_auth {
        req = req.basic_auth(&auth.username, Some(&auth.password));
    }
    for h in headers {
        req = req.header(&h.key, &h.value);
    }
    req
}

/// Maps a transport error onto the query taxonomy, splitting TLS failures
/// out of generic network errors.
pub fn classify(e: reqwest::Error) -> QueryError {
    let rendered = format!("{e:?}").to_ascii_lowercase();
    if rendered.contains("certificate") || rendered.contains("tls") || rendered.contains("ssl") {
        return QueryError::Tls {
            reason: "certificate verification failed".to_string(),
        };
    }
    QueryError::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_both_cert_policies() {
        assert!(build_client(Some(Duration::from_secs(5)), false).is_ok());
        assert!(build_client(None, true).is_ok());
    }
}

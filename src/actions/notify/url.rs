//! # Notification URL builder.
//!
//! Synthesises the type-specific destination URL from the resolved
//! `url_fields` and `params`. The shapes are the router's catalogue; keys are
//! already lowercased by the bundle layer.
//!
//! Legacy configs carrying a raw `https://hooks.slack.com/...` webhook URL
//! convert through [`from_legacy_hook`] into the `slack` (or `mattermost`)
//! form before ever reaching the builder.

use url::form_urlencoded;

use crate::template::{render, TemplateVars};

use super::{Notify, NotifyBundle};

impl Notify {
    /// Builds the destination URL for the resolved type.
    ///
    /// Unknown types fall through to the `raw` field so operators can carry
    /// any router-supported scheme verbatim.
    pub fn build_url(&self, vars: &TemplateVars) -> String {
        let t = self.resolved_type().to_string();
        match t.as_str() {
            "discord" => format!(
                "discord://{}@{}",
                self.url_field("token"),
                self.url_field("webhookid")
            ),
            "smtp" => {
                let auth = self.user_pass_prefix();
                format!(
                    "smtp://{auth}{}/?{}",
                    self.host_port(),
                    self.query(vars)
                )
            }
            "gotify" => format!(
                "gotify://{}/{}",
                self.host_port_path(),
                self.url_field("token")
            ),
            "googlechat" => format!("googlechat://{}", self.url_field("raw")),
            "ifttt" => format!(
                "ifttt://{}/?{}",
                self.url_field("webhookid"),
                self.query(vars)
            ),
            "join" => format!(
                "join://shoutrrr:{}@join/?{}",
                self.url_field("apikey"),
                self.query(vars)
            ),
            "mattermost" => {
                let user = match self.url_field("username") {
                    "" => String::new(),
                    u => format!("{u}@"),
                };
                format!(
                    "mattermost://{user}{}/{}",
                    self.host_port_path(),
                    self.url_field("token")
                )
            }
            "matrix" => {
                let query = self.query(vars);
                let query = if query.is_empty() {
                    String::new()
                } else {
                    format!("?{query}")
                };
                format!(
                    "matrix://{}:{}@{}/{query}",
                    self.url_field("user"),
                    self.url_field("password"),
                    self.host_port_path(),
                )
            }
            "ntfy" => format!(
                "ntfy://{}:{}@{}/{}",
                self.url_field("username"),
                self.url_field("password"),
                self.host_port(),
                self.url_field("topic")
            ),
            "opsgenie" => format!(
                "opsgenie://{}/{}",
                self.host_port_path(),
                self.url_field("apikey")
            ),
            "pushbullet" => format!(
                "pushbullet://{}/{}",
                self.url_field("token"),
                self.url_field("targets")
            ),
            "pushover" => {
                let query = self.query(vars);
                let query = if query.is_empty() {
                    String::new()
                } else {
                    format!("?{query}")
                };
                format!(
                    "pushover://shoutrrr:{}@{}/{query}",
                    self.url_field("token"),
                    self.url_field("user"),
                )
            }
            "rocketchat" => format!(
                "rocketchat://{}/{}/{}/{}",
                self.host_port_path(),
                self.url_field("tokena"),
                self.url_field("tokenb"),
                self.url_field("channel")
            ),
            "slack" => format!(
                "slack://{}@{}",
                self.url_field("token"),
                self.url_field("channel")
            ),
            "teams" => format!(
                "teams://{}@{}/{}/{}?host={}",
                self.url_field("group"),
                self.url_field("tenant"),
                self.url_field("altid"),
                self.url_field("groupowner"),
                self.param("host")
            ),
            "telegram" => format!(
                "telegram://{}@telegram?{}",
                self.url_field("token"),
                self.query(vars)
            ),
            "zulip" => {
                let query = self.query(vars);
                let query = if query.is_empty() {
                    String::new()
                } else {
                    format!("?{query}")
                };
                format!(
                    "zulip://{}:{}@{}{query}",
                    self.url_field("botmail"),
                    self.url_field("botkey"),
                    self.url_field("host"),
                )
            }
            "bark" => format!(
                "bark://:{}@{}",
                self.url_field("devicekey"),
                self.host_port_path()
            ),
            "generic" => self.build_generic(vars),
            // "shoutrrr" and anything unknown: the raw URL passes through.
            _ => self.url_field("raw").to_string(),
        }
    }

    /// `{host}[:{port}]`.
    fn host_port(&self) -> String {
        let host = self.url_field("host");
        match self.url_field("port") {
            "" => host.to_string(),
            port => format!("{host}:{port}"),
        }
    }

    /// `{host}[:{port}][/{path}]`.
    fn host_port_path(&self) -> String {
        let base = self.host_port();
        match self.url_field("path") {
            "" => base,
            path => format!("{base}/{}", path.trim_start_matches('/')),
        }
    }

    /// `[{username}:{password}@]`.
    fn user_pass_prefix(&self) -> String {
        let user = self.url_field("username");
        if user.is_empty() {
            return String::new();
        }
        format!("{user}:{}@", self.url_field("password"))
    }

    /// Sorted-key urlencoded params, template-expanded.
    fn query(&self, vars: &TemplateVars) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for key in self.param_keys() {
            let value = self.param(&key);
            let rendered = render(value, vars)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| value.to_string());
            ser.append_pair(&key, &rendered);
        }
        ser.finish()
    }

    /// `generic://{host}?{@custom_headers}&{$json_payload_vars}&{query_vars}`.
    ///
    /// The three JSON-map fields expand sorted by key, with `@`/`$`/no prefix
    /// respectively.
    fn build_generic(&self, vars: &TemplateVars) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (field, prefix) in [
            ("custom_headers", "@"),
            ("json_payload_vars", "$"),
            ("query_vars", ""),
        ] {
            let raw = self.url_field(field);
            if raw.is_empty() {
                continue;
            }
            // Invalid JSON maps contribute nothing; config validation flags
            // them before dispatch.
            let Ok(map) = serde_json::from_str::<std::collections::BTreeMap<String, String>>(raw)
            else {
                continue;
            };
            for (k, v) in map {
                let rendered = render(&v, vars)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| v.clone());
                pairs.push((format!("{prefix}{k}"), rendered));
            }
        }

        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            ser.append_pair(k, v);
        }
        let query = ser.finish();
        if query.is_empty() {
            format!("generic://{}", self.host_port_path())
        } else {
            format!("generic://{}?{query}", self.host_port_path())
        }
    }
}

/// Converts a legacy webhook-URL config into a notifier.
///
/// Slack incoming-webhook URLs become the `slack` form: the hook path turns
/// into the token with `/` replaced by `:`, channel fixed to `webhook`.
/// Anything else is treated as a Mattermost hook and decomposed into
/// host/port/path/token.
pub fn from_legacy_hook(id: &str, hook_url: &str) -> Notify {
    let mut bundle = NotifyBundle::default();

    if hook_url.contains("hooks.slack.com") {
        bundle.ntype = Some("slack".to_string());
        let token_path = hook_url
            .split_once("hooks.slack.com/")
            .map(|(_, path)| path)
            .unwrap_or(hook_url)
            .trim_start_matches("services/");
        bundle
            .url_fields
            .insert("token".to_string(), token_path.replace('/', ":"));
        bundle
            .url_fields
            .insert("channel".to_string(), "webhook".to_string());
        return Notify::new(id, bundle);
    }

    bundle.ntype = Some("mattermost".to_string());
    let (default_port, rest) = match hook_url.strip_prefix("https://") {
        Some(rest) => ("443", rest),
        None => ("80", hook_url.strip_prefix("http://").unwrap_or(hook_url)),
    };

    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let (host, port) = match authority.split_once(':') {
        Some((h, p)) => (h, p),
        None => (authority, default_port),
    };
    bundle.url_fields.insert("host".to_string(), host.to_string());
    bundle.url_fields.insert("port".to_string(), port.to_string());

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let token = segments.pop().unwrap_or_default();
    bundle
        .url_fields
        .insert("token".to_string(), token.to_string());
    if !segments.is_empty() {
        bundle
            .url_fields
            .insert("path".to_string(), segments.join("/"));
    }
    Notify::new(id, bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars::new("argus", "https://example.com", "", "1.2.3")
    }

    fn notify(ntype: &str, fields: &[(&str, &str)], params: &[(&str, &str)]) -> Notify {
        Notify::new(
            ntype,
            NotifyBundle {
                ntype: Some(ntype.to_string()),
                url_fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..NotifyBundle::default()
            },
        )
    }

    #[test]
    fn discord_shape() {
        let n = notify("discord", &[("token", "T"), ("webhookid", "W")], &[]);
        assert_eq!(n.build_url(&vars()), "discord://T@W");
    }

    #[test]
    fn slack_shape() {
        let n = notify("slack", &[("token", "A:B:C"), ("channel", "webhook")], &[]);
        assert_eq!(n.build_url(&vars()), "slack://A:B:C@webhook");
    }

    #[test]
    fn gotify_includes_optional_port_and_path() {
        let n = notify(
            "gotify",
            &[("host", "g.example.com"), ("port", "8443"), ("path", "gotify"), ("token", "T")],
            &[],
        );
        assert_eq!(n.build_url(&vars()), "gotify://g.example.com:8443/gotify/T");

        let bare = notify("gotify", &[("host", "g.example.com"), ("token", "T")], &[]);
        assert_eq!(bare.build_url(&vars()), "gotify://g.example.com/T");
    }

    #[test]
    fn smtp_auth_is_optional() {
        let n = notify(
            "smtp",
            &[("host", "mail.example.com"), ("username", "u"), ("password", "p")],
            &[("fromaddress", "argus@example.com"), ("toaddresses", "ops@example.com")],
        );
        assert_eq!(
            n.build_url(&vars()),
            "smtp://u:p@mail.example.com/?fromaddress=argus%40example.com&toaddresses=ops%40example.com"
        );

        let anon = notify("smtp", &[("host", "mail.example.com")], &[]);
        assert_eq!(anon.build_url(&vars()), "smtp://mail.example.com/?");
    }

    #[test]
    fn teams_pulls_host_from_params() {
        let n = notify(
            "teams",
            &[("group", "g"), ("tenant", "t"), ("altid", "a"), ("groupowner", "o")],
            &[("host", "outlook.office.com")],
        );
        assert_eq!(
            n.build_url(&vars()),
            "teams://g@t/a/o?host=outlook.office.com"
        );
    }

    #[test]
    fn telegram_params_are_sorted_and_rendered() {
        let n = notify(
            "telegram",
            &[("token", "T")],
            &[("chats", "@ops"), ("parsemode", "None")],
        );
        assert_eq!(
            n.build_url(&vars()),
            "telegram://T@telegram?chats=%40ops&parsemode=None"
        );
    }

    #[test]
    fn params_expand_templates() {
        let n = notify("ifttt", &[("webhookid", "W")], &[("value1", "{{ version }}")]);
        assert_eq!(n.build_url(&vars()), "ifttt://W/?value1=1.2.3");
    }

    #[test]
    fn bark_and_zulip_shapes() {
        let bark = notify("bark", &[("devicekey", "K"), ("host", "api.day.app")], &[]);
        assert_eq!(bark.build_url(&vars()), "bark://:K@api.day.app");

        let zulip = notify(
            "zulip",
            &[("botmail", "bot@z.com"), ("botkey", "K"), ("host", "z.example.com")],
            &[],
        );
        assert_eq!(zulip.build_url(&vars()), "zulip://bot@z.com:K@z.example.com");
    }

    #[test]
    fn generic_expands_prefixed_json_maps_sorted() {
        let n = notify(
            "generic",
            &[
                ("host", "hooks.example.com"),
                ("custom_headers", r#"{"authorization":"Bearer X"}"#),
                ("json_payload_vars", r#"{"version":"{{ version }}"}"#),
                ("query_vars", r#"{"mode":"release"}"#),
            ],
            &[],
        );
        assert_eq!(
            n.build_url(&vars()),
            "generic://hooks.example.com?%40authorization=Bearer+X&%24version=1.2.3&mode=release"
        );
    }

    #[test]
    fn raw_shoutrrr_passes_through() {
        let n = notify("shoutrrr", &[("raw", "discord://T@W")], &[]);
        assert_eq!(n.build_url(&vars()), "discord://T@W");
    }

    #[test]
    fn legacy_slack_hook_converts_to_colon_token() {
        let n = from_legacy_hook("slack", "https://hooks.slack.com/A/B/C");
        assert_eq!(n.resolved_type(), "slack");
        assert_eq!(n.build_url(&vars()), "slack://A:B:C@webhook");
    }

    #[test]
    fn legacy_slack_hook_ignores_services_prefix() {
        let n = from_legacy_hook("slack", "https://hooks.slack.com/services/A/B/C");
        assert_eq!(n.build_url(&vars()), "slack://A:B:C@webhook");
    }

    #[test]
    fn legacy_other_hooks_become_mattermost() {
        let n = from_legacy_hook("mm", "https://chat.example.com:8443/hooks/abcdef");
        assert_eq!(n.resolved_type(), "mattermost");
        assert_eq!(n.url_field("host"), "chat.example.com");
        assert_eq!(n.url_field("port"), "8443");
        assert_eq!(n.url_field("path"), "hooks");
        assert_eq!(n.url_field("token"), "abcdef");
        assert_eq!(
            n.build_url(&vars()),
            "mattermost://chat.example.com:8443/hooks/abcdef"
        );
    }
}

//! # Notification channel.
//!
//! A notifier resolves its settings through four layers, highest precedence
//! first: **instance → main (per-service override) → defaults (per-type) →
//! hard-defaults (built-in)**. Resolution is an explicit first-non-empty scan
//! over the four bundles, never inheritance.
//!
//! The resolved `url_fields`/`params` feed the URL builder (see [`url`]);
//! the resolved `options` carry `message`, `title`, `delay` and `max_tries`.
//! Message and title render through the template engine with the service's
//! vars before every send.
//!
//! Actual delivery goes through [`NotificationRouter`], a black box to this
//! crate (the embedding daemon typically hands the URL to a shoutrrr-style
//! sender).

pub mod url;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::template::{render, TemplateVars};
use crate::util::{first_non_empty, mask_map, parse_duration};

/// Built-in fallback message template.
const HARD_DEFAULT_MESSAGE: &str = "{{ service_id }} - {{ version }} released";

/// Delivers one rendered notification.
///
/// `send` is called once per attempt; the retry loop lives in the dispatcher.
#[async_trait]
pub trait NotificationRouter: Send + Sync + 'static {
    /// Sends `message` with `title` to the destination encoded in `url`.
    async fn send(&self, url: &str, title: &str, message: &str) -> Result<(), String>;
}

/// One precedence layer of notifier settings.
///
/// All keys are lowercased on ingest (see [`NotifyBundle::normalize`]).
#[derive(Clone, Debug, Default)]
pub struct NotifyBundle {
    /// Notifier type (`discord`, `smtp`, ...); usually only set on the
    /// instance or main layer.
    pub ntype: Option<String>,
    /// Behavioural options: `message`, `title`, `delay`, `max_tries`.
    pub options: BTreeMap<String, String>,
    /// Fields composed into the destination URL.
    pub url_fields: BTreeMap<String, String>,
    /// Query parameters appended to the URL.
    pub params: BTreeMap<String, String>,
}

impl NotifyBundle {
    /// Lowercases every key in the three maps.
    pub fn normalize(&mut self) {
        for map in [&mut self.options, &mut self.url_fields, &mut self.params] {
            let lowered: BTreeMap<String, String> = map
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect();
            *map = lowered;
        }
    }
}

/// A notifier with its four settings layers.
#[derive(Clone, Debug, Default)]
pub struct Notify {
    /// Key of this notifier in the service's map.
    pub id: String,
    /// Instance layer.
    pub bundle: NotifyBundle,
    /// Per-service override layer.
    pub main: NotifyBundle,
    /// Per-type defaults layer.
    pub defaults: NotifyBundle,
    /// Built-in layer.
    pub hard_defaults: NotifyBundle,
}

impl Notify {
    /// Creates a notifier and normalizes every layer's keys.
    pub fn new(id: impl Into<String>, mut bundle: NotifyBundle) -> Self {
        bundle.normalize();
        Self {
            id: id.into(),
            bundle,
            ..Self::default()
        }
    }

    /// Attaches the main/defaults/hard-defaults layers (normalized).
    pub fn with_layers(
        mut self,
        mut main: NotifyBundle,
        mut defaults: NotifyBundle,
        mut hard_defaults: NotifyBundle,
    ) -> Self {
        main.normalize();
        defaults.normalize();
        hard_defaults.normalize();
        self.main = main;
        self.defaults = defaults;
        self.hard_defaults = hard_defaults;
        self
    }

    /// Resolved notifier type.
    ///
    /// Falls back to the notifier's map key, which doubles as the type for
    /// entries like `discord:` that don't spell it out.
    pub fn resolved_type(&self) -> &str {
        first_non_empty(&[
            self.bundle.ntype.as_deref(),
            self.main.ntype.as_deref(),
        ])
        .unwrap_or(&self.id)
    }

    /// Resolves one URL field through the four layers.
    pub fn url_field(&self, key: &str) -> &str {
        first_non_empty(&[
            self.bundle.url_fields.get(key).map(String::as_str),
            self.main.url_fields.get(key).map(String::as_str),
            self.defaults.url_fields.get(key).map(String::as_str),
            self.hard_defaults.url_fields.get(key).map(String::as_str),
        ])
        .unwrap_or("")
    }

    /// Resolves one param through the four layers.
    pub fn param(&self, key: &str) -> &str {
        first_non_empty(&[
            self.bundle.params.get(key).map(String::as_str),
            self.main.params.get(key).map(String::as_str),
            self.defaults.params.get(key).map(String::as_str),
            self.hard_defaults.params.get(key).map(String::as_str),
        ])
        .unwrap_or("")
    }

    /// Resolves one option through the four layers.
    pub fn option(&self, key: &str) -> &str {
        first_non_empty(&[
            self.bundle.options.get(key).map(String::as_str),
            self.main.options.get(key).map(String::as_str),
            self.defaults.options.get(key).map(String::as_str),
            self.hard_defaults.options.get(key).map(String::as_str),
        ])
        .unwrap_or("")
    }

    /// Union of param keys across all four layers.
    pub fn param_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .bundle
            .params
            .keys()
            .chain(self.main.params.keys())
            .chain(self.defaults.params.keys())
            .chain(self.hard_defaults.params.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Wait before the first send attempt.
    pub fn delay(&self) -> Duration {
        parse_duration(self.option("delay")).unwrap_or(Duration::ZERO)
    }

    /// Attempts allowed; inherits the global default.
    pub fn max_tries(&self, cfg: &Config) -> u32 {
        self.option("max_tries")
            .parse()
            .unwrap_or(cfg.max_tries)
    }

    /// Renders the message for `vars` (template errors fall back to the raw
    /// option so a bad template still notifies *something*).
    pub fn message(&self, vars: &TemplateVars) -> String {
        let raw = match self.option("message") {
            "" => HARD_DEFAULT_MESSAGE,
            m => m,
        };
        render(raw, vars)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// Renders the title for `vars` ("" lets the router pick its default).
    pub fn title(&self, vars: &TemplateVars) -> String {
        let raw = self.option("title");
        render(raw, vars)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// Runs one delivery attempt through the router.
    pub async fn send_once(
        &self,
        router: &dyn NotificationRouter,
        vars: &TemplateVars,
    ) -> Result<(), String> {
        let url = self.build_url(vars);
        router
            .send(&url, &self.title(vars), &self.message(vars))
            .await
    }

    /// Resolved config view with secrets masked; safe for APIs and logs.
    pub fn masked_view(&self) -> BTreeMap<String, String> {
        let mut view = BTreeMap::new();
        view.insert("type".to_string(), self.resolved_type().to_string());

        let mut url_fields = BTreeMap::new();
        for key in self.field_keys() {
            url_fields.insert(key.clone(), self.url_field(&key).to_string());
        }
        for (k, v) in mask_map(&url_fields) {
            view.insert(format!("url_fields.{k}"), v);
        }

        let mut params = BTreeMap::new();
        for key in self.param_keys() {
            params.insert(key.clone(), self.param(&key).to_string());
        }
        for (k, v) in mask_map(&params) {
            view.insert(format!("params.{k}"), v);
        }
        view
    }

    /// Union of URL-field keys across all four layers.
    fn field_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .bundle
            .url_fields
            .keys()
            .chain(self.main.url_fields.keys())
            .chain(self.defaults.url_fields.keys())
            .chain(self.hard_defaults.url_fields.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(pairs: &[(&str, &str)]) -> NotifyBundle {
        NotifyBundle {
            url_fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..NotifyBundle::default()
        }
    }

    #[test]
    fn precedence_scans_instance_first() {
        let n = Notify::new("slack", bundle(&[("channel", "ops")])).with_layers(
            bundle(&[("channel", "main-chan"), ("token", "main-token")]),
            bundle(&[("token", "default-token"), ("host", "default-host")]),
            NotifyBundle::default(),
        );
        assert_eq!(n.url_field("channel"), "ops");
        assert_eq!(n.url_field("token"), "main-token");
        assert_eq!(n.url_field("host"), "default-host");
        assert_eq!(n.url_field("missing"), "");
    }

    #[test]
    fn keys_lowercase_on_ingest() {
        let mut b = NotifyBundle::default();
        b.url_fields.insert("Token".to_string(), "T".to_string());
        b.options.insert("Max_Tries".to_string(), "5".to_string());
        let n = Notify::new("slack", b);
        assert_eq!(n.url_field("token"), "T");
        assert_eq!(n.option("max_tries"), "5");
    }

    #[test]
    fn type_falls_back_to_map_key() {
        let n = Notify::new("discord", NotifyBundle::default());
        assert_eq!(n.resolved_type(), "discord");

        let typed = Notify::new(
            "alerts",
            NotifyBundle {
                ntype: Some("gotify".to_string()),
                ..NotifyBundle::default()
            },
        );
        assert_eq!(typed.resolved_type(), "gotify");
    }

    #[test]
    fn options_parse_with_defaults() {
        let cfg = Config::default();
        let mut b = NotifyBundle::default();
        b.options.insert("delay".into(), "2s".into());
        b.options.insert("max_tries".into(), "7".into());
        let n = Notify::new("slack", b);
        assert_eq!(n.delay(), Duration::from_secs(2));
        assert_eq!(n.max_tries(&cfg), 7);

        let bare = Notify::new("slack", NotifyBundle::default());
        assert_eq!(bare.delay(), Duration::ZERO);
        assert_eq!(bare.max_tries(&cfg), 3);
    }

    #[test]
    fn message_renders_template_with_hard_default() {
        let vars = TemplateVars::new("argus", "", "", "1.2.3");
        let n = Notify::new("slack", NotifyBundle::default());
        assert_eq!(n.message(&vars), "argus - 1.2.3 released");

        let mut b = NotifyBundle::default();
        b.options
            .insert("message".into(), "upgrade to {{ version }}!".into());
        let custom = Notify::new("slack", b);
        assert_eq!(custom.message(&vars), "upgrade to 1.2.3!");
    }

    #[test]
    fn masked_view_hides_secrets() {
        let mut b = NotifyBundle::default();
        b.url_fields.insert("token".into(), "hunter2".into());
        b.url_fields.insert("channel".into(), "ops".into());
        let n = Notify::new("slack", b);

        let view = n.masked_view();
        assert_eq!(view["url_fields.token"], "<secret>");
        assert_eq!(view["url_fields.channel"], "ops");
        let rendered = format!("{view:?}");
        assert!(!rendered.contains("hunter2"));
    }
}

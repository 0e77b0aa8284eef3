//! # The service aggregate.
//!
//! A [`Service`] bundles everything the runner needs for one monitored
//! project: the latest-version lookup, the optional deployed-version lookup,
//! the configured actions, and presentation options. Its identifier is stable
//! across config reloads and keys every map in the engine.

use std::collections::BTreeMap;

use crate::actions::{Notify, ShellCommand, WebHook};
use crate::deployed::DeployedLookup;
use crate::latest::{LatestLookup, LookupKind};
use crate::template::TemplateVars;

use super::dashboard::Dashboard;
use super::options::ServiceOptions;

/// One monitored project.
#[derive(Clone, Debug)]
pub struct Service {
    /// Unique, stable identifier.
    pub id: String,
    /// Polling/comparison options.
    pub options: ServiceOptions,
    /// Where the newest upstream version comes from.
    pub latest: LatestLookup,
    /// Where the running instance reports its version (optional).
    pub deployed: Option<DeployedLookup>,
    /// Notifiers, keyed by their config name.
    pub notify: BTreeMap<String, Notify>,
    /// Commands, in declaration order.
    pub command: Vec<ShellCommand>,
    /// Webhooks, keyed by their config name.
    pub webhook: BTreeMap<String, WebHook>,
    /// Presentation and the auto-approve flag.
    pub dashboard: Dashboard,
}

impl Service {
    /// Creates a service with just a lookup; actions attach via the fields.
    pub fn new(id: impl Into<String>, latest: LatestLookup) -> Self {
        Self {
            id: id.into(),
            options: ServiceOptions::default(),
            latest,
            deployed: None,
            notify: BTreeMap::new(),
            command: Vec::new(),
            webhook: BTreeMap::new(),
            dashboard: Dashboard::default(),
        }
    }

    /// The upstream URL shown to users (lookup page or GitHub repo).
    pub fn service_url(&self) -> String {
        match &self.latest.kind {
            LookupKind::Url(lookup) => lookup.url.clone(),
            LookupKind::GitHub(lookup) => format!("https://github.com/{}", lookup.repo),
        }
    }

    /// Template context for `version`.
    ///
    /// The dashboard's `web_url` template is rendered first (it may itself
    /// reference `{{ version }}`) so other templates can embed the result.
    pub fn template_vars(&self, version: &str) -> TemplateVars {
        let mut vars = TemplateVars::new(&self.id, self.service_url(), "", version);
        if let Some(web_url) = self.dashboard.web_url(&vars) {
            vars.web_url = web_url;
        }
        vars
    }

    /// Config view of the service's actions with secrets masked.
    pub fn masked_view(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut view = BTreeMap::new();
        for (id, notify) in &self.notify {
            view.insert(format!("notify.{id}"), notify.masked_view());
        }
        for (id, webhook) in &self.webhook {
            view.insert(format!("webhook.{id}"), webhook.masked_view());
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latest::UrlLookup;

    fn service() -> Service {
        let mut svc = Service::new(
            "argus",
            LatestLookup::url(UrlLookup {
                url: "https://release-argus.io".into(),
                ..UrlLookup::default()
            }),
        );
        svc.dashboard.web_url = Some("https://example.com/r/{{ version }}".into());
        svc
    }

    #[test]
    fn template_vars_carry_rendered_web_url() {
        let vars = service().template_vars("1.2.3");
        assert_eq!(vars.service_id, "argus");
        assert_eq!(vars.service_url, "https://release-argus.io");
        assert_eq!(vars.web_url, "https://example.com/r/1.2.3");
        assert_eq!(vars.version, "1.2.3");
    }

    #[test]
    fn github_lookup_derives_repo_url() {
        use crate::latest::GitHubLookup;
        let svc = Service::new(
            "argus",
            LatestLookup::github(GitHubLookup {
                repo: "release-argus/Argus".into(),
                ..GitHubLookup::default()
            }),
        );
        assert_eq!(svc.service_url(), "https://github.com/release-argus/Argus");
    }

    #[test]
    fn masked_view_covers_all_actions() {
        use crate::actions::{Notify, NotifyBundle, WebHook};
        let mut svc = service();
        let mut bundle = NotifyBundle::default();
        bundle.url_fields.insert("token".into(), "sssh".into());
        svc.notify.insert("slack".into(), Notify::new("slack", bundle));
        svc.webhook.insert(
            "deploy".into(),
            WebHook {
                id: "deploy".into(),
                secret: "sssh2".into(),
                ..WebHook::default()
            },
        );

        let rendered = format!("{:?}", svc.masked_view());
        assert!(!rendered.contains("sssh"));
        assert!(rendered.contains("<secret>"));
    }
}

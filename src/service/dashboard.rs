//! # Dashboard presentation options.

use crate::template::{render, TemplateVars};

/// How a service is presented and whether promotions dispatch automatically.
#[derive(Clone, Debug, Default)]
pub struct Dashboard {
    /// Icon shown for the service (URL or emoji shortcode).
    pub icon: Option<String>,
    /// Where clicking the icon navigates.
    pub icon_link_to: Option<String>,
    /// Web URL template for the release; `{{ version }}` is expanded.
    pub web_url: Option<String>,
    /// Dispatch actions without waiting for operator approval.
    pub auto_approve: bool,
}

impl Dashboard {
    /// Renders the web URL for the given vars, if one is configured.
    ///
    /// A template that fails to render is treated as absent (logged by the
    /// caller's view layer, never fatal).
    pub fn web_url(&self, vars: &TemplateVars) -> Option<String> {
        let tmpl = self.web_url.as_deref()?;
        render(tmpl, vars).ok().map(|s| s.into_owned())
    }
}

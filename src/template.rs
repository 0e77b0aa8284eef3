//! # Message/URL templating.
//!
//! Notifier messages, web URLs, filter URLs and command arguments may carry
//! templates. The dialect is deliberately small:
//!
//! - `{{ var }}` substitutes a variable
//! - `{% if var %}...{% endif %}` keeps the block only when `var` is non-empty
//!
//! Variables are the four service fields: `service_id`, `service_url`,
//! `web_url`, `version`. Unknown variables render as empty strings.
//!
//! Both [`render`] and [`check`] are pure functions with no shared state, so
//! they are safe to call from any number of tasks concurrently.

use std::borrow::Cow;

use thiserror::Error;

/// Variables available to templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateVars {
    pub service_id: String,
    pub service_url: String,
    pub web_url: String,
    pub version: String,
}

impl TemplateVars {
    /// Creates vars for a service with the given latest version.
    pub fn new(
        service_id: impl Into<String>,
        service_url: impl Into<String>,
        web_url: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_url: service_url.into(),
            web_url: web_url.into(),
            version: version.into(),
        }
    }

    fn get(&self, name: &str) -> &str {
        match name {
            "service_id" => &self.service_id,
            "service_url" => &self.service_url,
            "web_url" => &self.web_url,
            "version" => &self.version,
            _ => "",
        }
    }
}

/// Template syntax failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed tag starting at byte {at}")]
    Unclosed { at: usize },
    #[error("unexpected {tag} at byte {at}")]
    Unexpected { tag: String, at: usize },
    #[error("missing {{% endif %}} for if at byte {at}")]
    MissingEndif { at: usize },
}

/// Renders `template` against `vars`.
///
/// Strings without any `{` are returned unchanged without scanning.
pub fn render<'t>(template: &'t str, vars: &TemplateVars) -> Result<Cow<'t, str>, TemplateError> {
    if !template.contains('{') {
        return Ok(Cow::Borrowed(template));
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0usize;
    // Stack of (if_start_offset, condition_truthy, emitting_before_if).
    let mut ifs: Vec<(usize, bool)> = Vec::new();
    let mut emitting = true;

    while let Some(open) = rest.find('{') {
        if emitting {
            out.push_str(&rest[..open]);
        }
        let tag_start = offset + open;
        let after = &rest[open..];

        if let Some(body) = after.strip_prefix("{{") {
            let close = body
                .find("}}")
                .ok_or(TemplateError::Unclosed { at: tag_start })?;
            if emitting {
                out.push_str(vars.get(body[..close].trim()));
            }
            let consumed = open + 2 + close + 2;
            rest = &rest[consumed..];
            offset += consumed;
        } else if let Some(body) = after.strip_prefix("{%") {
            let close = body
                .find("%}")
                .ok_or(TemplateError::Unclosed { at: tag_start })?;
            let tag = body[..close].trim();
            if let Some(cond) = tag.strip_prefix("if ") {
                let truthy = !vars.get(cond.trim()).is_empty();
                ifs.push((tag_start, emitting));
                emitting = emitting && truthy;
            } else if tag == "endif" {
                let (_, outer) = ifs.pop().ok_or_else(|| TemplateError::Unexpected {
                    tag: "{% endif %}".to_string(),
                    at: tag_start,
                })?;
                emitting = outer;
            } else {
                return Err(TemplateError::Unexpected {
                    tag: format!("{{% {tag} %}}"),
                    at: tag_start,
                });
            }
            let consumed = open + 2 + close + 2;
            rest = &rest[consumed..];
            offset += consumed;
        } else {
            // Lone `{` is literal text.
            if emitting {
                out.push('{');
            }
            rest = &rest[open + 1..];
            offset += open + 1;
        }
    }
    if let Some((at, _)) = ifs.first() {
        return Err(TemplateError::MissingEndif { at: *at });
    }
    if emitting {
        out.push_str(rest);
    }
    Ok(Cow::Owned(out))
}

/// Returns true when `template` compiles (balanced, known tags).
pub fn check(template: &str) -> bool {
    render(template, &TemplateVars::default()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars::new("argus", "https://example.com", "https://web.example.com", "1.2.3")
    }

    #[test]
    fn plain_strings_pass_through() {
        let r = render("new release out", &vars()).unwrap();
        assert_eq!(r, "new release out");
        assert!(matches!(r, Cow::Borrowed(_)));
    }

    #[test]
    fn substitutes_all_vars() {
        let r = render(
            "{{ service_id }} {{ version }} at {{ service_url }} ({{ web_url }})",
            &vars(),
        )
        .unwrap();
        assert_eq!(
            r,
            "argus 1.2.3 at https://example.com (https://web.example.com)"
        );
    }

    #[test]
    fn unknown_vars_render_empty() {
        assert_eq!(render("x{{ nope }}y", &vars()).unwrap(), "xy");
    }

    #[test]
    fn if_blocks_follow_truthiness() {
        let mut v = vars();
        assert_eq!(
            render("{% if version %}v{{ version }}{% endif %}", &v).unwrap(),
            "v1.2.3"
        );
        v.version.clear();
        assert_eq!(
            render("{% if version %}v{{ version }}{% endif %}", &v).unwrap(),
            ""
        );
    }

    #[test]
    fn nested_if_respects_outer_falsehood() {
        let mut v = vars();
        v.web_url.clear();
        let t = "{% if web_url %}{% if version %}{{ version }}{% endif %}{% endif %}done";
        assert_eq!(render(t, &v).unwrap(), "done");
    }

    #[test]
    fn check_spots_bad_syntax() {
        assert!(check("hello {{ version }}"));
        assert!(check("literal { brace"));
        assert!(!check("{{ version"));
        assert!(!check("{% if version %}open"));
        assert!(!check("{% endif %}"));
        assert!(!check("{% for x %}{% endfor %}"));
    }
}

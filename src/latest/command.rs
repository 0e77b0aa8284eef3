//! # URL-command pipeline.
//!
//! An ordered chain of text transforms that reduces a fetched body to a
//! version string. Each command consumes the previous survivor:
//!
//! ```text
//! body ─► regex ─► replace ─► split ─► candidate
//! ```
//!
//! The empty pipeline is the identity transform.

use regex::Regex;

use crate::error::QueryError;

/// Longest prefix of the searched text quoted in `no-match` errors.
const SNIPPET_BYTES: usize = 64;

/// One transform in the pipeline.
#[derive(Clone, Debug)]
pub enum UrlCommand {
    /// Select a regex match (optionally re-shaping it through a template).
    Regex {
        /// Pattern compiled per apply; invalid patterns surface as config errors.
        pattern: String,
        /// Which match to take; negative counts from the end.
        index: isize,
        /// Optional `$1`..`$9` expansion over the selected match.
        template: Option<String>,
    },
    /// Literal replace-all.
    Replace { old: String, new: String },
    /// Split on a literal and select one element.
    Split {
        text: String,
        /// Which element to take; negative counts from the end.
        index: isize,
    },
}

impl UrlCommand {
    /// Applies this transform to `input`.
    pub fn apply(&self, input: &str) -> Result<String, QueryError> {
        match self {
            UrlCommand::Regex {
                pattern,
                index,
                template,
            } => apply_regex(pattern, *index, template.as_deref(), input),
            UrlCommand::Replace { old, new } => Ok(input.replace(old.as_str(), new)),
            UrlCommand::Split { text, index } => apply_split(text, *index, input),
        }
    }
}

/// Runs the whole pipeline over `input`.
///
/// `run(&[], x) == x`; the first failing command aborts the chain.
pub fn run_pipeline(commands: &[UrlCommand], input: &str) -> Result<String, QueryError> {
    let mut value = input.to_string();
    for cmd in commands {
        value = cmd.apply(&value)?;
    }
    Ok(value)
}

fn apply_regex(
    pattern: &str,
    index: isize,
    template: Option<&str>,
    input: &str,
) -> Result<String, QueryError> {
    let re = Regex::new(pattern).map_err(|e| QueryError::ConfigInvalid {
        reason: format!("regex {pattern:?}: {e}"),
    })?;

    let matches: Vec<regex::Captures> = re.captures_iter(input).collect();
    if matches.is_empty() {
        return Err(QueryError::NoMatch {
            pattern: pattern.to_string(),
            snippet: snippet(input),
        });
    }
    let caps = &matches[resolve_index(index, matches.len())?];

    if let Some(tmpl) = template {
        let mut out = String::new();
        caps.expand(tmpl, &mut out);
        return Ok(out);
    }
    // Prefer the first capture group; fall back to the whole match.
    let selected = caps.get(1).or_else(|| caps.get(0));
    Ok(selected.map(|m| m.as_str()).unwrap_or_default().to_string())
}

fn apply_split(text: &str, index: isize, input: &str) -> Result<String, QueryError> {
    if !input.contains(text) {
        return Err(QueryError::NoMatch {
            pattern: text.to_string(),
            snippet: snippet(input),
        });
    }
    let parts: Vec<&str> = input.split(text).collect();
    let i = resolve_index(index, parts.len())?;
    Ok(parts[i].to_string())
}

/// Maps a possibly-negative index onto `0..len`.
fn resolve_index(index: isize, len: usize) -> Result<usize, QueryError> {
    let resolved = if index < 0 {
        len as isize + index
    } else {
        index
    };
    if (0..len as isize).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(QueryError::IndexOutOfRange { index, len })
    }
}

/// First [`SNIPPET_BYTES`] of `input`, cut on a char boundary.
fn snippet(input: &str) -> String {
    if input.len() <= SNIPPET_BYTES {
        return input.to_string();
    }
    let mut end = SNIPPET_BYTES;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipeline_is_identity() {
        assert_eq!(run_pipeline(&[], "as-is").unwrap(), "as-is");
    }

    #[test]
    fn regex_extracts_quoted_version() {
        // The front-page scrape shape: stable version: "v1.2.3"
        let cmd = UrlCommand::Regex {
            pattern: r#"stable version: "v?([0-9.]+)""#.to_string(),
            index: 0,
            template: None,
        };
        assert_eq!(
            cmd.apply(r#"stable version: "v1.2.3""#).unwrap(),
            "1.2.3"
        );
    }

    #[test]
    fn regex_without_group_returns_whole_match() {
        let cmd = UrlCommand::Regex {
            pattern: "[0-9]+".to_string(),
            index: 0,
            template: None,
        };
        assert_eq!(cmd.apply("build 42 done").unwrap(), "42");
    }

    #[test]
    fn regex_negative_index_counts_from_end() {
        let cmd = UrlCommand::Regex {
            pattern: "([0-9]+)".to_string(),
            index: -1,
            template: None,
        };
        assert_eq!(cmd.apply("1 then 2 then 3").unwrap(), "3");
    }

    #[test]
    fn regex_template_expands_captures() {
        let cmd = UrlCommand::Regex {
            pattern: r"([0-9]+)\.([0-9]+)".to_string(),
            index: 0,
            template: Some("$2-$1".to_string()),
        };
        assert_eq!(cmd.apply("7.4").unwrap(), "4-7");
    }

    #[test]
    fn regex_no_match_keeps_snippet_short() {
        let long = "x".repeat(200);
        let cmd = UrlCommand::Regex {
            pattern: "[0-9]+".to_string(),
            index: 0,
            template: None,
        };
        match cmd.apply(&long) {
            Err(QueryError::NoMatch { snippet, .. }) => assert_eq!(snippet.len(), 64),
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn regex_bad_pattern_is_config_invalid() {
        let cmd = UrlCommand::Regex {
            pattern: "([0-9.+)-".to_string(),
            index: 0,
            template: None,
        };
        assert!(matches!(
            cmd.apply("anything"),
            Err(QueryError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn replace_is_literal_replace_all() {
        let cmd = UrlCommand::Replace {
            old: "_".to_string(),
            new: ".".to_string(),
        };
        assert_eq!(cmd.apply("1_2_3").unwrap(), "1.2.3");
    }

    #[test]
    fn split_selects_by_index() {
        let split = |index| UrlCommand::Split {
            text: "-".to_string(),
            index,
        };
        assert_eq!(split(-1).apply("abc123-def456").unwrap(), "def456");
        assert_eq!(split(0).apply("abc123-def456").unwrap(), "abc123");
    }

    #[test]
    fn split_missing_text_is_no_match() {
        let cmd = UrlCommand::Split {
            text: "7".to_string(),
            index: 0,
        };
        assert!(matches!(
            cmd.apply("abc123-def456"),
            Err(QueryError::NoMatch { .. })
        ));
    }

    #[test]
    fn split_index_out_of_range_fails() {
        let cmd = UrlCommand::Split {
            text: "-".to_string(),
            index: 5,
        };
        assert!(matches!(
            cmd.apply("a-b"),
            Err(QueryError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn chained_commands_feed_each_other() {
        let cmds = vec![
            UrlCommand::Regex {
                pattern: r"version: (\S+)".to_string(),
                index: 0,
                template: None,
            },
            UrlCommand::Replace {
                old: "_".to_string(),
                new: ".".to_string(),
            },
            UrlCommand::Split {
                text: "+".to_string(),
                index: 0,
            },
        ];
        assert_eq!(
            run_pipeline(&cmds, "version: 1_2_3+build9").unwrap(),
            "1.2.3"
        );
    }
}

//! Small shared helpers: duration parsing, secret masking, layered lookups.
//!
//! ## Contents
//! - [`parse_duration`] human duration strings (`"15s"`, `"1m30s"`, `"1.5h"`)
//! - [`mask`]/[`mask_map`] secret redaction for config views
//! - [`first_non_empty`] the four-layer option resolver

mod duration;
mod mask;

pub use duration::parse_duration;
pub use mask::mask_map;

/// Resolves a layered option: returns the first layer that is set **and**
/// non-empty, scanning highest precedence first.
///
/// `None` means "inherit from the next layer"; `Some("")` counts as unset for
/// value resolution (an explicitly empty value is only meaningful to callers
/// that distinguish it before calling this).
pub fn first_non_empty<'a>(layers: &[Option<&'a str>]) -> Option<&'a str> {
    layers
        .iter()
        .flatten()
        .copied()
        .find(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_scans_in_order() {
        assert_eq!(
            first_non_empty(&[None, Some(""), Some("main"), Some("default")]),
            Some("main")
        );
        assert_eq!(first_non_empty(&[None, None]), None);
        assert_eq!(first_non_empty(&[Some("x"), Some("y")]), Some("x"));
    }
}

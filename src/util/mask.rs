//! Secret redaction for config views.
//!
//! Any value whose config key lands in the known secret set is replaced with
//! the literal [`MASKED`] before leaving the crate (API views, logs, Debug
//! output of action configs).

use std::collections::BTreeMap;

/// Replacement string for secret values in rendered views.
pub const MASKED: &str = "<secret>";

/// Config keys whose values must never appear in any view.
const SECRET_KEYS: &[&str] = &[
    "token",
    "password",
    "secret",
    "apikey",
    "access_token",
    "botkey",
];

/// Returns true if `key` (case-insensitive) names a secret field.
pub fn is_secret_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    SECRET_KEYS.contains(&k.as_str())
}

/// Returns a copy of `map` with every secret value replaced by [`MASKED`].
///
/// Keys are preserved verbatim; values for non-secret keys pass through.
/// Empty secret values stay empty (there is nothing to hide and masking them
/// would suggest a value is set).
pub fn mask_map(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| {
            let masked = if is_secret_key(k) && !v.is_empty() {
                MASKED.to_string()
            } else {
                v.clone()
            };
            (k.clone(), masked)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_are_secret() {
        for key in ["token", "password", "secret", "apikey", "access_token", "botkey"] {
            assert!(is_secret_key(key), "{key} should be secret");
        }
        assert!(is_secret_key("TOKEN"));
        assert!(!is_secret_key("host"));
        assert!(!is_secret_key("channel"));
    }

    #[test]
    fn mask_map_replaces_values_not_keys() {
        let mut map = BTreeMap::new();
        map.insert("token".to_string(), "hunter2".to_string());
        map.insert("host".to_string(), "example.com".to_string());
        map.insert("password".to_string(), String::new());

        let masked = mask_map(&map);
        assert_eq!(masked["token"], MASKED);
        assert_eq!(masked["host"], "example.com");
        // Unset secrets stay visibly unset.
        assert_eq!(masked["password"], "");

        let rendered = format!("{masked:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains(MASKED));
    }
}

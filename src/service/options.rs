//! # Per-service polling options.
//!
//! Unset fields inherit from the global [`Config`](crate::config::Config):
//! `None` means "inherit", never "off".

use std::time::Duration;

use crate::config::Config;

/// Options controlling how a service is polled and compared.
#[derive(Clone, Debug, Default)]
pub struct ServiceOptions {
    /// Whether the service is monitored at all. `None` inherits `true`.
    pub active: Option<bool>,
    /// Poll interval for the latest-version lookup. `None` inherits the
    /// global default.
    pub interval: Option<Duration>,
    /// Whether versions are ordered semantically. `None` inherits `true`.
    pub semantic_versioning: Option<bool>,
}

impl ServiceOptions {
    /// Resolved active flag.
    pub fn active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Resolved poll interval.
    pub fn interval(&self, cfg: &Config) -> Duration {
        self.interval.unwrap_or(cfg.interval)
    }

    /// Resolved semantic-versioning flag.
    pub fn semantic_versioning(&self) -> bool {
        self.semantic_versioning.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_inherit() {
        let opts = ServiceOptions::default();
        let cfg = Config::default();
        assert!(opts.active());
        assert!(opts.semantic_versioning());
        assert_eq!(opts.interval(&cfg), cfg.interval);
    }

    #[test]
    fn set_fields_win() {
        let opts = ServiceOptions {
            active: Some(false),
            interval: Some(Duration::from_secs(30)),
            semantic_versioning: Some(false),
        };
        assert!(!opts.active());
        assert!(!opts.semantic_versioning());
        assert_eq!(opts.interval(&Config::default()), Duration::from_secs(30));
    }
}

//! Cache behavior configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_ENTRIES, ENV_DISABLE};

/// Cache configuration.
///
/// All flags have conservative defaults: errors are not cached, key
/// derivation failures propagate (fail-closed), and caching is enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of distinct keys retained (0 = unbounded)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Replay a wrapped function's error within the same window
    #[serde(default)]
    pub cache_errors: bool,
    /// On key derivation failure, run the function without caching instead
    /// of propagating the error
    #[serde(default)]
    pub fail_open_on_unhashable: bool,
    /// Bypass lookup and store entirely; every call runs the function
    #[serde(default)]
    pub disabled: bool,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            cache_errors: false,
            fail_open_on_unhashable: false,
            disabled: false,
        }
    }
}

impl CacheConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment overrides to this configuration.
    ///
    /// Currently recognizes [`ENV_DISABLE`] as a global kill switch.
    pub fn with_env_overrides(mut self) -> Self {
        if env_flag(ENV_DISABLE) {
            self.disabled = true;
        }
        self
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("1")
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
        assert!(!config.cache_errors);
        assert!(!config.fail_open_on_unhashable);
        assert!(!config.disabled);
    }

    #[test]
    fn test_serde_partial_config() {
        let config: CacheConfig = serde_json::from_str(r#"{"cache_errors": true}"#).unwrap();
        assert!(config.cache_errors);
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_env_disable_override() {
        std::env::set_var(ENV_DISABLE, "true");
        let config = CacheConfig::from_env();
        std::env::remove_var(ENV_DISABLE);
        assert!(config.disabled);

        let config = CacheConfig::from_env();
        assert!(!config.disabled);
    }
}

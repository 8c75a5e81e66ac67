#![forbid(unsafe_code)]

//! Tunables for a scope tree.
//!
//! The only knob is the digest iteration ceiling ("TTL"). It defaults to 10
//! and can be overridden from the `SCOPEWATCH_DIGEST_TTL` environment
//! variable or, with the `serde` feature, deserialized from a config file.

use std::env;

/// Environment variable read by [`ScopeConfig::from_env`].
pub const TTL_ENV_VAR: &str = "SCOPEWATCH_DIGEST_TTL";

/// Default number of dirty digest passes tolerated before giving up.
pub const DEFAULT_TTL: u32 = 10;

/// Configuration shared by every scope in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScopeConfig {
    ttl: u32,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl ScopeConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let ttl = env::var(TTL_ENV_VAR).ok();
        Self::from_env_value(ttl.as_deref())
    }

    /// Set the iteration ceiling. Zero is clamped to one.
    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl.max(1);
        self
    }

    /// The iteration ceiling.
    #[must_use]
    pub fn ttl(&self) -> u32 {
        self.ttl.max(1)
    }

    fn from_env_value(ttl: Option<&str>) -> Self {
        let config = Self::default();
        match ttl.map(str::trim).map(str::parse::<u32>) {
            Some(Ok(ttl)) => config.with_ttl(ttl),
            Some(Err(err)) => {
                tracing::warn!(var = TTL_ENV_VAR, %err, "ignoring unparsable digest ttl");
                config
            }
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_ten() {
        assert_eq!(ScopeConfig::default().ttl(), 10);
    }

    #[test]
    fn zero_ttl_is_clamped() {
        assert_eq!(ScopeConfig::new().with_ttl(0).ttl(), 1);
    }

    #[test]
    fn env_value_overrides_ttl() {
        assert_eq!(ScopeConfig::from_env_value(Some(" 25 ")).ttl(), 25);
    }

    #[test]
    fn env_value_garbage_falls_back() {
        assert_eq!(ScopeConfig::from_env_value(Some("lots")).ttl(), DEFAULT_TTL);
        assert_eq!(ScopeConfig::from_env_value(None).ttl(), DEFAULT_TTL);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let config: ScopeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScopeConfig::default());
        let config: ScopeConfig = serde_json::from_str(r#"{"ttl": 4}"#).unwrap();
        assert_eq!(config.ttl(), 4);
    }
}

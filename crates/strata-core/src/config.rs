//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! stale_configs_cache_enabled = true
//! stale_configs_cache_expiration_secs = 300
//! stale_configs_cache_max_entries = 10000
//!
//! [upgrade]
//! auto_skip_component_failures = false
//! auto_skip_service_check_failures = false
//! auto_skip_manual_verification = false
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_config::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use strata_config::StaleConfigCache;
use strata_upgrade::AutoSkip;

/// Upgrade orchestration settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeSettings {
    /// Skip failed component tasks automatically
    pub auto_skip_component_failures: bool,
    /// Skip failed service checks automatically
    pub auto_skip_service_check_failures: bool,
    /// Leave out manual verification stages
    pub auto_skip_manual_verification: bool,
}

impl UpgradeSettings {
    /// Auto-skip flags for an upgrade context
    #[must_use]
    pub fn auto_skip(&self) -> AutoSkip {
        AutoSkip {
            component_failures: self.auto_skip_component_failures,
            service_check_failures: self.auto_skip_service_check_failures,
            manual_verification: self.auto_skip_manual_verification,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memoize staleness results
    pub stale_configs_cache_enabled: bool,
    /// Seconds a memoized staleness result stays valid
    pub stale_configs_cache_expiration_secs: u64,
    /// Bound on memoized staleness results
    pub stale_configs_cache_max_entries: u64,
    /// Upgrade orchestration
    pub upgrade: UpgradeSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_configs_cache_enabled: true,
            stale_configs_cache_expiration_secs: DEFAULT_TTL.as_secs(),
            stale_configs_cache_max_entries: DEFAULT_MAX_ENTRIES,
            upgrade: UpgradeSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// `EngineError::Config` on malformed input.
    pub fn from_toml_str(input: &str) -> EngineResult<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `EngineError::Io` if the file cannot be read, `EngineError::Config` if
    /// it does not parse.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_toml_str(&input)
    }

    /// Turn staleness memoization on or off
    #[inline]
    #[must_use]
    pub fn with_stale_configs_cache_enabled(mut self, enabled: bool) -> Self {
        self.stale_configs_cache_enabled = enabled;
        self
    }

    /// Set the staleness cache TTL
    #[inline]
    #[must_use]
    pub fn with_stale_configs_cache_expiration_secs(mut self, secs: u64) -> Self {
        self.stale_configs_cache_expiration_secs = secs;
        self
    }

    /// Set the staleness cache bound
    #[inline]
    #[must_use]
    pub fn with_stale_configs_cache_max_entries(mut self, max_entries: u64) -> Self {
        self.stale_configs_cache_max_entries = max_entries;
        self
    }

    /// Set upgrade orchestration settings
    #[inline]
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: UpgradeSettings) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// Staleness cache built from these settings
    #[must_use]
    pub fn stale_configs_cache(&self) -> StaleConfigCache {
        if self.stale_configs_cache_enabled {
            StaleConfigCache::with_ttl(
                self.stale_configs_cache_max_entries,
                Duration::from_secs(self.stale_configs_cache_expiration_secs),
            )
        } else {
            StaleConfigCache::disabled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.stale_configs_cache_enabled);
        assert_eq!(config.stale_configs_cache_expiration_secs, 300);
        assert_eq!(config.stale_configs_cache_max_entries, 10_000);
        assert_eq!(config.upgrade.auto_skip(), AutoSkip::default());
    }

    #[test]
    fn partial_input_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r"
stale_configs_cache_expiration_secs = 60

[upgrade]
auto_skip_manual_verification = true
",
        )
        .unwrap();
        assert_eq!(config.stale_configs_cache_expiration_secs, 60);
        assert_eq!(config.stale_configs_cache_max_entries, 10_000);
        assert!(config.upgrade.auto_skip().manual_verification);
        assert!(!config.upgrade.auto_skip_component_failures);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let err = EngineConfig::from_toml_str("stale_configs_cache_enabled = \"yes\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn disabled_cache() {
        let cache = EngineConfig::new().with_stale_configs_cache_enabled(false).stale_configs_cache();
        assert!(!cache.is_enabled());
    }
}

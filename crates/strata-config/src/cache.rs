//! Stale-config result cache using moka
//!
//! Entries are keyed by host-component identity, its desired stack and a
//! fingerprint of the desired and actual tags it was computed from, so a tag
//! change or a stack move simply misses. Explicit invalidation covers
//! metadata reloads and host moves.

use crate::error::{ConfigError, ConfigResult};
use moka::sync::Cache;
use std::time::Duration;
use strata_state::{ClusterId, StackId};

/// Default number of cached evaluations
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Identity of one cached evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaleKey {
    /// Owning cluster
    pub cluster: ClusterId,
    /// Host name
    pub host: String,
    /// Service name
    pub service: String,
    /// Component name
    pub component: String,
    /// Desired stack the declared config types were read from
    pub stack: StackId,
    /// Hash of desired and actual tags
    pub fingerprint: u64,
}

/// Outcome of one staleness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleEntry {
    /// Whether the host-component runs stale configs
    pub stale: bool,
    /// Single command able to apply every changed property, if any
    pub refresh_command: Option<String>,
}

/// Bounded, time-expiring cache of staleness evaluations
#[derive(Debug, Clone)]
pub struct StaleConfigCache {
    inner: Cache<StaleKey, StaleEntry>,
    enabled: bool,
}

impl StaleConfigCache {
    /// Create cache with max capacity and no expiry
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .support_invalidation_closures()
                .build(),
            enabled: true,
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .support_invalidation_closures()
                .build(),
            enabled: true,
        }
    }

    /// Cache that never stores anything; every lookup recomputes
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Cache::new(0),
            enabled: false,
        }
    }

    /// Whether lookups can hit
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached evaluation
    #[inline]
    #[must_use]
    pub fn get(&self, key: &StaleKey) -> Option<StaleEntry> {
        if !self.enabled {
            return None;
        }
        self.inner.get(key)
    }

    /// Store an evaluation
    #[inline]
    pub fn insert(&self, key: StaleKey, entry: StaleEntry) {
        if self.enabled {
            self.inner.insert(key, entry);
        }
    }

    /// Drop every evaluation for a host
    ///
    /// # Errors
    /// `ConfigError::Cache` if the predicate could not be registered.
    pub fn invalidate_host(&self, host: &str) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let host = host.to_string();
        self.inner
            .invalidate_entries_if(move |key, _| key.host == host)
            .map(|_| ())
            .map_err(|e| ConfigError::Cache(e.to_string()))
    }

    /// Drop every evaluation for one host-component
    ///
    /// # Errors
    /// `ConfigError::Cache` if the predicate could not be registered.
    pub fn invalidate_host_component(
        &self,
        cluster: ClusterId,
        host: &str,
        service: &str,
        component: &str,
    ) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let (host, service, component) = (host.to_string(), service.to_string(), component.to_string());
        self.inner
            .invalidate_entries_if(move |key, _| {
                key.cluster == cluster && key.host == host && key.service == service && key.component == component
            })
            .map(|_| ())
            .map_err(|e| ConfigError::Cache(e.to_string()))
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks();
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for StaleConfigCache {
    /// Cache with default capacity (10,000 entries) and five-minute expiry
    fn default() -> Self {
        Self::with_ttl(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str, component: &str) -> StaleKey {
        StaleKey {
            cluster: ClusterId(1),
            host: host.to_string(),
            service: "HDFS".to_string(),
            component: component.to_string(),
            stack: StackId::new("HDP", "2.2"),
            fingerprint: 7,
        }
    }

    fn entry(stale: bool) -> StaleEntry {
        StaleEntry {
            stale,
            refresh_command: None,
        }
    }

    #[test]
    fn cache_insert_and_get() {
        let cache = StaleConfigCache::new(100);
        cache.insert(key("h1", "DATANODE"), entry(true));
        assert_eq!(cache.get(&key("h1", "DATANODE")), Some(entry(true)));
        assert_eq!(cache.get(&key("h2", "DATANODE")), None);
    }

    #[test]
    fn invalidate_host_leaves_other_hosts() {
        let cache = StaleConfigCache::new(100);
        cache.insert(key("h1", "DATANODE"), entry(true));
        cache.insert(key("h1", "NAMENODE"), entry(false));
        cache.insert(key("h2", "DATANODE"), entry(false));

        cache.invalidate_host("h1").unwrap();
        assert!(cache.get(&key("h1", "DATANODE")).is_none());
        assert!(cache.get(&key("h1", "NAMENODE")).is_none());
        assert!(cache.get(&key("h2", "DATANODE")).is_some());
    }

    #[test]
    fn invalidate_host_component_is_narrow() {
        let cache = StaleConfigCache::new(100);
        cache.insert(key("h1", "DATANODE"), entry(true));
        cache.insert(key("h1", "NAMENODE"), entry(false));

        cache
            .invalidate_host_component(ClusterId(1), "h1", "HDFS", "DATANODE")
            .unwrap();
        assert!(cache.get(&key("h1", "DATANODE")).is_none());
        assert!(cache.get(&key("h1", "NAMENODE")).is_some());
    }

    #[test]
    fn invalidate_all_clears() {
        let cache = StaleConfigCache::default();
        cache.insert(key("h1", "DATANODE"), entry(true));
        cache.invalidate_all();
        assert!(cache.get(&key("h1", "DATANODE")).is_none());
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = StaleConfigCache::disabled();
        cache.insert(key("h1", "DATANODE"), entry(true));
        assert!(!cache.is_enabled());
        assert!(cache.get(&key("h1", "DATANODE")).is_none());
        assert!(cache.invalidate_host("h1").is_ok());
    }

    #[test]
    fn cache_stats() {
        let cache = StaleConfigCache::new(100);
        for host in ["h1", "h2", "h3"] {
            cache.insert(key(host, "DATANODE"), entry(false));
        }
        assert_eq!(cache.stats().entry_count, 3);
    }
}

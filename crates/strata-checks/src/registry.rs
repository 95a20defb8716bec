//! Ordered check registry

use crate::builtin::{
    HostsHeartbeatCheck, HostsMasterMaintenanceCheck, HostsRepositoryVersionCheck, ServicesMaintenanceModeCheck,
    ServicesUpCheck, StaleConfigsCheck,
};
use crate::check::{CheckDescriptor, CheckRequest};
use tracing::warn;

/// Checks in the order they run
#[derive(Debug, Default)]
pub struct UpgradeCheckRegistry {
    checks: Vec<Box<dyn CheckDescriptor>>,
}

impl UpgradeCheckRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Registry with the built-in checks
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HostsHeartbeatCheck);
        registry.register(HostsMasterMaintenanceCheck);
        registry.register(ServicesUpCheck);
        registry.register(ServicesMaintenanceModeCheck);
        registry.register(StaleConfigsCheck);
        registry.register(HostsRepositoryVersionCheck);
        registry
    }

    /// Append a check
    pub fn register(&mut self, check: impl CheckDescriptor + 'static) {
        self.checks.push(Box::new(check));
    }

    /// Check ids in order
    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.id()).collect()
    }

    /// Checks in order
    pub fn iter(&self) -> impl Iterator<Item = &dyn CheckDescriptor> {
        self.checks.iter().map(|c| &**c)
    }

    /// Checks the request selects, in registry order
    ///
    /// Selected ids with no registered check are logged and ignored.
    pub fn selected<'a>(&'a self, request: &'a CheckRequest) -> impl Iterator<Item = &'a dyn CheckDescriptor> {
        if let Some(ids) = &request.check_ids {
            for unknown in ids.iter().filter(|id| !self.checks.iter().any(|c| c.id() == id.as_str())) {
                warn!(check = %unknown, "requested pre-flight check is not registered");
            }
        }
        self.iter().filter(move |c| request.selects(c.id()))
    }

    /// Number of checks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no check is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ordered() {
        let registry = UpgradeCheckRegistry::with_defaults();
        assert_eq!(
            registry.ids(),
            vec![
                "HOSTS_HEARTBEAT",
                "HOSTS_MASTER_MAINTENANCE",
                "SERVICES_UP",
                "SERVICES_MAINTENANCE_MODE",
                "SERVICES_STALE_CONFIGS",
                "HOSTS_REPOSITORY_VERSION",
            ]
        );
        assert!(!registry.is_empty());
        assert!(UpgradeCheckRegistry::new().is_empty());
    }

    #[test]
    fn selection_keeps_registry_order() {
        let registry = UpgradeCheckRegistry::with_defaults();
        let request = CheckRequest::new("c1").with_check_ids(["SERVICES_UP", "HOSTS_HEARTBEAT", "NO_SUCH_CHECK"]);
        let ids: Vec<_> = registry.selected(&request).map(|c| c.id()).collect();
        assert_eq!(ids, vec!["HOSTS_HEARTBEAT", "SERVICES_UP"]);

        let none = CheckRequest::new("c1").with_check_ids(Vec::<String>::new());
        assert_eq!(registry.selected(&none).count(), 0);
        assert_eq!(registry.selected(&CheckRequest::new("c1")).count(), registry.len());
    }
}

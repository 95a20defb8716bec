//! Per-upgrade context
//!
//! Fixed at creation: cluster, direction, versions, pack and resolver. The
//! plan builder accumulates unhealthy host-components and display names on
//! it while walking the pack.

use crate::pack::{Direction, UpgradePack, UpgradeType};
use crate::resolver::MasterHostResolver;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use strata_state::{Cluster, RepositoryVersion};

/// Failures the orchestrator may skip without operator input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoSkip {
    /// Skip failed component tasks
    pub component_failures: bool,
    /// Skip failed service checks
    pub service_check_failures: bool,
    /// Drop manual verification stages
    pub manual_verification: bool,
}

/// A host-component left out of the plan because its host is unhealthy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnhealthyComponent {
    /// Host name
    pub host: String,
    /// Service name
    pub service: String,
    /// Component name
    pub component: String,
}

#[derive(Debug, Default)]
struct Accumulated {
    auto_skip: AutoSkip,
    unhealthy: Vec<UnhealthyComponent>,
    service_display_names: BTreeMap<String, String>,
    component_display_names: BTreeMap<(String, String), String>,
}

/// Everything the plan builder needs to know about one upgrade
pub struct UpgradeContext {
    cluster: Arc<Cluster>,
    direction: Direction,
    upgrade_type: UpgradeType,
    source: RepositoryVersion,
    target: RepositoryVersion,
    pack: Arc<UpgradePack>,
    resolver: Arc<dyn MasterHostResolver>,
    supported_services: BTreeSet<String>,
    state: Mutex<Accumulated>,
}

impl UpgradeContext {
    /// Context for moving `cluster` from `source` to `target`
    ///
    /// Every service of the cluster is in scope.
    #[must_use]
    pub fn new(
        cluster: Arc<Cluster>,
        direction: Direction,
        source: RepositoryVersion,
        target: RepositoryVersion,
        pack: Arc<UpgradePack>,
        resolver: Arc<dyn MasterHostResolver>,
    ) -> Self {
        let supported_services = cluster.services().iter().map(|s| s.name().to_string()).collect();
        Self {
            upgrade_type: pack.upgrade_type,
            cluster,
            direction,
            source,
            target,
            pack,
            resolver,
            supported_services,
            state: Mutex::new(Accumulated::default()),
        }
    }

    /// Restrict the upgrade to some services
    #[must_use]
    pub fn with_supported_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Set failure auto-skip behaviour
    #[must_use]
    pub fn with_auto_skip(self, auto_skip: AutoSkip) -> Self {
        self.state.lock().auto_skip = auto_skip;
        self
    }

    /// A fresh context running the same upgrade the other way
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            direction: self.direction.reversed(),
            upgrade_type: self.upgrade_type,
            source: self.source.clone(),
            target: self.target.clone(),
            pack: Arc::clone(&self.pack),
            resolver: Arc::clone(&self.resolver),
            supported_services: self.supported_services.clone(),
            state: Mutex::new(Accumulated {
                auto_skip: self.auto_skip(),
                ..Accumulated::default()
            }),
        }
    }

    /// Cluster being upgraded
    #[inline]
    #[must_use]
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Direction
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Orchestration style
    #[inline]
    #[must_use]
    pub fn upgrade_type(&self) -> UpgradeType {
        self.upgrade_type
    }

    /// Version the cluster starts the upgrade from
    #[inline]
    #[must_use]
    pub fn source(&self) -> &RepositoryVersion {
        &self.source
    }

    /// Version the upgrade moves to
    #[inline]
    #[must_use]
    pub fn target(&self) -> &RepositoryVersion {
        &self.target
    }

    /// Repository the cluster ends up on in this direction: the target when
    /// upgrading, the source when downgrading
    #[must_use]
    pub fn repository_version(&self) -> &RepositoryVersion {
        match self.direction {
            Direction::Upgrade => &self.target,
            Direction::Downgrade => &self.source,
        }
    }

    /// Version string of [`Self::repository_version`]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.repository_version().version
    }

    /// Upgrade pack
    #[inline]
    #[must_use]
    pub fn pack(&self) -> &UpgradePack {
        &self.pack
    }

    /// Host resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &dyn MasterHostResolver {
        self.resolver.as_ref()
    }

    /// Whether the service is in scope
    #[must_use]
    pub fn is_service_supported(&self, service: &str) -> bool {
        self.supported_services.contains(service)
    }

    /// Auto-skip settings
    #[must_use]
    pub fn auto_skip(&self) -> AutoSkip {
        self.state.lock().auto_skip
    }

    /// Change auto-skip settings
    pub fn set_auto_skip(&self, auto_skip: AutoSkip) {
        self.state.lock().auto_skip = auto_skip;
    }

    /// Record host-components left out of the plan
    pub fn add_unhealthy(&self, service: &str, component: &str, hosts: &[String]) {
        let mut state = self.state.lock();
        for host in hosts {
            let entry = UnhealthyComponent {
                host: host.clone(),
                service: service.to_string(),
                component: component.to_string(),
            };
            if !state.unhealthy.contains(&entry) {
                state.unhealthy.push(entry);
            }
        }
    }

    /// Host-components left out of the plan so far
    #[must_use]
    pub fn unhealthy(&self) -> Vec<UnhealthyComponent> {
        self.state.lock().unhealthy.clone()
    }

    /// Record the display name of a service
    pub fn set_service_display_name(&self, service: &str, display_name: &str) {
        self.state
            .lock()
            .service_display_names
            .insert(service.to_string(), display_name.to_string());
    }

    /// Display name of a service, or its name when none was recorded
    #[must_use]
    pub fn service_display_name(&self, service: &str) -> String {
        self.state
            .lock()
            .service_display_names
            .get(service)
            .cloned()
            .unwrap_or_else(|| service.to_string())
    }

    /// Record the display name of a component
    pub fn set_component_display_name(&self, service: &str, component: &str, display_name: &str) {
        self.state.lock().component_display_names.insert(
            (service.to_string(), component.to_string()),
            display_name.to_string(),
        );
    }

    /// Display name of a component, or its name when none was recorded
    #[must_use]
    pub fn component_display_name(&self, service: &str, component: &str) -> String {
        self.state
            .lock()
            .component_display_names
            .get(&(service.to_string(), component.to_string()))
            .cloned()
            .unwrap_or_else(|| component.to_string())
    }
}

impl fmt::Debug for UpgradeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeContext")
            .field("cluster", &self.cluster.name())
            .field("direction", &self.direction)
            .field("upgrade_type", &self.upgrade_type)
            .field("source", &self.source.version)
            .field("target", &self.target.version)
            .field("pack", &self.pack.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MockMasterHostResolver;
    use strata_state::{Clusters, InMemoryPersistence, StackId};

    fn context(direction: Direction) -> UpgradeContext {
        let clusters = Clusters::new(Arc::new(InMemoryPersistence::new()));
        let cluster = clusters.add_cluster("c1", StackId::new("HDP", "2.2")).unwrap();
        cluster.add_service("HDFS").unwrap();
        cluster.add_service("YARN").unwrap();
        UpgradeContext::new(
            cluster,
            direction,
            RepositoryVersion::new(1, StackId::new("HDP", "2.2"), "2.2.0.0-2041"),
            RepositoryVersion::new(2, StackId::new("HDP", "2.3"), "2.3.0.0-1234"),
            Arc::new(UpgradePack::new("p", UpgradeType::Rolling)),
            Arc::new(MockMasterHostResolver::new()),
        )
    }

    #[test]
    fn version_follows_direction() {
        let up = context(Direction::Upgrade);
        assert_eq!(up.version(), "2.3.0.0-1234");
        let down = up.reversed();
        assert_eq!(down.direction(), Direction::Downgrade);
        assert_eq!(down.version(), "2.2.0.0-2041");
    }

    #[test]
    fn all_services_supported_by_default() {
        let ctx = context(Direction::Upgrade);
        assert!(ctx.is_service_supported("HDFS"));
        assert!(ctx.is_service_supported("YARN"));
        let ctx = ctx.with_supported_services(["HDFS"]);
        assert!(!ctx.is_service_supported("YARN"));
    }

    #[test]
    fn reversed_keeps_auto_skip_and_drops_accumulated_state() {
        let ctx = context(Direction::Upgrade).with_auto_skip(AutoSkip {
            component_failures: true,
            ..AutoSkip::default()
        });
        ctx.add_unhealthy("HDFS", "DATANODE", &["h2".to_string()]);
        ctx.add_unhealthy("HDFS", "DATANODE", &["h2".to_string()]);
        assert_eq!(ctx.unhealthy().len(), 1);

        let down = ctx.reversed();
        assert!(down.auto_skip().component_failures);
        assert!(down.unhealthy().is_empty());
    }

    #[test]
    fn display_names_fall_back_to_names() {
        let ctx = context(Direction::Upgrade);
        assert_eq!(ctx.service_display_name("HDFS"), "HDFS");
        ctx.set_component_display_name("HDFS", "NAMENODE", "NameNode");
        assert_eq!(ctx.component_display_name("HDFS", "NAMENODE"), "NameNode");
    }
}

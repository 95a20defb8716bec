//! Engine facade
//!
//! [`ClusterEngine`] wires the entity model, config reconciliation, plan
//! construction and pre-flight checks together behind one configuration.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::topology::Topology;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use strata_checks::{CheckContext, CheckHelper, CheckRequest, PrerequisiteCheck, UpgradeCheckRegistry};
use strata_config::ConfigHelper;
use strata_state::{Cluster, Clusters, MetadataProvider, RepositoryVersion};
use strata_upgrade::{
    ClusterHostResolver, Direction, UnhealthyComponent, UpgradeContext, UpgradeGroupHolder, UpgradeHelper,
    UpgradePack, UpgradeType,
};
use tracing::info;

/// A host-component whose configuration is stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleComponent {
    /// Service name
    pub service: String,
    /// Component name
    pub component: String,
    /// Host name
    pub host: String,
    /// Command that applies the change without a restart, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_command: Option<String>,
}

/// Finished plan with the context it was built for
#[derive(Debug, Clone, Serialize)]
pub struct UpgradePlan {
    /// Cluster name
    pub cluster: String,
    /// Direction
    pub direction: Direction,
    /// Orchestration style
    pub upgrade_type: UpgradeType,
    /// Version the cluster ends up on
    pub version: String,
    /// Groups in order
    pub groups: Vec<UpgradeGroupHolder>,
    /// Host-components left out because their host is unhealthy
    pub unhealthy: Vec<UnhealthyComponent>,
}

/// Engine over one cluster registry
pub struct ClusterEngine {
    config: EngineConfig,
    clusters: Arc<Clusters>,
    metadata: Arc<dyn MetadataProvider>,
    config_helper: Arc<ConfigHelper>,
    repository_versions: Vec<RepositoryVersion>,
    checks: UpgradeCheckRegistry,
}

impl ClusterEngine {
    /// Engine over a registry; the staleness cache follows `config`
    #[must_use]
    pub fn new(config: EngineConfig, clusters: Arc<Clusters>, metadata: Arc<dyn MetadataProvider>) -> Self {
        let config_helper = Arc::new(ConfigHelper::new(Arc::clone(&metadata), config.stale_configs_cache()));
        Self {
            config,
            clusters,
            metadata,
            config_helper,
            repository_versions: Vec::new(),
            checks: UpgradeCheckRegistry::with_defaults(),
        }
    }

    /// Engine over a loaded topology
    #[must_use]
    pub fn from_topology(config: EngineConfig, topology: Topology) -> Self {
        let mut engine = Self::new(config, topology.clusters, topology.metadata);
        engine.repository_versions = topology.repository_versions;
        engine
    }

    /// Add a known repository version
    #[must_use]
    pub fn with_repository_version(mut self, version: RepositoryVersion) -> Self {
        self.repository_versions.push(version);
        self
    }

    /// Replace the pre-flight check registry
    #[must_use]
    pub fn with_checks(mut self, checks: UpgradeCheckRegistry) -> Self {
        self.checks = checks;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cluster registry
    #[inline]
    #[must_use]
    pub fn clusters(&self) -> &Arc<Clusters> {
        &self.clusters
    }

    /// Staleness evaluation
    #[inline]
    #[must_use]
    pub fn config_helper(&self) -> &Arc<ConfigHelper> {
        &self.config_helper
    }

    /// Known repository version by version string
    #[must_use]
    pub fn repository_version(&self, version: &str) -> Option<&RepositoryVersion> {
        self.repository_versions.iter().find(|r| r.version == version)
    }

    /// Whether one host-component runs stale configuration
    ///
    /// # Errors
    /// Unknown cluster or host-component.
    pub fn is_stale_configs(&self, cluster: &str, service: &str, component: &str, host: &str) -> EngineResult<bool> {
        let cluster = self.clusters.cluster(cluster)?;
        let sch = cluster.host_component(service, component, host)?;
        Ok(self.config_helper.is_stale_configs(&cluster, &sch)?)
    }

    /// Every host-component of the cluster with stale configuration, in
    /// (service, component, host) order
    ///
    /// # Errors
    /// Unknown cluster.
    pub fn stale_host_components(&self, cluster: &str) -> EngineResult<Vec<StaleComponent>> {
        let cluster = self.clusters.cluster(cluster)?;
        let mut stale = Vec::new();
        for sch in cluster.all_host_components() {
            if self.config_helper.is_stale_configs(&cluster, &sch)? {
                stale.push(StaleComponent {
                    service: sch.service_name().to_string(),
                    component: sch.component_name().to_string(),
                    host: sch.host_name().to_string(),
                    refresh_command: self.config_helper.refresh_configs_command(&cluster, &sch)?,
                });
            }
        }
        stale.sort_by(|a, b| (&a.service, &a.component, &a.host).cmp(&(&b.service, &b.component, &b.host)));
        Ok(stale)
    }

    /// Drop memoized staleness results for a host
    ///
    /// # Errors
    /// Cache refused the invalidation.
    pub fn invalidate_host(&self, host: &str) -> EngineResult<()> {
        Ok(self.config_helper.invalidate_host(host)?)
    }

    /// Build the plan for moving a cluster with `pack`
    ///
    /// The source version is the cluster's current version. The target is
    /// `target` when given, otherwise the known repository version on the
    /// pack's target stack.
    ///
    /// # Errors
    /// Unknown cluster, unresolvable versions or plan construction failure.
    pub fn plan_upgrade(
        &self,
        cluster: &str,
        pack: UpgradePack,
        direction: Direction,
        target: Option<&str>,
    ) -> EngineResult<UpgradePlan> {
        let cluster = self.clusters.cluster(cluster)?;
        let source = self.source_version(&cluster)?;
        let target = self.target_version(&pack, target)?;
        let resolver = Arc::new(ClusterHostResolver::new(Arc::clone(&cluster), Arc::clone(&self.clusters)));

        let upgrade = UpgradeContext::new(
            Arc::clone(&cluster),
            Direction::Upgrade,
            source,
            target,
            Arc::new(pack),
            resolver,
        )
        .with_auto_skip(self.config.upgrade.auto_skip());
        let ctx = match direction {
            Direction::Upgrade => upgrade,
            Direction::Downgrade => upgrade.reversed(),
        };

        let groups = UpgradeHelper::new(Arc::clone(&self.metadata)).create_upgrade(&ctx)?;
        info!(cluster = %cluster.name(), direction = %direction, groups = groups.len(), "plan built");
        Ok(UpgradePlan {
            cluster: cluster.name().to_string(),
            direction,
            upgrade_type: ctx.upgrade_type(),
            version: ctx.version().to_string(),
            groups,
            unhealthy: ctx.unhealthy(),
        })
    }

    /// Run the pre-flight checks
    #[must_use]
    pub fn perform_checks(&self, request: &CheckRequest) -> Vec<PrerequisiteCheck> {
        let ctx = CheckContext {
            clusters: Arc::clone(&self.clusters),
            config_helper: Arc::clone(&self.config_helper),
            metadata: Arc::clone(&self.metadata),
        };
        CheckHelper::new().perform_checks(request, &self.checks, &ctx)
    }

    /// Run the pre-flight checks a pack requires
    #[must_use]
    pub fn perform_checks_for_pack(&self, request: &CheckRequest, pack: &UpgradePack) -> Vec<PrerequisiteCheck> {
        let request = request.clone().with_check_ids(pack.prerequisite_checks.iter().cloned());
        self.perform_checks(&request)
    }

    fn source_version(&self, cluster: &Cluster) -> EngineResult<RepositoryVersion> {
        let current = cluster.current_cluster_version().ok_or_else(|| {
            EngineError::InconsistentTopology(format!("cluster {} has no current version", cluster.name()))
        })?;
        self.repository_version(&current).cloned().ok_or_else(|| {
            EngineError::InconsistentTopology(format!("repository version {current} is not known"))
        })
    }

    fn target_version(&self, pack: &UpgradePack, target: Option<&str>) -> EngineResult<RepositoryVersion> {
        let found = match (target, &pack.target_stack) {
            (Some(version), _) => self.repository_version(version),
            (None, Some(stack)) => self.repository_versions.iter().find(|r| &r.stack_id == stack),
            (None, None) => None,
        };
        found.cloned().ok_or_else(|| {
            EngineError::InconsistentTopology(format!(
                "no target repository version for pack {} (requested {})",
                pack.name,
                target.unwrap_or("none")
            ))
        })
    }
}

impl fmt::Debug for ClusterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEngine")
            .field("config", &self.config)
            .field("repository_versions", &self.repository_versions.len())
            .field("checks", &self.checks.ids())
            .finish_non_exhaustive()
    }
}

//! Topology documents
//!
//! A JSON snapshot of stack metadata, hosts and clusters, used by the CLI
//! and tests to build a populated [`Clusters`] registry.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use strata_state::{
    Cluster, Clusters, ComponentCategory, Config, HostConfig, HostHealthStatus, HostInfo, InMemoryPersistence,
    MaintenanceState, MetadataProvider, RepositoryVersion, RepositoryVersionState, StackId, State, StaticMetadata,
};
use tracing::{debug, info};

/// A host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Host name
    pub name: String,
    /// Agent-reported health
    #[serde(default)]
    pub health: HostHealthStatus,
    /// Hardware facts
    #[serde(default)]
    pub info: HostInfo,
    /// Repository version ledger
    #[serde(default)]
    pub versions: BTreeMap<String, RepositoryVersionState>,
}

/// A config group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroupSpec {
    /// Group name
    pub name: String,
    /// Owning service
    pub service: String,
    /// Member hosts
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    /// Config type → override tag
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
}

/// One component instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostComponentSpec {
    /// Host name
    pub host: String,
    /// Lifecycle state
    #[serde(default)]
    pub state: State,
    /// Target lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<State>,
    /// Config tags applied at the last run
    #[serde(default)]
    pub actual_configs: BTreeMap<String, HostConfig>,
    /// Restart already flagged
    #[serde(default)]
    pub restart_required: bool,
    /// In maintenance
    #[serde(default)]
    pub maintenance: bool,
}

/// A component and its instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component name
    pub name: String,
    /// Category; looked up in the stack metadata when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ComponentCategory>,
    /// Instances
    #[serde(default)]
    pub hosts: Vec<HostComponentSpec>,
}

/// A service and its components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name
    pub name: String,
    /// In maintenance
    #[serde(default)]
    pub maintenance: bool,
    /// Components
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

/// A cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name
    pub name: String,
    /// Desired stack
    pub stack: StackId,
    /// Member hosts
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Member hosts in maintenance
    #[serde(default)]
    pub maintenance_hosts: BTreeSet<String>,
    /// Cluster repository version ledger
    #[serde(default)]
    pub versions: BTreeMap<String, RepositoryVersionState>,
    /// Config versions
    #[serde(default)]
    pub configs: Vec<Config>,
    /// Config type → desired tag
    #[serde(default)]
    pub desired_configs: BTreeMap<String, String>,
    /// Config groups
    #[serde(default)]
    pub config_groups: Vec<ConfigGroupSpec>,
    /// Services
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

/// Whole topology document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    /// Stack definitions
    #[serde(default)]
    pub metadata: StaticMetadata,
    /// Known repository versions
    #[serde(default)]
    pub repository_versions: Vec<RepositoryVersion>,
    /// Hosts
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
    /// Clusters
    #[serde(default)]
    pub clusters: Vec<ClusterSpec>,
}

/// Registry built from a document
#[derive(Debug)]
pub struct Topology {
    /// Populated registry
    pub clusters: Arc<Clusters>,
    /// Stack definitions
    pub metadata: Arc<StaticMetadata>,
    /// Known repository versions
    pub repository_versions: Vec<RepositoryVersion>,
}

impl TopologyDocument {
    /// Parse a JSON document
    ///
    /// # Errors
    /// `EngineError::Topology` on malformed input.
    pub fn from_json(input: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Read and parse a JSON file
    ///
    /// # Errors
    /// `EngineError::Io` or `EngineError::Topology`.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_json(&input)
    }

    /// Build an in-memory registry
    ///
    /// # Errors
    /// Entity-model rejections, e.g. a host-component on a host that is not a
    /// cluster member.
    pub fn build(self) -> EngineResult<Topology> {
        let clusters = Arc::new(Clusters::new(Arc::new(InMemoryPersistence::new())));

        for spec in &self.hosts {
            let host = clusters.add_host(&spec.name)?;
            host.set_info(spec.info.clone())?;
            host.set_health(spec.health)?;
            for (version, state) in &spec.versions {
                host.register_version(version, *state)?;
            }
        }

        for spec in &self.clusters {
            let cluster = clusters.add_cluster(&spec.name, spec.stack.clone())?;
            for host in &spec.hosts {
                clusters.map_host_to_cluster(host, &spec.name)?;
            }
            for host in &spec.maintenance_hosts {
                if !spec.hosts.contains(host) {
                    return Err(EngineError::InconsistentTopology(format!(
                        "maintenance host {host} is not a member of cluster {}",
                        spec.name
                    )));
                }
                clusters.host(host)?.set_maintenance_state(cluster.id(), MaintenanceState::On)?;
            }
            for (version, state) in &spec.versions {
                cluster.register_cluster_version(version, *state)?;
            }
            Self::load_configs(&cluster, spec)?;
            Self::load_services(&cluster, spec, &self.metadata)?;
            debug!(cluster = %spec.name, services = spec.services.len(), "cluster loaded");
        }

        info!(
            hosts = self.hosts.len(),
            clusters = self.clusters.len(),
            "topology loaded"
        );
        Ok(Topology {
            clusters,
            metadata: Arc::new(self.metadata),
            repository_versions: self.repository_versions,
        })
    }

    fn load_configs(cluster: &Cluster, spec: &ClusterSpec) -> EngineResult<()> {
        for config in &spec.configs {
            cluster.add_config(config.clone())?;
        }
        for (config_type, tag) in &spec.desired_configs {
            cluster.add_desired_config("topology", config_type, tag)?;
        }
        for group in &spec.config_groups {
            cluster.add_config_group(&group.name, &group.service, group.hosts.clone(), group.configs.clone())?;
        }
        Ok(())
    }

    fn load_services(cluster: &Cluster, spec: &ClusterSpec, metadata: &StaticMetadata) -> EngineResult<()> {
        for service_spec in &spec.services {
            let service = cluster.add_service(&service_spec.name)?;
            if service_spec.maintenance {
                service.set_maintenance_state(MaintenanceState::On)?;
            }
            for component_spec in &service_spec.components {
                let category = component_spec
                    .category
                    .or_else(|| metadata.component_category(&spec.stack, &service_spec.name, &component_spec.name))
                    .ok_or_else(|| {
                        EngineError::InconsistentTopology(format!(
                            "no category for component {}/{} on stack {}",
                            service_spec.name, component_spec.name, spec.stack
                        ))
                    })?;
                cluster.add_component(&service_spec.name, &component_spec.name, category)?;

                for sch_spec in &component_spec.hosts {
                    let sch = cluster.add_host_component(&service_spec.name, &component_spec.name, &sch_spec.host)?;
                    sch.set_state(sch_spec.state)?;
                    if let Some(desired) = sch_spec.desired_state {
                        sch.set_desired_state(desired)?;
                    }
                    if !sch_spec.actual_configs.is_empty() {
                        sch.update_actual_configs(sch_spec.actual_configs.clone())?;
                    }
                    if sch_spec.restart_required {
                        sch.set_restart_required(true)?;
                    }
                    if sch_spec.maintenance {
                        sch.set_maintenance_state(MaintenanceState::On)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Topology {
    /// Known repository version by version string
    #[must_use]
    pub fn repository_version(&self, version: &str) -> Option<&RepositoryVersion> {
        self.repository_versions.iter().find(|r| r.version == version)
    }
}

//! Master host resolution
//!
//! Before a component is staged the plan builder asks a [`MasterHostResolver`]
//! where it runs, which instance is the active master and which hosts are
//! currently unhealthy.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_state::{Cluster, Clusters, ComponentCategory, HostHealthStatus};
use tracing::debug;

/// Hosts a component is staged on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostsType {
    /// Healthy hosts to stage, in host order
    pub hosts: Vec<String>,
    /// Active master
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    /// Standby master
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    /// Hosts running the component whose host is not healthy
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unhealthy: Vec<String>,
}

impl HostsType {
    /// Hosts with no master information
    #[must_use]
    pub fn of(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Set the active and standby masters
    #[must_use]
    pub fn with_masters(mut self, master: &str, secondary: Option<&str>) -> Self {
        self.master = Some(master.to_string());
        self.secondary = secondary.map(ToString::to_string);
        self
    }

    /// Whether there is nothing to stage
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Looks up where a component runs
///
/// # Thread Safety
///
/// Resolvers are shared by the upgrade context and must be `Send + Sync`.
#[cfg_attr(test, mockall::automock)]
pub trait MasterHostResolver: Send + Sync {
    /// Hosts of a component, or `None` when the component has no live
    /// instance
    fn master_and_hosts(&self, service: &str, component: &str) -> Option<HostsType>;

    /// Whether the NameNode runs in high-availability mode
    fn is_name_node_ha(&self) -> bool {
        false
    }
}

/// Resolver backed by the cluster topology and host health
pub struct ClusterHostResolver {
    cluster: Arc<Cluster>,
    clusters: Arc<Clusters>,
    active_masters: BTreeMap<(String, String), String>,
}

impl ClusterHostResolver {
    /// Resolver over `cluster`; hosts are looked up in `clusters`
    #[must_use]
    pub fn new(cluster: Arc<Cluster>, clusters: Arc<Clusters>) -> Self {
        Self {
            cluster,
            clusters,
            active_masters: BTreeMap::new(),
        }
    }

    /// Record which host runs the active instance of a master
    ///
    /// Without it the first healthy host is taken as active.
    #[must_use]
    pub fn with_active_master(mut self, service: &str, component: &str, host: &str) -> Self {
        self.active_masters
            .insert((service.to_string(), component.to_string()), host.to_string());
        self
    }

    fn is_host_healthy(&self, host: &str) -> bool {
        self.clusters
            .host(host)
            .map(|h| h.health() == HostHealthStatus::Healthy)
            .unwrap_or(false)
    }

    fn is_host_in_maintenance(&self, host: &str) -> bool {
        self.clusters
            .host(host)
            .map(|h| h.maintenance_state(self.cluster.id()).is_on())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ClusterHostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHostResolver")
            .field("cluster", &self.cluster.name())
            .field("active_masters", &self.active_masters)
            .finish_non_exhaustive()
    }
}

impl MasterHostResolver for ClusterHostResolver {
    fn master_and_hosts(&self, service: &str, component: &str) -> Option<HostsType> {
        let schs = self.cluster.host_components(service, component).ok()?;
        let mut resolved = HostsType::default();
        let mut category = None;

        for sch in schs {
            let host = sch.host_name();
            if sch.maintenance_state().is_on() || self.is_host_in_maintenance(host) {
                debug!(service, component, host, "skipping host-component in maintenance");
                continue;
            }
            category = Some(sch.category());
            if self.is_host_healthy(host) {
                resolved.hosts.push(host.to_string());
            } else {
                resolved.unhealthy.push(host.to_string());
            }
        }

        if resolved.hosts.is_empty() && resolved.unhealthy.is_empty() {
            return None;
        }

        if category == Some(ComponentCategory::Master) && !resolved.hosts.is_empty() {
            let key = (service.to_string(), component.to_string());
            let master = self
                .active_masters
                .get(&key)
                .filter(|h| resolved.hosts.contains(h))
                .cloned()
                .unwrap_or_else(|| resolved.hosts[0].clone());
            resolved.secondary = resolved.hosts.iter().find(|h| **h != master).cloned();
            resolved.master = Some(master);
        }

        Some(resolved)
    }

    fn is_name_node_ha(&self) -> bool {
        self.cluster
            .host_components("HDFS", "NAMENODE")
            .map(|schs| schs.len() > 1)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_state::{InMemoryPersistence, MaintenanceState, StackId};

    fn topology(hosts: &[&str]) -> (Arc<Clusters>, Arc<Cluster>) {
        let clusters = Arc::new(Clusters::new(Arc::new(InMemoryPersistence::new())));
        let cluster = clusters.add_cluster("c1", StackId::new("HDP", "2.2")).unwrap();
        cluster.add_service("HDFS").unwrap();
        cluster
            .add_component("HDFS", "NAMENODE", ComponentCategory::Master)
            .unwrap();
        for host in hosts {
            clusters.add_host(host).unwrap();
            clusters.map_host_to_cluster(host, "c1").unwrap();
            clusters.host(host).unwrap().set_health(HostHealthStatus::Healthy).unwrap();
            cluster.add_host_component("HDFS", "NAMENODE", host).unwrap();
        }
        (clusters, cluster)
    }

    #[test]
    fn first_healthy_host_is_master() {
        let (clusters, cluster) = topology(&["h1", "h2"]);
        let resolver = ClusterHostResolver::new(cluster, clusters);
        let hosts = resolver.master_and_hosts("HDFS", "NAMENODE").unwrap();
        assert_eq!(hosts.master.as_deref(), Some("h1"));
        assert_eq!(hosts.secondary.as_deref(), Some("h2"));
        assert!(resolver.is_name_node_ha());
    }

    #[test]
    fn active_master_override() {
        let (clusters, cluster) = topology(&["h1", "h2"]);
        let resolver =
            ClusterHostResolver::new(cluster, clusters).with_active_master("HDFS", "NAMENODE", "h2");
        let hosts = resolver.master_and_hosts("HDFS", "NAMENODE").unwrap();
        assert_eq!(hosts.master.as_deref(), Some("h2"));
        assert_eq!(hosts.secondary.as_deref(), Some("h1"));
    }

    #[test]
    fn unhealthy_and_maintenance_hosts_are_set_aside() {
        let (clusters, cluster) = topology(&["h1", "h2", "h3"]);
        clusters.host("h2").unwrap().set_health(HostHealthStatus::Unhealthy).unwrap();
        clusters
            .host("h3")
            .unwrap()
            .set_maintenance_state(cluster.id(), MaintenanceState::On)
            .unwrap();
        let resolver = ClusterHostResolver::new(cluster, clusters);
        let hosts = resolver.master_and_hosts("HDFS", "NAMENODE").unwrap();
        assert_eq!(hosts.hosts, vec!["h1".to_string()]);
        assert_eq!(hosts.unhealthy, vec!["h2".to_string()]);
        assert_eq!(hosts.secondary, None);
    }

    #[test]
    fn unknown_component_resolves_to_none() {
        let (clusters, cluster) = topology(&["h1"]);
        let resolver = ClusterHostResolver::new(cluster, clusters);
        assert!(resolver.master_and_hosts("HDFS", "DATANODE").is_none());
    }
}

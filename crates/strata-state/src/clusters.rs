//! Process-wide registry of clusters and hosts

use crate::cluster::Cluster;
use crate::error::{StateError, StateResult};
use crate::host::Host;
use crate::ids::ClusterId;
use crate::persist::{EntityKey, Persistence};
use crate::stack::StackId;
use crate::version::RepositoryVersionState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
struct ClusterIndex {
    by_name: BTreeMap<String, Arc<Cluster>>,
    by_id: BTreeMap<ClusterId, Arc<Cluster>>,
}

/// Registry of every cluster and host known to the process
///
/// Cluster names are unique. Hosts exist independently of clusters and are
/// mapped into them.
pub struct Clusters {
    clusters: RwLock<ClusterIndex>,
    hosts: DashMap<String, Arc<Host>>,
    host_clusters: DashMap<String, BTreeSet<ClusterId>>,
    next_cluster_id: AtomicU64,
    persistence: Arc<dyn Persistence>,
}

impl Clusters {
    /// Create an empty registry
    #[must_use]
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            clusters: RwLock::new(ClusterIndex::default()),
            hosts: DashMap::new(),
            host_clusters: DashMap::new(),
            next_cluster_id: AtomicU64::new(1),
            persistence,
        }
    }

    /// Persistence collaborator shared by every entity
    #[inline]
    #[must_use]
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Create and persist a cluster
    ///
    /// # Errors
    /// `DuplicateCluster` or persistence failure.
    pub fn add_cluster(&self, name: &str, desired_stack: StackId) -> StateResult<Arc<Cluster>> {
        let mut index = self.clusters.write();
        if index.by_name.contains_key(name) {
            return Err(StateError::DuplicateCluster(name.to_string()));
        }
        let id = ClusterId(self.next_cluster_id.fetch_add(1, Ordering::Relaxed));
        let cluster = Arc::new(Cluster::new(id, name, desired_stack, self.persistence.clone()));
        cluster.persist()?;
        index.by_name.insert(name.to_string(), cluster.clone());
        index.by_id.insert(id, cluster.clone());
        info!(cluster = name, %id, "cluster added");
        Ok(cluster)
    }

    /// Cluster by name
    ///
    /// # Errors
    /// `ClusterNotFound`.
    pub fn cluster(&self, name: &str) -> StateResult<Arc<Cluster>> {
        self.clusters
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::ClusterNotFound(name.to_string()))
    }

    /// Cluster by id
    ///
    /// # Errors
    /// `ClusterNotFound`.
    pub fn cluster_by_id(&self, id: ClusterId) -> StateResult<Arc<Cluster>> {
        self.clusters
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| StateError::ClusterNotFound(id.to_string()))
    }

    /// All clusters, ordered by name
    #[must_use]
    pub fn clusters(&self) -> Vec<Arc<Cluster>> {
        self.clusters.read().by_name.values().cloned().collect()
    }

    /// Delete a cluster
    ///
    /// # Errors
    /// `ClusterNotFound`, `NotRemovable` if a host-component is not in a
    /// removable state, or persistence failure.
    pub fn delete_cluster(&self, name: &str) -> StateResult<()> {
        let mut index = self.clusters.write();
        let cluster = index
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::ClusterNotFound(name.to_string()))?;
        let blocking = cluster
            .all_host_components()
            .into_iter()
            .map(|sch| (sch.state(), sch))
            .find(|(state, _)| !state.is_removable_state());
        if let Some((state, sch)) = blocking {
            return Err(StateError::NotRemovable {
                cluster: name.to_string(),
                component: sch.component_name().to_string(),
                host: sch.host_name().to_string(),
                state,
            });
        }
        for service in cluster.services() {
            cluster.delete_service(service.name())?;
        }
        for host in cluster.hosts() {
            self.persistence
                .remove(&EntityKey::HostMapping(cluster.id(), host.clone()))?;
            if let Some(mut ids) = self.host_clusters.get_mut(&host) {
                ids.remove(&cluster.id());
            }
        }
        self.persistence.remove(&EntityKey::Cluster(cluster.id()))?;
        index.by_name.remove(name);
        index.by_id.remove(&cluster.id());
        info!(cluster = name, "cluster deleted");
        Ok(())
    }

    /// Register and persist a host
    ///
    /// # Errors
    /// `DuplicateHost` or persistence failure.
    pub fn add_host(&self, name: &str) -> StateResult<Arc<Host>> {
        match self.hosts.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StateError::DuplicateHost(name.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let host = Arc::new(Host::new(name, self.persistence.clone()));
                host.persist()?;
                slot.insert(host.clone());
                info!(host = name, "host added");
                Ok(host)
            }
        }
    }

    /// Host by name
    ///
    /// # Errors
    /// `HostNotFound`.
    pub fn host(&self, name: &str) -> StateResult<Arc<Host>> {
        self.hosts
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| StateError::HostNotFound(name.to_string()))
    }

    /// All hosts, ordered by name
    #[must_use]
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut hosts: Vec<Arc<Host>> = self.hosts.iter().map(|h| h.value().clone()).collect();
        hosts.sort_by(|a, b| a.name().cmp(b.name()));
        hosts
    }

    /// Make a registered host a member of a cluster
    ///
    /// # Errors
    /// `HostNotFound`, `ClusterNotFound` or persistence failure.
    pub fn map_host_to_cluster(&self, host: &str, cluster: &str) -> StateResult<()> {
        self.host(host)?;
        let cluster = self.cluster(cluster)?;
        cluster.add_host_membership(host)?;
        self.host_clusters
            .entry(host.to_string())
            .or_default()
            .insert(cluster.id());
        Ok(())
    }

    /// Clusters a host belongs to
    ///
    /// # Errors
    /// `HostNotFound`.
    pub fn clusters_for_host(&self, host: &str) -> StateResult<Vec<Arc<Cluster>>> {
        self.host(host)?;
        let ids: Vec<ClusterId> = self
            .host_clusters
            .get(host)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.cluster_by_id(id).ok())
            .collect())
    }

    /// Hosts that belong to a cluster
    ///
    /// # Errors
    /// `ClusterNotFound`.
    pub fn hosts_for_cluster(&self, cluster: &str) -> StateResult<Vec<Arc<Host>>> {
        let cluster = self.cluster(cluster)?;
        Ok(cluster
            .hosts()
            .iter()
            .filter_map(|name| self.host(name).ok())
            .collect())
    }

    /// Move a repository version on one host
    ///
    /// # Errors
    /// `HostNotFound`, ledger rejection or persistence failure.
    pub fn transition_host_version(&self, host: &str, version: &str, to: RepositoryVersionState) -> StateResult<()> {
        self.host(host)?.transition_version(version, to)
    }
}

impl fmt::Debug for Clusters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clusters")
            .field("clusters", &self.clusters.read().by_name.keys().collect::<Vec<_>>())
            .field("hosts", &self.hosts.len())
            .finish_non_exhaustive()
    }
}

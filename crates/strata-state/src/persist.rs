//! Persistence contract
//!
//! Entities hand a serializable [`EntitySnapshot`] to a [`Persistence`]
//! collaborator. Each call is all-or-nothing; the entity model only commits
//! in-memory state after the call succeeds.

use crate::component::ComponentState;
use crate::config::{Config, ConfigGroup, DesiredConfig};
use crate::host::HostState;
use crate::host_component::HostComponentState;
use crate::ids::{ClusterId, ComponentId, ConfigGroupId, SchId, ServiceId};
use crate::service::ServiceState;
use crate::stack::StackId;
use crate::version::VersionLedger;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Persistence failure
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Backing store refused the write
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable identity of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKey {
    /// Cluster row
    Cluster(ClusterId),
    /// Cluster membership of a host
    HostMapping(ClusterId, String),
    /// Config version `(type, tag)`
    Config(ClusterId, String, String),
    /// Config group
    ConfigGroup(ClusterId, ConfigGroupId),
    /// Service
    Service(ClusterId, ServiceId),
    /// Component
    Component(ClusterId, ComponentId),
    /// Host-component
    HostComponent(ClusterId, SchId),
    /// Host
    Host(String),
}

/// Serializable image of one entity
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntitySnapshot {
    /// Cluster-level fields
    Cluster {
        /// Cluster id
        id: ClusterId,
        /// Cluster name
        name: String,
        /// Desired stack
        desired_stack_id: StackId,
        /// Stack currently running
        current_stack_id: Option<StackId>,
        /// Desired config per type
        desired_configs: BTreeMap<String, DesiredConfig>,
        /// Cluster repository versions
        versions: VersionLedger,
    },
    /// Host joined a cluster
    HostMapping {
        /// Cluster id
        cluster_id: ClusterId,
        /// Host name
        host: String,
    },
    /// Config version
    Config {
        /// Cluster id
        cluster_id: ClusterId,
        /// The config
        config: Config,
    },
    /// Config group
    ConfigGroup {
        /// Cluster id
        cluster_id: ClusterId,
        /// The group
        group: ConfigGroup,
    },
    /// Service
    Service {
        /// Cluster id
        cluster_id: ClusterId,
        /// Service id
        id: ServiceId,
        /// Service name
        name: String,
        /// Mutable fields
        state: ServiceState,
    },
    /// Component
    Component {
        /// Cluster id
        cluster_id: ClusterId,
        /// Component id
        id: ComponentId,
        /// Owning service name
        service: String,
        /// Component name
        name: String,
        /// Mutable fields
        state: ComponentState,
    },
    /// Host-component
    HostComponent {
        /// Cluster id
        cluster_id: ClusterId,
        /// Host-component id
        id: SchId,
        /// Service name
        service: String,
        /// Component name
        component: String,
        /// Host name
        host: String,
        /// Mutable fields
        state: HostComponentState,
    },
    /// Host
    Host {
        /// Host name
        name: String,
        /// Mutable fields
        state: HostState,
    },
}

impl EntitySnapshot {
    /// Key the snapshot is stored under
    #[must_use]
    pub fn key(&self) -> EntityKey {
        match self {
            EntitySnapshot::Cluster { id, .. } => EntityKey::Cluster(*id),
            EntitySnapshot::HostMapping { cluster_id, host } => {
                EntityKey::HostMapping(*cluster_id, host.clone())
            }
            EntitySnapshot::Config { cluster_id, config } => {
                EntityKey::Config(*cluster_id, config.config_type.clone(), config.tag.clone())
            }
            EntitySnapshot::ConfigGroup { cluster_id, group } => {
                EntityKey::ConfigGroup(*cluster_id, group.id)
            }
            EntitySnapshot::Service { cluster_id, id, .. } => EntityKey::Service(*cluster_id, *id),
            EntitySnapshot::Component { cluster_id, id, .. } => {
                EntityKey::Component(*cluster_id, *id)
            }
            EntitySnapshot::HostComponent { cluster_id, id, .. } => {
                EntityKey::HostComponent(*cluster_id, *id)
            }
            EntitySnapshot::Host { name, .. } => EntityKey::Host(name.clone()),
        }
    }
}

/// Durable store for entity snapshots
pub trait Persistence: Send + Sync {
    /// Insert or replace the record for the snapshot's key
    ///
    /// # Errors
    /// Any storage failure; nothing is written in that case.
    fn store(&self, snapshot: &EntitySnapshot) -> Result<(), PersistError>;

    /// Delete a record; removing a missing record is not an error
    ///
    /// # Errors
    /// Any storage failure; nothing is removed in that case.
    fn remove(&self, key: &EntityKey) -> Result<(), PersistError>;
}

/// Process-local store keeping each record as JSON
///
/// Supports failure injection for exercising rollback paths.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    rows: DashMap<EntityKey, serde_json::Value>,
    pending_failures: AtomicUsize,
    writes: AtomicU64,
}

impl InMemoryPersistence {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Stored record for a key
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<serde_json::Value> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    /// Whether a record exists
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Successful writes so far
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_injected_failure(&self) -> Result<(), PersistError> {
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PersistError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl Persistence for InMemoryPersistence {
    fn store(&self, snapshot: &EntitySnapshot) -> Result<(), PersistError> {
        self.check_injected_failure()?;
        let row = serde_json::to_value(snapshot)?;
        self.rows.insert(snapshot.key(), row);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &EntityKey) -> Result<(), PersistError> {
        self.check_injected_failure()?;
        self.rows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_snapshot(name: &str) -> EntitySnapshot {
        EntitySnapshot::Host {
            name: name.to_string(),
            state: HostState::default(),
        }
    }

    #[test]
    fn store_and_remove() {
        let store = InMemoryPersistence::new();
        store.store(&host_snapshot("h1")).unwrap();
        let key = EntityKey::Host("h1".into());
        assert!(store.contains(&key));
        assert_eq!(store.get(&key).unwrap()["kind"], "host");
        store.remove(&key).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = InMemoryPersistence::new();
        store.fail_next(1);
        assert!(store.store(&host_snapshot("h1")).is_err());
        assert!(store.is_empty());
        store.store(&host_snapshot("h1")).unwrap();
        assert_eq!(store.write_count(), 1);
    }
}

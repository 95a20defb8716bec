//! Cluster-independent host records

use crate::error::StateResult;
use crate::ids::ClusterId;
use crate::lock::{ClusterGlobalLock, EntityLock};
use crate::persist::{EntitySnapshot, Persistence};
use crate::state::MaintenanceState;
use crate::version::{RepositoryVersionState, VersionLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Hardware and OS facts reported by the host agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// OS family (e.g. `redhat7`)
    #[serde(default)]
    pub os_type: String,
    /// Architecture (e.g. `x86_64`)
    #[serde(default)]
    pub os_arch: String,
    /// Logical CPUs
    #[serde(default)]
    pub cpu_count: u32,
    /// Physical memory in KiB
    #[serde(default)]
    pub total_mem_kb: u64,
    /// Primary address
    #[serde(default)]
    pub ip: Option<String>,
}

/// Agent-reported health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostHealthStatus {
    /// Heartbeating, all components fine
    Healthy,
    /// Heartbeat lost
    Unhealthy,
    /// Heartbeating, some component reports problems
    Alert,
    /// Never heard from
    #[default]
    Unknown,
}

impl fmt::Display for HostHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostHealthStatus::Healthy => "HEALTHY",
            HostHealthStatus::Unhealthy => "UNHEALTHY",
            HostHealthStatus::Alert => "ALERT",
            HostHealthStatus::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Mutable host fields
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostState {
    /// Agent facts
    pub info: HostInfo,
    /// Health
    pub health: HostHealthStatus,
    /// Last heartbeat time
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Maintenance per cluster
    pub maintenance: BTreeMap<ClusterId, MaintenanceState>,
    /// Repository versions installed on this host
    pub versions: VersionLedger,
}

/// A machine that may belong to clusters
///
/// Hosts are not owned by a cluster, so their lock stands alone.
pub struct Host {
    name: String,
    lock: EntityLock<HostState>,
    persistence: Arc<dyn Persistence>,
}

impl Host {
    pub(crate) fn new(name: impl Into<String>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            name: name.into(),
            lock: EntityLock::new(ClusterGlobalLock::new(), HostState::default()),
            persistence,
        }
    }

    /// Host name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agent facts
    #[must_use]
    pub fn info(&self) -> HostInfo {
        self.lock.read().info.clone()
    }

    /// Replace agent facts
    ///
    /// # Errors
    /// Persistence failure; the host is unchanged.
    pub fn set_info(&self, info: HostInfo) -> StateResult<()> {
        self.update(|s| s.info = info)
    }

    /// Health
    #[must_use]
    pub fn health(&self) -> HostHealthStatus {
        self.lock.read().health
    }

    /// Set health
    ///
    /// # Errors
    /// Persistence failure; the host is unchanged.
    pub fn set_health(&self, health: HostHealthStatus) -> StateResult<()> {
        let previous = self.health();
        self.update(|s| s.health = health)?;
        if previous != health {
            info!(host = %self.name, from = %previous, to = %health, "host health changed");
        }
        Ok(())
    }

    /// Record a heartbeat; marks the host healthy unless it is in alert
    ///
    /// # Errors
    /// Persistence failure; the host is unchanged.
    pub fn heartbeat(&self, at: DateTime<Utc>) -> StateResult<()> {
        self.update(|s| {
            s.last_heartbeat = Some(at);
            if s.health != HostHealthStatus::Alert {
                s.health = HostHealthStatus::Healthy;
            }
        })
    }

    /// Last heartbeat time
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.lock.read().last_heartbeat
    }

    /// Maintenance state for a cluster
    #[must_use]
    pub fn maintenance_state(&self, cluster: ClusterId) -> MaintenanceState {
        self.lock
            .read()
            .maintenance
            .get(&cluster)
            .copied()
            .unwrap_or_default()
    }

    /// Set maintenance state for a cluster
    ///
    /// # Errors
    /// Persistence failure; the host is unchanged.
    pub fn set_maintenance_state(&self, cluster: ClusterId, state: MaintenanceState) -> StateResult<()> {
        self.update(|s| {
            s.maintenance.insert(cluster, state);
        })
    }

    /// State of a repository version on this host
    #[must_use]
    pub fn version_state(&self, version: &str) -> Option<RepositoryVersionState> {
        self.lock.read().versions.state(version)
    }

    /// Version currently running on this host
    #[must_use]
    pub fn current_version(&self) -> Option<String> {
        self.lock.read().versions.current().map(str::to_string)
    }

    /// Record a repository version on this host
    ///
    /// # Errors
    /// Ledger rejection or persistence failure; the host is unchanged.
    pub fn register_version(&self, version: &str, state: RepositoryVersionState) -> StateResult<()> {
        self.try_update(|s| s.versions.register(version, state))
    }

    /// Move a repository version on this host
    ///
    /// # Errors
    /// Ledger rejection or persistence failure; the host is unchanged.
    pub fn transition_version(&self, version: &str, to: RepositoryVersionState) -> StateResult<()> {
        self.try_update(|s| s.versions.transition(version, to))?;
        debug!(host = %self.name, version, to = %to, "host version transition");
        Ok(())
    }

    /// Write the host out; the first call registers it
    ///
    /// # Errors
    /// Persistence failure.
    pub fn persist(&self) -> StateResult<()> {
        self.lock.persist(
            |_, state| self.store(state),
            |state| self.store(state),
        )
    }

    fn update(&self, mutate: impl FnOnce(&mut HostState)) -> StateResult<()> {
        self.try_update(|s| {
            mutate(s);
            Ok(())
        })
    }

    fn try_update(&self, mutate: impl FnOnce(&mut HostState) -> StateResult<()>) -> StateResult<()> {
        self.lock.update(mutate, |state| self.store(state))
    }

    fn store(&self, state: &HostState) -> StateResult<()> {
        self.persistence.store(&EntitySnapshot::Host {
            name: self.name.clone(),
            state: state.clone(),
        })?;
        Ok(())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("state", &self.lock)
            .finish_non_exhaustive()
    }
}

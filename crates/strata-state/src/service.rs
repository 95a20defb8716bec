//! Services

use crate::error::{StateError, StateResult};
use crate::ids::{ClusterId, ServiceId};
use crate::lock::EntityLock;
use crate::persist::{EntitySnapshot, Persistence};
use crate::stack::StackId;
use crate::state::{MaintenanceState, State};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Mutable service fields
#[derive(Debug, Clone, Serialize)]
pub struct ServiceState {
    /// Target lifecycle state
    pub desired_state: State,
    /// Target stack
    pub desired_stack_id: StackId,
    /// Maintenance flag
    pub maintenance: MaintenanceState,
}

/// A service (e.g. HDFS) deployed in one cluster
pub struct Service {
    id: ServiceId,
    cluster_id: ClusterId,
    cluster_name: String,
    name: String,
    pub(crate) lock: EntityLock<ServiceState>,
    persistence: Arc<dyn Persistence>,
}

impl Service {
    pub(crate) fn new(
        id: ServiceId,
        cluster_id: ClusterId,
        cluster_name: String,
        name: String,
        lock: EntityLock<ServiceState>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            id,
            cluster_id,
            cluster_name,
            name,
            lock,
            persistence,
        }
    }

    /// Service id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// Owning cluster id
    #[inline]
    #[must_use]
    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    /// Service name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target lifecycle state
    #[must_use]
    pub fn desired_state(&self) -> State {
        self.lock.read().desired_state
    }

    /// Set target lifecycle state
    ///
    /// # Errors
    /// `InvalidDesiredState` or persistence failure.
    pub fn set_desired_state(&self, state: State) -> StateResult<()> {
        if !state.is_valid_desired_state() {
            return Err(StateError::InvalidDesiredState(state));
        }
        self.update(|s| s.desired_state = state)?;
        debug!(cluster = %self.cluster_name, service = %self.name, desired = %state, "service desired state set");
        Ok(())
    }

    /// Target stack
    #[must_use]
    pub fn desired_stack_id(&self) -> StackId {
        self.lock.read().desired_stack_id.clone()
    }

    /// Set target stack
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_desired_stack_id(&self, stack: StackId) -> StateResult<()> {
        self.update(|s| s.desired_stack_id = stack)
    }

    /// Maintenance flag
    #[must_use]
    pub fn maintenance_state(&self) -> MaintenanceState {
        self.lock.read().maintenance
    }

    /// Set maintenance flag
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_maintenance_state(&self, state: MaintenanceState) -> StateResult<()> {
        self.update(|s| s.maintenance = state)
    }

    pub(crate) fn snapshot_of(&self, state: &ServiceState) -> EntitySnapshot {
        EntitySnapshot::Service {
            cluster_id: self.cluster_id,
            id: self.id,
            name: self.name.clone(),
            state: state.clone(),
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut ServiceState)) -> StateResult<()> {
        self.lock.update(
            |s| {
                mutate(s);
                Ok(())
            },
            |s| Ok(self.persistence.store(&self.snapshot_of(s))?),
        )
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("cluster", &self.cluster_name)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

//! Service components

use crate::error::{StateError, StateResult};
use crate::ids::{ClusterId, ComponentId, ServiceId};
use crate::lock::EntityLock;
use crate::metadata::ComponentCategory;
use crate::persist::{EntitySnapshot, Persistence};
use crate::stack::StackId;
use crate::state::State;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Mutable component fields
#[derive(Debug, Clone, Serialize)]
pub struct ComponentState {
    /// Target lifecycle state
    pub desired_state: State,
    /// Target stack
    pub desired_stack_id: StackId,
    /// Category, fixed at creation
    pub category: ComponentCategory,
}

/// A component of a service (e.g. `NAMENODE` of HDFS)
pub struct ServiceComponent {
    id: ComponentId,
    cluster_id: ClusterId,
    service_id: ServiceId,
    service_name: String,
    name: String,
    category: ComponentCategory,
    pub(crate) lock: EntityLock<ComponentState>,
    persistence: Arc<dyn Persistence>,
}

impl ServiceComponent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ComponentId,
        cluster_id: ClusterId,
        service_id: ServiceId,
        service_name: String,
        name: String,
        category: ComponentCategory,
        lock: EntityLock<ComponentState>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            id,
            cluster_id,
            service_id,
            service_name,
            name,
            category,
            lock,
            persistence,
        }
    }

    /// Component id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Owning service id
    #[inline]
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    /// Owning service name
    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Component name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Master, slave or client
    #[inline]
    #[must_use]
    pub fn category(&self) -> ComponentCategory {
        self.category
    }

    /// Whether this is a client-only component
    #[inline]
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.category == ComponentCategory::Client
    }

    /// Whether this is a master component
    #[inline]
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.category == ComponentCategory::Master
    }

    /// Target lifecycle state
    #[must_use]
    pub fn desired_state(&self) -> State {
        self.lock.read().desired_state
    }

    /// Set target lifecycle state
    ///
    /// # Errors
    /// `InvalidDesiredState` (including running states for clients) or
    /// persistence failure.
    pub fn set_desired_state(&self, state: State) -> StateResult<()> {
        if !state.is_valid_desired_state()
            || (self.is_client() && !state.is_valid_client_component_state())
        {
            return Err(StateError::InvalidDesiredState(state));
        }
        self.update(|s| s.desired_state = state)
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

    pub(crate) fn snapshot_of(&self, state: &ComponentState) -> EntitySnapshot {
        EntitySnapshot::Component {
            cluster_id: self.cluster_id,
            id: self.id,
            service: self.service_name.clone(),
            name: self.name.clone(),
            state: state.clone(),
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut ComponentState)) -> StateResult<()> {
        self.lock.update(
            |s| {
                mutate(s);
                Ok(())
            },
            |s| Ok(self.persistence.store(&self.snapshot_of(s))?),
        )
    }
}

impl fmt::Debug for ServiceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceComponent")
            .field("id", &self.id)
            .field("service", &self.service_name)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

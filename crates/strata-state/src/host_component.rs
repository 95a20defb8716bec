//! Host-components: one component instance on one host

use crate::config::HostConfig;
use crate::error::{StateError, StateResult};
use crate::event::SchEvent;
use crate::fsm::{self, StateMachineKind, TransitionAction};
use crate::ids::{ClusterId, ComponentId, SchId, ServiceId};
use crate::lock::EntityLock;
use crate::metadata::ComponentCategory;
use crate::persist::{EntitySnapshot, Persistence};
use crate::stack::StackId;
use crate::state::{MaintenanceState, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Mutable host-component fields
#[derive(Debug, Clone, Serialize)]
pub struct HostComponentState {
    /// Current lifecycle state
    pub state: State,
    /// Target lifecycle state
    pub desired_state: State,
    /// Stack currently installed, once known
    pub stack_id: Option<StackId>,
    /// Target stack
    pub desired_stack_id: StackId,
    /// Config type → tags applied at the last observed run
    pub actual_configs: BTreeMap<String, HostConfig>,
    /// Set when a config change needs a restart to take effect
    pub restart_required: bool,
    /// Maintenance flag
    pub maintenance: MaintenanceState,
    /// When the last command was issued
    pub last_op_start: Option<DateTime<Utc>>,
    /// When the last command finished
    pub last_op_end: Option<DateTime<Utc>>,
    /// Last progress report
    pub last_op_update: Option<DateTime<Utc>>,
}

impl HostComponentState {
    pub(crate) fn new(desired_stack_id: StackId) -> Self {
        Self {
            state: State::Init,
            desired_state: State::Init,
            stack_id: None,
            desired_stack_id,
            actual_configs: BTreeMap::new(),
            restart_required: false,
            maintenance: MaintenanceState::Off,
            last_op_start: None,
            last_op_end: None,
            last_op_update: None,
        }
    }
}

/// Names and ids fixed at creation
#[derive(Debug, Clone)]
pub(crate) struct SchIdentity {
    pub(crate) id: SchId,
    pub(crate) cluster_id: ClusterId,
    pub(crate) cluster_name: String,
    pub(crate) service_id: ServiceId,
    pub(crate) service_name: String,
    pub(crate) component_id: ComponentId,
    pub(crate) component_name: String,
    pub(crate) host_name: String,
    pub(crate) category: ComponentCategory,
}

/// One component instance on one host
///
/// Created detached by [`Cluster::new_host_component`](crate::Cluster::new_host_component);
/// becomes visible once [`Cluster::persist_host_component`](crate::Cluster::persist_host_component)
/// has run.
pub struct ServiceComponentHost {
    identity: SchIdentity,
    pub(crate) lock: EntityLock<HostComponentState>,
    persistence: Arc<dyn Persistence>,
}

impl ServiceComponentHost {
    pub(crate) fn new(
        identity: SchIdentity,
        lock: EntityLock<HostComponentState>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            identity,
            lock,
            persistence,
        }
    }

    /// Host-component id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SchId {
        self.identity.id
    }

    /// Owning cluster id
    #[inline]
    #[must_use]
    pub fn cluster_id(&self) -> ClusterId {
        self.identity.cluster_id
    }

    /// Owning cluster name
    #[inline]
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.identity.cluster_name
    }

    /// Owning service id
    #[inline]
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.identity.service_id
    }

    /// Service name
    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.identity.service_name
    }

    /// Owning component id
    #[inline]
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.identity.component_id
    }

    /// Component name
    #[inline]
    #[must_use]
    pub fn component_name(&self) -> &str {
        &self.identity.component_name
    }

    /// Host name
    #[inline]
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.identity.host_name
    }

    /// Master, slave or client
    #[inline]
    #[must_use]
    pub fn category(&self) -> ComponentCategory {
        self.identity.category
    }

    /// Transition table used for this host-component
    #[inline]
    #[must_use]
    pub fn state_machine_kind(&self) -> StateMachineKind {
        match self.identity.category {
            ComponentCategory::Client => StateMachineKind::Client,
            ComponentCategory::Master | ComponentCategory::Slave => StateMachineKind::Daemon,
        }
    }

    /// Whether the host-component has been persisted and is visible
    #[inline]
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.lock.is_persisted()
    }

    /// Apply a lifecycle event
    ///
    /// Takes the cluster-global lock shared and this entity's lock
    /// exclusively, runs the state machine and persists the result.
    ///
    /// # Errors
    /// `InvalidStateTransition` if the event is not valid in the current
    /// state, or a persistence failure. The state is unchanged in both cases.
    pub fn handle_event(&self, event: SchEvent) -> StateResult<State> {
        let kind = self.state_machine_kind();
        let result = self.lock.update(
            |s| {
                let from = s.state;
                let transition = fsm::next_state(kind, from, event)
                    .ok_or_else(|| self.invalid_transition(from, event))?;
                let now = Utc::now();
                match transition.action {
                    TransitionAction::OpStarted => {
                        s.last_op_start = Some(now);
                        s.last_op_end = None;
                        s.last_op_update = Some(now);
                    }
                    TransitionAction::OpInProgress => s.last_op_update = Some(now),
                    TransitionAction::OpCompleted => {
                        s.last_op_end = Some(now);
                        s.last_op_update = Some(now);
                    }
                }
                let completed_install = from == State::Installing && transition.to == State::Installed;
                let completed_upgrade = from == State::Upgrading && transition.to == State::Installed;
                if completed_upgrade || (completed_install && s.stack_id.is_none()) {
                    s.stack_id = Some(s.desired_stack_id.clone());
                }
                s.state = transition.to;
                Ok((from, transition.to))
            },
            |s| self.store(s),
        );

        match result {
            Ok((from, to)) => {
                info!(
                    cluster = %self.identity.cluster_name,
                    service = %self.identity.service_name,
                    component = %self.identity.component_name,
                    host = %self.identity.host_name,
                    event = %event,
                    old_state = %from,
                    new_state = %to,
                    "host-component state transition"
                );
                Ok(to)
            }
            Err(err) => {
                warn!(
                    cluster = %self.identity.cluster_name,
                    component = %self.identity.component_name,
                    host = %self.identity.host_name,
                    event = %event,
                    error = %err,
                    "host-component event rejected"
                );
                Err(err)
            }
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> State {
        self.lock.read().state
    }

    /// Overwrite the current state without running the state machine
    ///
    /// Used when recovering state reported out of band by an agent.
    ///
    /// # Errors
    /// `InvalidClientState` for a running state on a client, or persistence
    /// failure.
    pub fn set_state(&self, state: State) -> StateResult<()> {
        if self.identity.category == ComponentCategory::Client && !state.is_valid_client_component_state() {
            return Err(StateError::InvalidClientState(state));
        }
        self.update(|s| s.state = state)
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
        let client = self.identity.category == ComponentCategory::Client;
        if !state.is_valid_desired_state() || (client && !state.is_valid_client_component_state()) {
            return Err(StateError::InvalidDesiredState(state));
        }
        self.update(|s| s.desired_state = state)
    }

    /// Stack currently installed
    #[must_use]
    pub fn stack_id(&self) -> Option<StackId> {
        self.lock.read().stack_id.clone()
    }

    /// Set the installed stack
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_stack_id(&self, stack: StackId) -> StateResult<()> {
        self.update(|s| s.stack_id = Some(stack))
    }

    /// Target stack
    #[must_use]
    pub fn desired_stack_id(&self) -> StackId {
        self.lock.read().desired_stack_id.clone()
    }

    /// Set the target stack
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_desired_stack_id(&self, stack: StackId) -> StateResult<()> {
        self.update(|s| s.desired_stack_id = stack)
    }

    /// Config tags applied at the last observed run
    #[must_use]
    pub fn actual_configs(&self) -> BTreeMap<String, HostConfig> {
        self.lock.read().actual_configs.clone()
    }

    /// Record the config tags the agent reports as applied
    ///
    /// # Errors
    /// Persistence failure.
    pub fn update_actual_configs(&self, configs: BTreeMap<String, HostConfig>) -> StateResult<()> {
        self.update(|s| s.actual_configs = configs)
    }

    /// Whether a restart is needed for config changes to apply
    #[must_use]
    pub fn is_restart_required(&self) -> bool {
        self.lock.read().restart_required
    }

    /// Set the restart-required flag
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_restart_required(&self, required: bool) -> StateResult<()> {
        self.update(|s| s.restart_required = required)
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

    /// When the last command was issued
    #[must_use]
    pub fn last_op_start_time(&self) -> Option<DateTime<Utc>> {
        self.lock.read().last_op_start
    }

    /// When the last command finished
    #[must_use]
    pub fn last_op_end_time(&self) -> Option<DateTime<Utc>> {
        self.lock.read().last_op_end
    }

    /// Copy of all mutable fields, taken under one lock hold
    #[must_use]
    pub fn snapshot(&self) -> HostComponentState {
        self.lock.snapshot()
    }

    pub(crate) fn snapshot_of(&self, state: &HostComponentState) -> EntitySnapshot {
        EntitySnapshot::HostComponent {
            cluster_id: self.identity.cluster_id,
            id: self.identity.id,
            service: self.identity.service_name.clone(),
            component: self.identity.component_name.clone(),
            host: self.identity.host_name.clone(),
            state: state.clone(),
        }
    }

    fn invalid_transition(&self, state: State, event: SchEvent) -> StateError {
        StateError::InvalidStateTransition {
            cluster: self.identity.cluster_name.clone(),
            service: self.identity.service_name.clone(),
            component: self.identity.component_name.clone(),
            host: self.identity.host_name.clone(),
            state,
            event,
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut HostComponentState)) -> StateResult<()> {
        self.lock.update(
            |s| {
                mutate(s);
                Ok(())
            },
            |s| self.store(s),
        )
    }

    fn store(&self, state: &HostComponentState) -> StateResult<()> {
        self.persistence.store(&self.snapshot_of(state))?;
        Ok(())
    }
}

impl fmt::Debug for ServiceComponentHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceComponentHost")
            .field("id", &self.identity.id)
            .field("cluster", &self.identity.cluster_name)
            .field("service", &self.identity.service_name)
            .field("component", &self.identity.component_name)
            .field("host", &self.identity.host_name)
            .finish_non_exhaustive()
    }
}

//! Error types for the entity model

use crate::event::SchEvent;
use crate::persist::PersistError;
use crate::state::State;
use crate::version::RepositoryVersionState;

/// Result alias for entity-model operations
pub type StateResult<T> = Result<T, StateError>;

/// Entity-model error
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Event not valid in the host-component's current state
    #[error(
        "invalid event {event} for {component} on host {host} in state {state} \
         (cluster {cluster}, service {service})"
    )]
    InvalidStateTransition {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
        /// Component name
        component: String,
        /// Host name
        host: String,
        /// State the host-component was in
        state: State,
        /// Rejected event
        event: SchEvent,
    },

    /// State is not an acceptable desired state
    #[error("{0} is not a valid desired state")]
    InvalidDesiredState(State),

    /// Running state requested for a client-only component
    #[error("{0} is not a valid state for a client component")]
    InvalidClientState(State),

    /// Cluster does not exist
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Cluster name already taken
    #[error("cluster already exists: {0}")]
    DuplicateCluster(String),

    /// Service does not exist in the cluster
    #[error("service {service} not found in cluster {cluster}")]
    ServiceNotFound {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
    },

    /// Service already exists in the cluster
    #[error("service {service} already exists in cluster {cluster}")]
    DuplicateService {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
    },

    /// Component does not exist under the service
    #[error("component {component} not found in service {service} of cluster {cluster}")]
    ComponentNotFound {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
        /// Component name
        component: String,
    },

    /// Component already exists under the service
    #[error("component {component} already exists in service {service} of cluster {cluster}")]
    DuplicateComponent {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
        /// Component name
        component: String,
    },

    /// Host is not registered
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Host name already registered
    #[error("host already exists: {0}")]
    DuplicateHost(String),

    /// Host is registered but not a member of the cluster
    #[error("host {host} is not a member of cluster {cluster}")]
    HostNotInCluster {
        /// Cluster name
        cluster: String,
        /// Host name
        host: String,
    },

    /// No such host-component
    #[error("{component} of {service} not found on host {host} in cluster {cluster}")]
    HostComponentNotFound {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
        /// Component name
        component: String,
        /// Host name
        host: String,
    },

    /// The component already has an instance on the host
    #[error("{component} of {service} already exists on host {host} in cluster {cluster}")]
    DuplicateHostComponent {
        /// Cluster name
        cluster: String,
        /// Service name
        service: String,
        /// Component name
        component: String,
        /// Host name
        host: String,
    },

    /// Host-component cannot be deleted in its current state
    #[error("{component} on host {host} cannot be removed in state {state} (cluster {cluster})")]
    NotRemovable {
        /// Cluster name
        cluster: String,
        /// Component name
        component: String,
        /// Host name
        host: String,
        /// Offending state
        state: State,
    },

    /// Config `(type, tag)` does not exist
    #[error("config {config_type} with tag {tag} not found in cluster {cluster}")]
    ConfigNotFound {
        /// Cluster name
        cluster: String,
        /// Config type
        config_type: String,
        /// Version tag
        tag: String,
    },

    /// Config `(type, tag)` already exists
    #[error("config {config_type} with tag {tag} already exists in cluster {cluster}")]
    DuplicateConfig {
        /// Cluster name
        cluster: String,
        /// Config type
        config_type: String,
        /// Version tag
        tag: String,
    },

    /// Config group does not exist
    #[error("config group {0} not found")]
    ConfigGroupNotFound(String),

    /// Stack id not in `NAME-VERSION` form
    #[error("invalid stack id: {0}")]
    InvalidStackId(String),

    /// Repository version unknown to the ledger
    #[error("repository version not found: {0}")]
    VersionNotFound(String),

    /// Ledger move not allowed
    #[error("repository version {version} cannot move from {from:?} to {to}")]
    InvalidVersionTransition {
        /// Version string
        version: String,
        /// Current state, if known
        from: Option<RepositoryVersionState>,
        /// Requested state
        to: RepositoryVersionState,
    },

    /// Persistence collaborator failed; in-memory state was not changed
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),
}

impl StateError {
    /// Whether the error reports a missing entity
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StateError::ClusterNotFound(_)
                | StateError::ServiceNotFound { .. }
                | StateError::ComponentNotFound { .. }
                | StateError::HostNotFound(_)
                | StateError::HostComponentNotFound { .. }
                | StateError::ConfigNotFound { .. }
                | StateError::ConfigGroupNotFound(_)
                | StateError::VersionNotFound(_)
        )
    }

    /// Whether the error reports a name collision
    #[inline]
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            StateError::DuplicateCluster(_)
                | StateError::DuplicateService { .. }
                | StateError::DuplicateComponent { .. }
                | StateError::DuplicateHost(_)
                | StateError::DuplicateHostComponent { .. }
                | StateError::DuplicateConfig { .. }
        )
    }
}

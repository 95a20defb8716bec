//! Error types for config reconciliation

use strata_state::{ClusterId, StateError};

/// Result alias for config reconciliation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Config reconciliation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Entity-model lookup failed
    #[error(transparent)]
    State(#[from] StateError),

    /// Host-component evaluated against a cluster it does not belong to
    #[error("host-component of cluster {sch_cluster} evaluated against cluster {cluster}")]
    ClusterMismatch {
        /// Cluster passed by the caller
        cluster: ClusterId,
        /// Cluster the host-component belongs to
        sch_cluster: ClusterId,
    },

    /// Cache refused a predicate invalidation
    #[error("stale config cache invalidation failed: {0}")]
    Cache(String),
}

impl ConfigError {
    /// Whether the error reports a missing entity
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::State(e) if e.is_not_found())
    }
}

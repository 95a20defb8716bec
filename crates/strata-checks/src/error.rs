//! Error types for pre-flight checks

use strata_config::ConfigError;
use strata_state::StateError;

/// Result alias for check bodies
pub type CheckResult<T> = Result<T, CheckError>;

/// Error raised by a check body
///
/// The check helper turns every variant into a FAIL result; none of them
/// reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Requested cluster does not exist
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Entity-model failure
    #[error(transparent)]
    State(StateError),

    /// Config reconciliation failure
    #[error(transparent)]
    Config(ConfigError),

    /// Anything else
    #[error("{0}")]
    Unexpected(String),
}

impl From<StateError> for CheckError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::ClusterNotFound(name) => CheckError::ClusterNotFound(name),
            other => CheckError::State(other),
        }
    }
}

impl From<ConfigError> for CheckError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::State(state) => state.into(),
            other => CheckError::Config(other),
        }
    }
}

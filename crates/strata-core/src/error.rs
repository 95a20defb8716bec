//! Error types for the engine facade

use std::path::PathBuf;
use strata_config::ConfigError;
use strata_state::StateError;
use strata_upgrade::UpgradeError;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// Engine configuration is not valid TOML
    #[error("invalid engine configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Topology document is not valid JSON
    #[error("invalid topology document: {0}")]
    Topology(#[from] serde_json::Error),

    /// Topology refers to something that does not exist
    #[error("inconsistent topology: {0}")]
    InconsistentTopology(String),

    /// Entity-model failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Config reconciliation failure
    #[error(transparent)]
    Reconcile(#[from] ConfigError),

    /// Plan construction failure
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    /// Log subscriber could not be installed
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

//! Error types for upgrade orchestration

use strata_state::StateError;

/// Result alias for upgrade orchestration
pub type UpgradeResult<T> = Result<T, UpgradeError>;

/// Upgrade orchestration error
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// Entity-model lookup failed
    #[error(transparent)]
    State(#[from] StateError),

    /// JSON upgrade pack could not be parsed
    #[error("invalid upgrade pack JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML upgrade pack could not be parsed
    #[error("invalid upgrade pack YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Pack is well-formed but unusable for this cluster
    #[error("invalid upgrade pack: {0}")]
    InvalidPack(String),
}

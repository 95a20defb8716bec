//! Check descriptor trait and result types

use crate::error::CheckResult;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::Arc;
use strata_config::ConfigHelper;
use strata_state::{Clusters, MetadataProvider};

/// What a check inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckType {
    /// Cluster-wide condition
    Cluster,
    /// Per-service condition
    Service,
    /// Per-host condition
    Host,
}

/// Outcome of a check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// Condition holds
    #[default]
    Pass,
    /// Condition does not hold, the upgrade may proceed
    Warning,
    /// Condition does not hold, the upgrade must not proceed
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Fail => "FAIL",
        })
    }
}

/// Which cluster to check, and against which version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Cluster name
    pub cluster_name: String,
    /// Repository version the upgrade targets
    pub repository_version: Option<String>,
    /// Only run checks with these ids; `None` runs every registered check
    pub check_ids: Option<BTreeSet<String>>,
}

impl CheckRequest {
    /// Request for a cluster with no target version
    #[must_use]
    pub fn new(cluster_name: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            repository_version: None,
            check_ids: None,
        }
    }

    /// Set the target version
    #[must_use]
    pub fn with_repository_version(mut self, version: &str) -> Self {
        self.repository_version = Some(version.to_string());
        self
    }

    /// Restrict the run to the given check ids, in registry order
    #[must_use]
    pub fn with_check_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Whether a check id was selected
    #[must_use]
    pub fn selects(&self, id: &str) -> bool {
        match &self.check_ids {
            Some(ids) => ids.contains(id),
            None => true,
        }
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrerequisiteCheck {
    /// Check id
    pub id: String,
    /// What the check verifies
    pub description: String,
    /// What the check inspects
    pub check_type: CheckType,
    /// Cluster checked
    pub cluster_name: String,
    /// Outcome
    pub status: CheckStatus,
    /// Why the check did not pass
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Services, hosts or components the check failed on
    pub failed_on: BTreeSet<String>,
}

impl PrerequisiteCheck {
    /// Passing result for a check
    #[must_use]
    pub fn new(check: &dyn CheckDescriptor, request: &CheckRequest) -> Self {
        Self {
            id: check.id().to_string(),
            description: check.description().to_string(),
            check_type: check.check_type(),
            cluster_name: request.cluster_name.clone(),
            status: CheckStatus::Pass,
            reason: String::new(),
            failed_on: BTreeSet::new(),
        }
    }

    /// Record an entity the check failed on
    pub fn fail_on(&mut self, entity: impl Into<String>) {
        self.failed_on.insert(entity.into());
    }

    /// Set a non-passing outcome
    pub fn set_status(&mut self, status: CheckStatus, reason: impl Into<String>) {
        self.status = status;
        self.reason = reason.into();
    }

    /// Fail when any entity was recorded
    pub fn fail_if_any(&mut self, status: CheckStatus, reason: impl Into<String>) {
        if !self.failed_on.is_empty() {
            self.set_status(status, reason);
        }
    }
}

/// Collaborators available to checks
#[derive(Clone)]
pub struct CheckContext {
    /// Cluster registry
    pub clusters: Arc<Clusters>,
    /// Staleness evaluation
    pub config_helper: Arc<ConfigHelper>,
    /// Stack definitions
    pub metadata: Arc<dyn MetadataProvider>,
}

impl Debug for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("config_helper", &self.config_helper)
            .finish_non_exhaustive()
    }
}

/// One pre-flight check
///
/// # Contract
/// `perform` only adds to `result`; it starts out passing. Errors and panics
/// are turned into FAIL results by the caller, so a check may use `?` freely.
pub trait CheckDescriptor: Send + Sync + Debug {
    /// Stable id
    fn id(&self) -> &'static str;

    /// What the check verifies
    fn description(&self) -> &'static str;

    /// What the check inspects
    fn check_type(&self) -> CheckType;

    /// Whether the check applies to the request
    ///
    /// # Errors
    /// Lookup failures; the check is then reported as failed.
    fn is_applicable(&self, _request: &CheckRequest, _ctx: &CheckContext) -> CheckResult<bool> {
        Ok(true)
    }

    /// Run the check
    ///
    /// # Errors
    /// Any failure to evaluate the condition.
    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()>;
}

//! Running a registry in isolation
//!
//! Each check runs inside its own failure boundary. A check that cannot find
//! the cluster, returns an error or panics is reported as FAIL and the
//! remaining checks still run.

use crate::check::{CheckContext, CheckDescriptor, CheckRequest, CheckStatus, PrerequisiteCheck};
use crate::error::{CheckError, CheckResult};
use crate::registry::UpgradeCheckRegistry;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

/// Reason reported when the requested cluster does not exist
pub const CLUSTER_NOT_FOUND_MESSAGE: &str = "Cluster not found";

/// Reason reported for any other failure inside a check
pub const UNEXPECTED_ERROR_MESSAGE: &str = "Unexpected server error happened";

/// Runs registries of pre-flight checks
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckHelper;

enum Outcome {
    Skipped,
    Ran(PrerequisiteCheck),
    Failed(PrerequisiteCheck, CheckError),
}

impl CheckHelper {
    /// New helper
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every selected, applicable check of `registry` in order
    ///
    /// Returns one result per applicable check. A check whose applicability
    /// cannot be decided is reported as failed.
    #[must_use]
    pub fn perform_checks(
        &self,
        request: &CheckRequest,
        registry: &UpgradeCheckRegistry,
        ctx: &CheckContext,
    ) -> Vec<PrerequisiteCheck> {
        let mut results = Vec::with_capacity(registry.len());
        for check in registry.selected(request) {
            match Self::run_isolated(check, request, ctx) {
                Outcome::Skipped => {}
                Outcome::Ran(result) => results.push(result),
                Outcome::Failed(mut result, err) => {
                    match err {
                        CheckError::ClusterNotFound(name) => {
                            warn!(check = check.id(), cluster = %name, "pre-flight check could not find cluster");
                            result.set_status(CheckStatus::Fail, CLUSTER_NOT_FOUND_MESSAGE);
                        }
                        other => {
                            error!(check = check.id(), cluster = %request.cluster_name, error = %other, "pre-flight check failed unexpectedly");
                            result.set_status(CheckStatus::Fail, UNEXPECTED_ERROR_MESSAGE);
                        }
                    }
                    results.push(result);
                }
            }
        }

        let failed = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
        info!(cluster = %request.cluster_name, checks = results.len(), failed, "pre-flight checks finished");
        results
    }

    fn run_isolated(check: &dyn CheckDescriptor, request: &CheckRequest, ctx: &CheckContext) -> Outcome {
        let result = PrerequisiteCheck::new(check, request);
        let outcome = catch_unwind(AssertUnwindSafe(|| -> CheckResult<Option<PrerequisiteCheck>> {
            if !check.is_applicable(request, ctx)? {
                return Ok(None);
            }
            let mut running = result.clone();
            check.perform(&mut running, request, ctx)?;
            Ok(Some(running))
        }));

        match outcome {
            Ok(Ok(None)) => Outcome::Skipped,
            Ok(Ok(Some(done))) => Outcome::Ran(done),
            Ok(Err(err)) => Outcome::Failed(result, err),
            Err(payload) => Outcome::Failed(result, CheckError::Unexpected(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "check panicked".to_string())
}

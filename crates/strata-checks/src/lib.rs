//! Strata pre-flight checks
//!
//! Independent validators run before an upgrade. A [`CheckHelper`] runs an
//! [`UpgradeCheckRegistry`] in order and returns one [`PrerequisiteCheck`]
//! per applicable check. Failures stay inside the check that raised them.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata_checks::{CheckContext, CheckHelper, CheckRequest, UpgradeCheckRegistry};
//!
//! let request = CheckRequest::new("c1").with_repository_version("2.3.0.0-1234");
//! for result in CheckHelper::new().perform_checks(&request, &UpgradeCheckRegistry::with_defaults(), &ctx) {
//!     println!("{} {} {:?}", result.id, result.status, result.failed_on);
//! }
//! ```

#![warn(missing_docs)]

mod builtin;
mod check;
mod error;
mod helper;
mod registry;

pub use builtin::{
    HostsHeartbeatCheck, HostsMasterMaintenanceCheck, HostsRepositoryVersionCheck, ServicesMaintenanceModeCheck,
    ServicesUpCheck, StaleConfigsCheck,
};
pub use check::{CheckContext, CheckDescriptor, CheckRequest, CheckStatus, CheckType, PrerequisiteCheck};
pub use error::{CheckError, CheckResult};
pub use helper::{CheckHelper, CLUSTER_NOT_FOUND_MESSAGE, UNEXPECTED_ERROR_MESSAGE};
pub use registry::UpgradeCheckRegistry;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

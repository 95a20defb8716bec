//! Strata upgrade orchestration
//!
//! Turns a declarative [`UpgradePack`] into an ordered plan of
//! [`UpgradeGroupHolder`]s for one cluster:
//!
//! - [`UpgradeContext`]: cluster, direction, versions, pack and host resolver
//! - [`MasterHostResolver`]: where a component runs and which host is master
//! - [`StageWrapperBuilder`]: one strategy per [`GroupingKind`]
//! - [`UpgradeHelper`]: walks the pack and renders `{{placeholders}}`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata_upgrade::{ClusterHostResolver, Direction, UpgradeContext, UpgradeHelper, UpgradePack};
//!
//! let pack = Arc::new(UpgradePack::from_yaml(&std::fs::read_to_string("upgrade-2.3.yaml")?)?);
//! let resolver = Arc::new(ClusterHostResolver::new(cluster.clone(), clusters.clone()));
//! let ctx = UpgradeContext::new(cluster, Direction::Upgrade, source, target, pack, resolver);
//! for group in UpgradeHelper::new(metadata).create_upgrade(&ctx)? {
//!     println!("{}: {} stages", group.title, group.stages.len());
//! }
//! ```

#![warn(missing_docs)]

mod builder;
mod context;
mod error;
mod helper;
mod pack;
mod resolver;
mod stage;

pub use builder::{
    ColocatedBuilder, ParallelBuilder, RollingBuilder, ServiceCheckBuilder, StageWrapperBuilder,
    BATCH_VERIFICATION_MESSAGE,
};
pub use context::{AutoSkip, UnhealthyComponent, UpgradeContext};
pub use error::{UpgradeError, UpgradeResult};
pub use helper::{render, UpgradeHelper, NAMENODE_ROLE_PARAM};
pub use pack::{
    Direction, Grouping, GroupingKind, OrderService, ProcessingComponent, Task, TaskType, UpgradePack, UpgradeType,
};
pub use resolver::{ClusterHostResolver, HostsType, MasterHostResolver};
pub use stage::{StageKind, StageWrapper, TaskWrapper, UpgradeGroupHolder};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

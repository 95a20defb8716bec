//! Strata engine
//!
//! Ties the workspace together:
//!
//! - [`EngineConfig`]: TOML configuration for caching and upgrade behaviour
//! - [`TopologyDocument`]: JSON snapshot loaded into a cluster registry
//! - [`ClusterEngine`]: staleness queries, plan construction and pre-flight
//!   checks over one registry
//!
//! The `strata` binary exposes the engine on the command line.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::{ClusterEngine, EngineConfig, TopologyDocument};
//! use strata_upgrade::{Direction, UpgradePack};
//!
//! let topology = TopologyDocument::load("cluster.json")?.build()?;
//! let engine = ClusterEngine::from_topology(EngineConfig::load("strata.toml")?, topology);
//! let pack = UpgradePack::from_yaml(&std::fs::read_to_string("upgrade-2.3.yaml")?)?;
//! let plan = engine.plan_upgrade("c1", pack, Direction::Upgrade, None)?;
//! println!("{}", serde_json::to_string_pretty(&plan)?);
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod topology;

pub use config::{EngineConfig, UpgradeSettings};
pub use engine::{ClusterEngine, StaleComponent, UpgradePlan};
pub use error::{EngineError, EngineResult};
pub use logging::{init_logging, LogOptions};
pub use topology::{
    ClusterSpec, ComponentSpec, ConfigGroupSpec, HostComponentSpec, HostSpec, ServiceSpec, Topology, TopologyDocument,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

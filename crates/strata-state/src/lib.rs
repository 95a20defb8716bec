//! Strata cluster entity model
//!
//! The in-memory model of a managed cluster:
//!
//! - [`Cluster`] → [`Service`] → [`ServiceComponent`] → [`ServiceComponentHost`] (SCH)
//! - cluster-independent [`Host`] records held by the [`Clusters`] registry
//! - the SCH lifecycle state machine ([`fsm`])
//! - repository-version ledgers ([`VersionLedger`])
//!
//! Entities live in a per-cluster arena keyed by stable ids. Every access goes
//! through the two-tier locking discipline in [`lock`]: the cluster-global lock
//! first, then the entity's own lock.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata_state::prelude::*;
//!
//! let clusters = Clusters::new(Arc::new(InMemoryPersistence::new()));
//! let cluster = clusters.add_cluster("c1", "HDP-2.2".parse()?)?;
//! clusters.add_host("h1")?;
//! clusters.map_host_to_cluster("h1", "c1")?;
//!
//! cluster.add_service("HDFS")?;
//! cluster.add_component("HDFS", "DATANODE", ComponentCategory::Slave)?;
//! let sch = cluster.add_host_component("HDFS", "DATANODE", "h1")?;
//! sch.handle_event(SchEvent::Install)?;
//! ```

pub mod cluster;
pub mod clusters;
pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod fsm;
pub mod host;
pub mod host_component;
pub mod ids;
pub mod lock;
pub mod metadata;
pub mod persist;
pub mod service;
pub mod stack;
pub mod state;
pub mod version;

pub use cluster::Cluster;
pub use clusters::Clusters;
pub use config::{Config, ConfigGroup, DesiredConfig, HostConfig};
pub use error::{StateError, StateResult};
pub use event::SchEvent;
pub use fsm::{StateMachineKind, Transition, TransitionAction};
pub use host::{Host, HostHealthStatus, HostInfo};
pub use ids::{ClusterId, ComponentId, ConfigGroupId, SchId, ServiceId};
pub use metadata::{ComponentCategory, MetadataProvider, StaticMetadata};
pub use persist::{EntityKey, EntitySnapshot, InMemoryPersistence, PersistError, Persistence};
pub use component::ServiceComponent;
pub use host_component::ServiceComponentHost;
pub use service::Service;
pub use stack::{RepositoryVersion, StackId};
pub use state::{MaintenanceState, State};
pub use version::{RepositoryVersionState, VersionLedger};

/// Common imports for callers of the entity model
pub mod prelude {
    pub use crate::cluster::Cluster;
    pub use crate::clusters::Clusters;
    pub use crate::config::{Config, ConfigGroup, DesiredConfig, HostConfig};
    pub use crate::error::{StateError, StateResult};
    pub use crate::event::SchEvent;
    pub use crate::host::{Host, HostHealthStatus};
    pub use crate::metadata::{ComponentCategory, MetadataProvider, StaticMetadata};
    pub use crate::persist::{InMemoryPersistence, Persistence};
    pub use crate::component::ServiceComponent;
    pub use crate::host_component::ServiceComponentHost;
    pub use crate::service::Service;
    pub use crate::stack::{RepositoryVersion, StackId};
    pub use crate::state::{MaintenanceState, State};
    pub use crate::version::RepositoryVersionState;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Strata config reconciliation
//!
//! Works out which configuration each host should run and whether a
//! host-component's applied configuration is stale:
//!
//! - [`effective`]: desired tags per host (cluster tag plus config-group
//!   overrides) and the merged properties/attributes they resolve to
//! - [`merge`]: property merging with `DELETED_` markers
//! - [`ConfigHelper`]: staleness and refresh-command evaluation, memoized in a
//!   [`StaleConfigCache`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata_config::{ConfigHelper, StaleConfigCache};
//!
//! let helper = ConfigHelper::new(metadata, StaleConfigCache::default());
//! if helper.is_stale_configs(&cluster, &sch)? {
//!     println!("{} on {} needs a restart", sch.component_name(), sch.host_name());
//! }
//! ```

pub mod cache;
pub mod effective;
pub mod error;
pub mod helper;
pub mod merge;

pub use cache::{CacheStats, StaleConfigCache, StaleEntry, StaleKey};
pub use effective::{
    effective_config_attributes, effective_config_properties, effective_desired_tags, find_changed_keys,
    DesiredTags, CLUSTER_DEFAULT_TAG,
};
pub use error::{ConfigError, ConfigResult};
pub use helper::{combine_refresh_commands, ConfigHelper, GLOBAL_CONFIG_TYPE, REFRESH_CONFIGS};
pub use merge::{apply_custom_config, merged_config, values_are_equal, DELETED_PREFIX};

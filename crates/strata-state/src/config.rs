//! Configuration records held by a cluster

use crate::ids::ConfigGroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Property map of one config version
pub type Properties = BTreeMap<String, String>;

/// Attribute map: attribute name → property → value
pub type Attributes = BTreeMap<String, BTreeMap<String, String>>;

/// One immutable version of a config type, identified by `(config_type, tag)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Config type (e.g. `core-site`)
    pub config_type: String,
    /// Version tag, unique per type
    pub tag: String,
    /// Per-type sequence number, assigned when the config is added
    #[serde(default)]
    pub version: u64,
    /// Properties
    #[serde(default)]
    pub properties: Properties,
    /// Property attributes (e.g. `final`)
    #[serde(default)]
    pub attributes: Attributes,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Config {
    /// Create a config version
    #[must_use]
    pub fn new(config_type: impl Into<String>, tag: impl Into<String>, properties: Properties) -> Self {
        Self {
            config_type: config_type.into(),
            tag: tag.into(),
            version: 0,
            properties,
            attributes: Attributes::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach property attributes
    #[inline]
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Look up one property
    #[inline]
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// The tag chosen for a config type at cluster level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
    /// Selected tag
    pub tag: String,
    /// Version number of the selected config
    #[serde(default)]
    pub version: u64,
    /// Who made the selection
    #[serde(default)]
    pub user: String,
    /// Service that owns the type, if known
    #[serde(default)]
    pub service_name: Option<String>,
}

/// A named set of per-host config overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    /// Group id
    pub id: ConfigGroupId,
    /// Display name
    pub name: String,
    /// Owning service
    pub tag: String,
    /// Member hosts
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    /// Config type → override tag
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
}

impl ConfigGroup {
    /// Whether the host is a member
    #[inline]
    #[must_use]
    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }
}

/// Tags of one config type as applied on a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostConfig {
    /// Cluster-level tag
    #[serde(default)]
    pub default_tag: Option<String>,
    /// Config group → override tag
    #[serde(default)]
    pub overrides: BTreeMap<ConfigGroupId, String>,
}

impl HostConfig {
    /// Host config with only the cluster tag
    #[must_use]
    pub fn with_default_tag(tag: impl Into<String>) -> Self {
        Self {
            default_tag: Some(tag.into()),
            overrides: BTreeMap::new(),
        }
    }

    /// Add a group override
    #[inline]
    #[must_use]
    pub fn with_override(mut self, group: ConfigGroupId, tag: impl Into<String>) -> Self {
        self.overrides.insert(group, tag.into());
        self
    }

    /// All tags: the default (if any) followed by the overrides
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.default_tag
            .iter()
            .map(String::as_str)
            .chain(self.overrides.values().map(String::as_str))
    }
}

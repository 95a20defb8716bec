//! Effective (desired) configuration of a host
//!
//! The effective tags of a config type are the cluster's desired tag, under
//! the label [`CLUSTER_DEFAULT_TAG`], followed by one override tag per config
//! group the host belongs to, labelled with the group's numeric id.

use crate::merge::{clone_attributes, merged_config, override_attributes, values_are_equal};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use strata_state::config::{Attributes, Properties};
use strata_state::{Cluster, HostConfig};

/// Label of the cluster-level tag in a tag map
pub const CLUSTER_DEFAULT_TAG: &str = "tag";

/// Config type → (label → tag), cluster tag first
pub type DesiredTags = BTreeMap<String, IndexMap<String, String>>;

/// Effective desired tags of a cluster, with group overrides for `host`
///
/// Desired types whose config version no longer exists are skipped.
#[must_use]
pub fn effective_desired_tags(cluster: &Cluster, host: Option<&str>) -> DesiredTags {
    let overrides = host
        .map(|h| cluster.host_config_overrides(h))
        .unwrap_or_default();
    cluster
        .desired_configs()
        .into_iter()
        .filter_map(|(config_type, desired)| {
            let config = cluster.config(&config_type, &desired.tag).ok()?;
            let mut tags = IndexMap::new();
            tags.insert(CLUSTER_DEFAULT_TAG.to_string(), config.tag.clone());
            if let Some(host_config) = overrides.get(&config_type) {
                for (group, tag) in &host_config.overrides {
                    tags.insert(group.get().to_string(), tag.clone());
                }
            }
            Some((config_type, tags))
        })
        .collect()
}

/// Tag map of a host-component's applied config, labelled like
/// [`effective_desired_tags`]
#[must_use]
pub fn host_config_tags(host_config: &HostConfig) -> IndexMap<String, String> {
    let mut tags = IndexMap::new();
    if let Some(tag) = &host_config.default_tag {
        tags.insert(CLUSTER_DEFAULT_TAG.to_string(), tag.clone());
    }
    for (group, tag) in &host_config.overrides {
        tags.insert(group.get().to_string(), tag.clone());
    }
    tags
}

/// Properties per type after layering group overrides onto the cluster config
///
/// Overrides apply only when the type has a cluster-level tag.
#[must_use]
pub fn effective_config_properties(cluster: &Cluster, desired: &DesiredTags) -> BTreeMap<String, Properties> {
    desired
        .iter()
        .map(|(config_type, tags)| {
            let mut properties = Properties::new();
            if let Some(cluster_tag) = tags.get(CLUSTER_DEFAULT_TAG) {
                if let Ok(config) = cluster.config(config_type, cluster_tag) {
                    properties.extend(config.properties.clone());
                }
                for (_, tag) in tags.iter().filter(|(label, _)| *label != CLUSTER_DEFAULT_TAG) {
                    if let Ok(override_config) = cluster.config(config_type, tag) {
                        properties = merged_config(&properties, &override_config.properties);
                    }
                }
            }
            (config_type.clone(), properties)
        })
        .collect()
}

/// Property attributes per type after layering group overrides
///
/// Types without a resolvable cluster-level config are omitted.
#[must_use]
pub fn effective_config_attributes(cluster: &Cluster, desired: &DesiredTags) -> BTreeMap<String, Attributes> {
    let mut result = BTreeMap::new();
    for (config_type, tags) in desired {
        let mut attributes: Option<Attributes> = None;
        if let Some(cluster_tag) = tags.get(CLUSTER_DEFAULT_TAG) {
            if let Ok(config) = cluster.config(config_type, cluster_tag) {
                let mut cloned = Attributes::new();
                clone_attributes(&config.attributes, &mut cloned);
                attributes = Some(cloned);
            }
        }
        for (_, tag) in tags.iter().filter(|(label, _)| *label != CLUSTER_DEFAULT_TAG) {
            if let (Some(attributes), Ok(override_config)) = (attributes.as_mut(), cluster.config(config_type, tag)) {
                override_attributes(&override_config, attributes);
            }
        }
        if let Some(attributes) = attributes {
            result.insert(config_type.clone(), attributes);
        }
    }
    result
}

/// Keys whose desired value is missing from or differs from the actual value
///
/// Each side is the plain union of its tags' properties, later tags winning.
#[must_use]
pub fn find_changed_keys<'a>(
    cluster: &Cluster,
    config_type: &str,
    desired_tags: impl IntoIterator<Item = &'a String>,
    actual_tags: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let desired = union_properties(cluster, config_type, desired_tags);
    let actual = union_properties(cluster, config_type, actual_tags);
    desired
        .into_iter()
        .filter(|(key, value)| {
            actual
                .get(key)
                .map_or(true, |current| !values_are_equal(current, value))
        })
        .map(|(key, _)| key)
        .collect()
}

fn union_properties<'a>(
    cluster: &Cluster,
    config_type: &str,
    tags: impl IntoIterator<Item = &'a String>,
) -> Properties {
    let mut values = Properties::new();
    for tag in tags {
        if let Ok(config) = cluster.config(config_type, tag) {
            values.extend(config.properties.clone());
        }
    }
    values
}

//! Staleness and refresh-command evaluation

use crate::cache::{StaleConfigCache, StaleEntry, StaleKey};
use crate::effective::{
    effective_config_properties, effective_desired_tags, find_changed_keys, host_config_tags, DesiredTags,
    CLUSTER_DEFAULT_TAG,
};
use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_state::{Cluster, HostConfig, MetadataProvider, ServiceComponentHost, StackId};
use tracing::debug;

/// Legacy config type whose keys are matched per service
pub const GLOBAL_CONFIG_TYPE: &str = "global";

/// Default refresh command; any other single command supersedes it
pub const REFRESH_CONFIGS: &str = "REFRESH_CONFIGS";

/// Decides whether host-components run the configuration the cluster wants
pub struct ConfigHelper {
    metadata: Arc<dyn MetadataProvider>,
    cache: StaleConfigCache,
    computations: AtomicU64,
}

impl ConfigHelper {
    /// Create a helper around a metadata provider and a result cache
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataProvider>, cache: StaleConfigCache) -> Self {
        Self {
            metadata,
            cache,
            computations: AtomicU64::new(0),
        }
    }

    /// Metadata provider
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    /// Result cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &StaleConfigCache {
        &self.cache
    }

    /// Number of full staleness evaluations performed (cache misses)
    #[inline]
    #[must_use]
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Whether the host-component runs configs that differ from the desired
    /// ones in a way it cares about
    ///
    /// # Errors
    /// `ClusterMismatch` when `sch` does not belong to `cluster`.
    pub fn is_stale_configs(&self, cluster: &Cluster, sch: &ServiceComponentHost) -> ConfigResult<bool> {
        Ok(self.evaluate(cluster, sch)?.stale)
    }

    /// Single command able to apply every changed property without a
    /// restart, if one exists
    ///
    /// # Errors
    /// `ClusterMismatch` when `sch` does not belong to `cluster`.
    pub fn refresh_configs_command(
        &self,
        cluster: &Cluster,
        sch: &ServiceComponentHost,
    ) -> ConfigResult<Option<String>> {
        Ok(self.evaluate(cluster, sch)?.refresh_command)
    }

    /// Drop cached evaluations of a host
    ///
    /// # Errors
    /// `ConfigError::Cache` if the cache rejects the invalidation.
    pub fn invalidate_host(&self, host: &str) -> ConfigResult<()> {
        self.cache.invalidate_host(host)
    }

    /// Drop cached evaluations of one host-component
    ///
    /// # Errors
    /// `ConfigError::Cache` if the cache rejects the invalidation.
    pub fn invalidate_host_component(&self, sch: &ServiceComponentHost) -> ConfigResult<()> {
        self.cache.invalidate_host_component(
            sch.cluster_id(),
            sch.host_name(),
            sch.service_name(),
            sch.component_name(),
        )
    }

    /// Drop every cached evaluation
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    fn evaluate(&self, cluster: &Cluster, sch: &ServiceComponentHost) -> ConfigResult<StaleEntry> {
        if sch.cluster_id() != cluster.id() {
            return Err(ConfigError::ClusterMismatch {
                cluster: cluster.id(),
                sch_cluster: sch.cluster_id(),
            });
        }
        if sch.is_restart_required() {
            return Ok(StaleEntry {
                stale: true,
                refresh_command: None,
            });
        }

        let actual = sch.actual_configs();
        // nothing reported by the agent yet
        if actual.is_empty() {
            return Ok(StaleEntry {
                stale: false,
                refresh_command: None,
            });
        }

        let desired = effective_desired_tags(cluster, Some(sch.host_name()));
        let key = StaleKey {
            cluster: cluster.id(),
            host: sch.host_name().to_string(),
            service: sch.service_name().to_string(),
            component: sch.component_name().to_string(),
            stack: sch.desired_stack_id(),
            fingerprint: fingerprint(&desired, &actual),
        };
        if let Some(hit) = self.cache.get(&key) {
            debug!(host = %key.host, component = %key.component, stale = hit.stale, "stale config cache hit");
            return Ok(hit);
        }

        let entry = self.calculate(cluster, sch, &desired, &actual);
        self.cache.insert(key, entry.clone());
        Ok(entry)
    }

    fn calculate(
        &self,
        cluster: &Cluster,
        sch: &ServiceComponentHost,
        desired: &DesiredTags,
        actual: &BTreeMap<String, HostConfig>,
    ) -> StaleEntry {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let scope = Scope {
            metadata: self.metadata.as_ref(),
            stack: sch.desired_stack_id(),
            service: sch.service_name(),
            component: sch.component_name(),
        };
        let group_types: BTreeSet<String> = cluster
            .config_groups_by_host(sch.host_name())
            .into_values()
            .flat_map(|group| group.configs.into_keys())
            .collect();

        let mut stale = false;
        let mut changed_properties = Vec::new();
        for (config_type, tags) in desired {
            let type_stale = match actual.get(config_type) {
                None => scope.absent_type_is_stale(cluster, config_type, tags),
                Some(host_config) => {
                    let actual_tags = host_config_tags(host_config);
                    if is_tag_changed(tags, &actual_tags, group_types.contains(config_type)) {
                        let keys = find_changed_keys(cluster, config_type, tags.values(), actual_tags.values());
                        let type_stale = if config_type == GLOBAL_CONFIG_TYPE {
                            scope.service_has_property_for(config_type, &keys)
                        } else {
                            scope.declares(config_type)
                        };
                        if type_stale {
                            changed_properties.extend(keys.iter().map(|k| format!("{config_type}/{k}")));
                        }
                        type_stale
                    } else {
                        false
                    }
                }
            };
            if type_stale {
                debug!(host = sch.host_name(), component = scope.component, %config_type, "config type stale");
            }
            stale |= type_stale;
        }

        let refresh_command = combine_refresh_commands(
            changed_properties
                .iter()
                .map(|p| scope.metadata.refresh_command(&scope.stack, scope.service, scope.component, p)),
        );
        debug!(
            host = sch.host_name(),
            component = scope.component,
            stale,
            changed = changed_properties.len(),
            refresh_command = refresh_command.as_deref().unwrap_or("-"),
            "stale configs computed"
        );
        StaleEntry { stale, refresh_command }
    }
}

impl fmt::Debug for ConfigHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigHelper")
            .field("cache", &self.cache)
            .field("computations", &self.computations())
            .finish_non_exhaustive()
    }
}

/// Metadata lookups bound to one host-component
struct Scope<'a> {
    metadata: &'a dyn MetadataProvider,
    stack: StackId,
    service: &'a str,
    component: &'a str,
}

impl Scope<'_> {
    fn service_declares(&self, config_type: &str) -> bool {
        self.metadata.service_has_config_type(&self.stack, self.service, config_type)
    }

    fn component_declares(&self, config_type: &str) -> bool {
        self.metadata
            .component_has_config_type(&self.stack, self.service, self.component, config_type)
    }

    fn declares(&self, config_type: &str) -> bool {
        self.service_declares(config_type) || self.component_declares(config_type)
    }

    fn service_has_property_for(&self, config_type: &str, keys: &[String]) -> bool {
        self.metadata
            .service_has_property_for(&self.stack, self.service, config_type, keys)
    }

    /// Desired type the host-component has never applied
    fn absent_type_is_stale(&self, cluster: &Cluster, config_type: &str, tags: &IndexMap<String, String>) -> bool {
        if !self.service_declares(config_type) {
            return self.component_declares(config_type);
        }
        if config_type != GLOBAL_CONFIG_TYPE {
            return true;
        }
        let single: DesiredTags = [(config_type.to_string(), tags.clone())].into_iter().collect();
        let keys: Vec<String> = effective_config_properties(cluster, &single)
            .remove(config_type)
            .map(|properties| properties.into_keys().collect())
            .unwrap_or_default();
        self.service_has_property_for(config_type, &keys)
            || !self.metadata.stack_has_property_for(&self.stack, config_type, &keys)
    }
}

/// Whether desired and actual tags differ
///
/// The cluster tags must match first. When the host has group-specific
/// configs for the type only the override tags are compared; otherwise all
/// tags are compared as sets.
fn is_tag_changed(
    desired: &IndexMap<String, String>,
    actual: &IndexMap<String, String>,
    group_specific: bool,
) -> bool {
    if desired.get(CLUSTER_DEFAULT_TAG) != actual.get(CLUSTER_DEFAULT_TAG) {
        return true;
    }
    let values = |tags: &IndexMap<String, String>| -> HashSet<String> {
        tags.iter()
            .filter(|(label, _)| !group_specific || *label != CLUSTER_DEFAULT_TAG)
            .map(|(_, tag)| tag.clone())
            .collect()
    };
    values(desired) != values(actual)
}

/// Reduce per-property refresh commands to one
///
/// `REFRESH_CONFIGS` yields to any other command; two different other
/// commands, or any property without a command, yield `None`.
#[must_use]
pub fn combine_refresh_commands<I>(commands: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut combined: Option<String> = None;
    for command in commands {
        let command = command?;
        match combined.as_deref() {
            None => combined = Some(command),
            Some(current) if current == command => {}
            Some(REFRESH_CONFIGS) => combined = Some(command),
            Some(_) if command == REFRESH_CONFIGS => {}
            Some(_) => return None,
        }
    }
    combined
}

fn fingerprint(desired: &DesiredTags, actual: &BTreeMap<String, HostConfig>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (config_type, tags) in desired {
        config_type.hash(&mut hasher);
        for (label, tag) in tags {
            label.hash(&mut hasher);
            tag.hash(&mut hasher);
        }
    }
    actual.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn commands(list: &[Option<&str>]) -> Option<String> {
        combine_refresh_commands(list.iter().map(|c| c.map(str::to_string)))
    }

    #[test]
    fn refresh_configs_yields_to_other_command() {
        assert_eq!(
            commands(&[Some("REFRESH_CONFIGS"), Some("REFRESH_CONFIGS"), Some("RELOAD_CONFIGS")]),
            Some("RELOAD_CONFIGS".to_string())
        );
        assert_eq!(
            commands(&[Some("RELOAD_CONFIGS"), Some("REFRESH_CONFIGS")]),
            Some("RELOAD_CONFIGS".to_string())
        );
    }

    #[test]
    fn conflicting_commands_yield_none() {
        assert_eq!(
            commands(&[Some("REFRESH_CONFIGS"), Some("RELOADPROXYUSERS"), Some("RELOAD_CONFIGS")]),
            None
        );
        assert_eq!(commands(&[Some("RELOAD_CONFIGS"), None]), None);
        assert_eq!(commands(&[]), None);
    }

    #[test]
    fn cluster_tag_change_is_a_change() {
        assert!(is_tag_changed(&tags(&[("tag", "v2")]), &tags(&[("tag", "v1")]), false));
        assert!(!is_tag_changed(&tags(&[("tag", "v1")]), &tags(&[("tag", "v1")]), false));
    }

    #[test]
    fn override_tags_compare_as_sets() {
        let desired = tags(&[("tag", "v1"), ("2", "g1")]);
        assert!(is_tag_changed(&desired, &tags(&[("tag", "v1")]), true));
        assert!(!is_tag_changed(&desired, &tags(&[("tag", "v1"), ("2", "g1")]), true));
        assert!(!is_tag_changed(&desired, &tags(&[("tag", "v1"), ("7", "g1")]), false));
    }

    #[test]
    fn fingerprint_tracks_both_sides() {
        let mut desired = DesiredTags::new();
        desired.insert("core-site".into(), tags(&[("tag", "v1")]));
        let mut actual = BTreeMap::new();
        let before = fingerprint(&desired, &actual);
        actual.insert("core-site".to_string(), HostConfig::with_default_tag("v1"));
        assert_ne!(before, fingerprint(&desired, &actual));
    }
}

//! Property and attribute merging
//!
//! Override maps may remove a base property by naming it with the
//! [`DELETED_PREFIX`] marker, e.g. `DELETED_dfs.replication`.

use strata_state::config::{Attributes, Properties};
use strata_state::Config;

/// Marker prefix for a property an override removes
pub const DELETED_PREFIX: &str = "DELETED_";

/// Merge an override map onto a base map
///
/// Keys starting with [`DELETED_PREFIX`] remove the unprefixed key; every
/// other key replaces or adds.
#[must_use]
pub fn merged_config(base: &Properties, overrides: &Properties) -> Properties {
    let mut merged = base.clone();
    for (key, value) in overrides {
        match key.strip_prefix(DELETED_PREFIX) {
            Some(deleted) => {
                merged.remove(deleted);
            }
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Record one custom property into a `type → properties` map
///
/// A deleted property is stored under its [`DELETED_PREFIX`] name so a later
/// [`merged_config`] removes it.
pub fn apply_custom_config(
    configurations: &mut std::collections::BTreeMap<String, Properties>,
    config_type: &str,
    name: &str,
    value: &str,
    deleted: bool,
) {
    let key = if deleted {
        format!("{DELETED_PREFIX}{name}")
    } else {
        name.to_string()
    };
    configurations
        .entry(config_type.to_string())
        .or_default()
        .insert(key, value.to_string());
}

/// Copy every attribute value of `source` into `target`
pub fn clone_attributes(source: &Attributes, target: &mut Attributes) {
    for (attribute, values) in source {
        let slot = target.entry(attribute.clone()).or_default();
        for (property, value) in values {
            slot.insert(property.clone(), value.clone());
        }
    }
}

/// Layer an override config's attributes onto persisted attributes
///
/// A property the override redefines keeps only the attributes the override
/// itself sets for it.
pub fn override_attributes(override_config: &Config, persisted: &mut Attributes) {
    let overrides = &override_config.attributes;
    clone_attributes(overrides, persisted);
    for property in override_config.properties.keys() {
        for (attribute, values) in persisted.iter_mut() {
            let kept = overrides
                .get(attribute)
                .is_some_and(|o| o.contains_key(property));
            if !kept {
                values.remove(property);
            }
        }
    }
}

/// Compare two property values, numerically when both parse as numbers
///
/// `"1000"` equals `"1e3"` and `"2"` equals `"2.0"`; anything non-numeric
/// compares as text.
#[must_use]
pub fn values_are_equal(a: &str, b: &str) -> bool {
    if let (Ok(x), Ok(y)) = (a.parse::<i64>(), b.parse::<i64>()) {
        return x == y;
    }
    match (parse_number(a), parse_number(b)) {
        #[allow(clippy::float_cmp)]
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn merge_replaces_and_deletes() {
        let base = props(&[("a", "1"), ("b", "2")]);
        let overrides = props(&[("a", "3"), ("DELETED_b", "")]);
        assert_eq!(merged_config(&base, &overrides), props(&[("a", "3")]));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = merged_config(&props(&[("a", "1")]), &props(&[("c", "9")]));
        assert_eq!(merged, props(&[("a", "1"), ("c", "9")]));
    }

    #[test]
    fn delete_marker_for_missing_key_is_ignored() {
        let merged = merged_config(&props(&[("a", "1")]), &props(&[("DELETED_zz", "")]));
        assert_eq!(merged, props(&[("a", "1")]));
    }

    #[test]
    fn custom_config_round_trips_through_merge() {
        let mut custom = BTreeMap::new();
        apply_custom_config(&mut custom, "hdfs-site", "dfs.replication", "", true);
        apply_custom_config(&mut custom, "hdfs-site", "dfs.blocksize", "256m", false);
        let base = props(&[("dfs.replication", "3"), ("dfs.blocksize", "128m")]);
        assert_eq!(
            merged_config(&base, &custom["hdfs-site"]),
            props(&[("dfs.blocksize", "256m")])
        );
    }

    #[test]
    fn override_attributes_drops_unset_attributes() {
        let mut persisted: Attributes = BTreeMap::new();
        persisted.insert("final".into(), props(&[("a", "true"), ("b", "true")]));

        let mut override_attrs: Attributes = BTreeMap::new();
        override_attrs.insert("hidden".into(), props(&[("a", "true")]));
        let override_config = Config::new("t", "o1", props(&[("a", "x")])).with_attributes(override_attrs);

        override_attributes(&override_config, &mut persisted);
        assert_eq!(persisted["final"], props(&[("b", "true")]));
        assert_eq!(persisted["hidden"], props(&[("a", "true")]));
    }

    #[test]
    fn numeric_values_compare_by_value() {
        assert!(values_are_equal("1000", "1e3"));
        assert!(values_are_equal("2", "2.0"));
        assert!(!values_are_equal("2", "3"));
        assert!(values_are_equal("abc", "abc"));
        assert!(!values_are_equal("NaN", "nan"));
        assert!(!values_are_equal("1", "one"));
    }

    proptest::proptest! {
        #[test]
        fn prop_merge_without_markers_is_override_union(
            base in proptest::collection::btree_map("[a-z]{1,4}", "[0-9]{1,3}", 0..8),
            overrides in proptest::collection::btree_map("[a-z]{1,4}", "[0-9]{1,3}", 0..8),
        ) {
            let merged = merged_config(&base, &overrides);
            for (key, value) in &overrides {
                proptest::prop_assert_eq!(merged.get(key), Some(value));
            }
            for (key, value) in &base {
                if !overrides.contains_key(key) {
                    proptest::prop_assert_eq!(merged.get(key), Some(value));
                }
            }
            proptest::prop_assert!(merged.len() <= base.len() + overrides.len());
        }

        #[test]
        fn prop_delete_marker_removes_key(
            base in proptest::collection::btree_map("[a-z]{1,4}", "[0-9]{1,3}", 1..8),
        ) {
            let victim = base.keys().next().cloned().unwrap();
            let marker = format!("{DELETED_PREFIX}{victim}");
            let overrides = props(&[(marker.as_str(), "")]);
            let merged = merged_config(&base, &overrides);
            proptest::prop_assert!(!merged.contains_key(&victim));
            proptest::prop_assert_eq!(merged.len(), base.len() - 1);
        }
    }
}

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_config::{
    effective_config_properties, effective_desired_tags, ConfigError, ConfigHelper, StaleConfigCache,
};
use strata_state::metadata::ServiceDefinition;
use strata_state::prelude::*;
use strata_test_utils::{cluster_with_hosts, metadata, props, target_stack, ClusterFixture};

fn fixture() -> ClusterFixture {
    cluster_with_hosts(&["h1", "h2", "h3"])
}

fn helper(fx: &ClusterFixture) -> ConfigHelper {
    ConfigHelper::new(fx.metadata.clone(), StaleConfigCache::default())
}

fn applied(pairs: &[(&str, &str)]) -> BTreeMap<String, HostConfig> {
    pairs
        .iter()
        .map(|(config_type, tag)| (config_type.to_string(), HostConfig::with_default_tag(*tag)))
        .collect()
}

/// Agent report carrying only a type no test desires
fn report(sch: &ServiceComponentHost) {
    sch.update_actual_configs(applied(&[("cluster-env", "v0")])).unwrap();
}

#[test]
fn test_absent_type_stale_only_when_declared() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    let zk = fx.place("ZOOKEEPER", "ZOOKEEPER_SERVER", &["h1"]).remove(0);
    report(&datanode);
    report(&zk);
    let helper = helper(&fx);

    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert!(!helper.is_stale_configs(&fx.cluster, &zk).unwrap());
}

#[test]
fn test_unreported_configs_are_not_stale() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    let helper = helper(&fx);

    assert!(!helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert_eq!(helper.refresh_configs_command(&fx.cluster, &datanode).unwrap(), None);
    assert_eq!(helper.computations(), 0);

    report(&datanode);
    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert_eq!(helper.computations(), 1);
}

#[test]
fn test_desired_stack_change_recomputes() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    report(&datanode);

    // HDFS on the target stack no longer declares core-site
    let metadata = metadata().with_service(
        &target_stack(),
        "HDFS",
        ServiceDefinition::default()
            .config_type("hdfs-site")
            .component("DATANODE", ComponentCategory::Slave),
    );
    let helper = ConfigHelper::new(Arc::new(metadata), StaleConfigCache::default());

    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    datanode.set_desired_stack_id(target_stack()).unwrap();
    assert!(!helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert_eq!(helper.computations(), 2);
}

#[test]
fn test_component_declared_type_is_stale() {
    let fx = fixture();
    fx.desire("zoo.cfg", "v1", &[("tickTime", "2000")]);
    let zk = fx.place("ZOOKEEPER", "ZOOKEEPER_SERVER", &["h1"]).remove(0);
    let client = fx.place("ZOOKEEPER", "ZOOKEEPER_CLIENT", &["h1"]).remove(0);
    report(&zk);
    report(&client);
    let helper = helper(&fx);

    assert!(helper.is_stale_configs(&fx.cluster, &zk).unwrap());
    assert!(!helper.is_stale_configs(&fx.cluster, &client).unwrap());
}

#[test]
fn test_second_call_hits_cache() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    report(&datanode);
    let helper = helper(&fx);

    let first = helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    let second = helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    assert_eq!(first, second);
    assert_eq!(helper.computations(), 1);
}

#[test]
fn test_tag_change_recomputes() {
    let fx = fixture();
    fx.desire("hdfs-site", "v1", &[("dfs.replication", "3")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    datanode.update_actual_configs(applied(&[("hdfs-site", "v1")])).unwrap();
    let helper = helper(&fx);

    assert!(!helper.is_stale_configs(&fx.cluster, &datanode).unwrap());

    fx.desire("hdfs-site", "v2", &[("dfs.replication", "2")]);
    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert_eq!(helper.computations(), 2);
}

#[test]
fn test_restart_required_short_circuits() {
    let fx = fixture();
    let zk = fx.place("ZOOKEEPER", "ZOOKEEPER_SERVER", &["h1"]).remove(0);
    zk.set_restart_required(true).unwrap();
    let helper = helper(&fx);

    assert!(helper.is_stale_configs(&fx.cluster, &zk).unwrap());
    assert_eq!(helper.computations(), 0);
}

#[test]
fn test_global_type_changed_keys_matter_per_service() {
    let fx = fixture();
    fx.desire("global", "v1", &[("hdfs_user", "hdfs"), ("zk_user", "zookeeper")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    let zk = fx.place("ZOOKEEPER", "ZOOKEEPER_SERVER", &["h1"]).remove(0);
    for sch in [&datanode, &zk] {
        sch.update_actual_configs(applied(&[("global", "v1")])).unwrap();
    }

    fx.desire("global", "v2", &[("hdfs_user", "hdfs2"), ("zk_user", "zookeeper")]);
    let helper = helper(&fx);
    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert!(!helper.is_stale_configs(&fx.cluster, &zk).unwrap());
}

#[test]
fn test_global_numeric_equal_values_not_stale() {
    let fx = fixture();
    fx.desire("global", "v1", &[("dfs_datanode_data_dir", "10")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    datanode.update_actual_configs(applied(&[("global", "v1")])).unwrap();

    fx.desire("global", "v2", &[("dfs_datanode_data_dir", "10.0")]);
    assert!(!helper(&fx).is_stale_configs(&fx.cluster, &datanode).unwrap());
}

#[test]
fn test_global_absent_checks_stack_claims() {
    let fx = fixture();
    let zk = fx.place("ZOOKEEPER", "ZOOKEEPER_SERVER", &["h1"]).remove(0);
    report(&zk);

    // hdfs_user belongs to HDFS: nothing for ZOOKEEPER to pick up
    fx.desire("global", "v1", &[("hdfs_user", "hdfs")]);
    assert!(!helper(&fx).is_stale_configs(&fx.cluster, &zk).unwrap());

    // a key no service claims is assumed to matter
    fx.desire("global", "v2", &[("orphan_key", "x")]);
    assert!(helper(&fx).is_stale_configs(&fx.cluster, &zk).unwrap());

    fx.desire("global", "v3", &[("zk_user", "zookeeper")]);
    assert!(helper(&fx).is_stale_configs(&fx.cluster, &zk).unwrap());
}

#[test]
fn test_config_group_override_staleness() {
    let fx = fixture();
    fx.desire("hdfs-site", "v1", &[("dfs.replication", "3")]);
    fx.cluster
        .add_config(Config::new("hdfs-site", "g1", props(&[("dfs.replication", "1")])))
        .unwrap();
    let group = fx
        .cluster
        .add_config_group(
            "single-replica",
            "HDFS",
            ["h2".to_string()].into_iter().collect(),
            [("hdfs-site".to_string(), "g1".to_string())].into_iter().collect(),
        )
        .unwrap();
    let datanode = fx.place("HDFS", "DATANODE", &["h2"]).remove(0);
    let helper = helper(&fx);

    datanode.update_actual_configs(applied(&[("hdfs-site", "v1")])).unwrap();
    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());

    let mut with_override = BTreeMap::new();
    with_override.insert(
        "hdfs-site".to_string(),
        HostConfig::with_default_tag("v1").with_override(group, "g1"),
    );
    datanode.update_actual_configs(with_override).unwrap();
    assert!(!helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
}

#[test]
fn test_refresh_command_prefers_specific_command() {
    let fx = fixture();
    fx.desire(
        "hdfs-site",
        "v1",
        &[("dfs.heartbeat.interval", "3"), ("dfs.datanode.du.reserved", "0")],
    );
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    datanode.update_actual_configs(applied(&[("hdfs-site", "v1")])).unwrap();
    fx.desire(
        "hdfs-site",
        "v2",
        &[("dfs.heartbeat.interval", "5"), ("dfs.datanode.du.reserved", "1024")],
    );
    let helper = helper(&fx);

    assert!(helper.is_stale_configs(&fx.cluster, &datanode).unwrap());
    assert_eq!(
        helper.refresh_configs_command(&fx.cluster, &datanode).unwrap(),
        Some("RELOAD_CONFIGS".to_string())
    );
    assert_eq!(helper.computations(), 1);
}

#[test]
fn test_refresh_command_none_for_unknown_property() {
    let fx = fixture();
    fx.desire("hdfs-site", "v1", &[("dfs.heartbeat.interval", "3")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    datanode.update_actual_configs(applied(&[("hdfs-site", "v1")])).unwrap();
    fx.desire("hdfs-site", "v2", &[("dfs.heartbeat.interval", "5"), ("dfs.replication", "2")]);

    assert_eq!(helper(&fx).refresh_configs_command(&fx.cluster, &datanode).unwrap(), None);
}

#[test]
fn test_invalidation_forces_recompute() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    report(&datanode);
    let helper = helper(&fx);

    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    helper.invalidate_host_component(&datanode).unwrap();
    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    helper.invalidate_host("h1").unwrap();
    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    helper.invalidate_all();
    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    assert_eq!(helper.computations(), 4);
}

#[test]
fn test_disabled_cache_always_recomputes() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    report(&datanode);
    let helper = ConfigHelper::new(fx.metadata.clone(), StaleConfigCache::disabled());

    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    helper.is_stale_configs(&fx.cluster, &datanode).unwrap();
    assert_eq!(helper.computations(), 2);
}

#[test]
fn test_foreign_cluster_rejected() {
    let fx = fixture();
    let datanode = fx.place("HDFS", "DATANODE", &["h1"]).remove(0);
    let other = fx.clusters.add_cluster("c2", "HDP-2.2".parse().unwrap()).unwrap();

    let err = helper(&fx).is_stale_configs(&other, &datanode).unwrap_err();
    assert!(matches!(err, ConfigError::ClusterMismatch { .. }));
}

#[test]
fn test_effective_properties_apply_group_overrides() {
    let fx = fixture();
    fx.desire("hdfs-site", "v1", &[("dfs.replication", "3"), ("dfs.blocksize", "128m")]);
    fx.cluster
        .add_config(Config::new(
            "hdfs-site",
            "g1",
            props(&[("dfs.replication", "1"), ("DELETED_dfs.blocksize", "")]),
        ))
        .unwrap();
    let group = fx
        .cluster
        .add_config_group(
            "small",
            "HDFS",
            ["h3".to_string()].into_iter().collect(),
            [("hdfs-site".to_string(), "g1".to_string())].into_iter().collect(),
        )
        .unwrap();

    let tags = effective_desired_tags(&fx.cluster, Some("h3"));
    let labels: Vec<String> = tags["hdfs-site"].keys().cloned().collect();
    assert_eq!(labels, vec!["tag".to_string(), group.get().to_string()]);

    let merged = effective_config_properties(&fx.cluster, &tags);
    assert_eq!(merged["hdfs-site"], props(&[("dfs.replication", "1")]));

    let plain = effective_config_properties(&fx.cluster, &effective_desired_tags(&fx.cluster, Some("h1")));
    assert_eq!(
        plain["hdfs-site"],
        props(&[("dfs.blocksize", "128m"), ("dfs.replication", "3")])
    );
}

#[test]
fn test_helper_shared_across_threads() {
    let fx = fixture();
    fx.desire("core-site", "v1", &[("fs.defaultFS", "hdfs://nn:8020")]);
    let schs = fx.place("HDFS", "DATANODE", &["h1", "h2", "h3"]);
    for sch in &schs {
        report(sch);
    }
    let helper = Arc::new(helper(&fx));

    let handles: Vec<_> = schs
        .into_iter()
        .map(|sch| {
            let helper = helper.clone();
            let cluster = fx.cluster.clone();
            std::thread::spawn(move || helper.is_stale_configs(&cluster, &sch).unwrap())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(helper.computations(), 3);
}

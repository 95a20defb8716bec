use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use strata_checks::{CheckRequest, CheckStatus};
use strata_core::{ClusterEngine, EngineConfig, EngineError, StaleComponent, TopologyDocument, UpgradeSettings};
use strata_state::{HostConfig, MetadataProvider};
use strata_test_utils::cluster_with_hosts;
use strata_upgrade::{Direction, UpgradePack, UpgradeType};
use tempfile::NamedTempFile;

const TOPOLOGY: &str = r#"{
    "metadata": {
        "stacks": {
            "HDP-2.2": {
                "HDFS": {
                    "config_types": ["core-site", "hdfs-site"],
                    "components": {
                        "NAMENODE": {"category": "MASTER"},
                        "DATANODE": {"category": "SLAVE"}
                    }
                },
                "ZOOKEEPER": {
                    "components": {"ZOOKEEPER_SERVER": {"category": "MASTER"}}
                }
            }
        }
    },
    "repository_versions": [
        {"id": 1, "stack_id": "HDP-2.2", "version": "2.2.0.0", "display_name": "HDP-2.2.0.0"},
        {"id": 2, "stack_id": "HDP-2.3", "version": "2.3.0.0", "display_name": "HDP-2.3.0.0"}
    ],
    "hosts": [
        {"name": "h1", "health": "HEALTHY", "versions": {"2.2.0.0": "CURRENT", "2.3.0.0": "INSTALLED"}},
        {"name": "h2", "health": "HEALTHY", "versions": {"2.2.0.0": "CURRENT"}}
    ],
    "clusters": [{
        "name": "c1",
        "stack": "HDP-2.2",
        "hosts": ["h1", "h2"],
        "versions": {"2.2.0.0": "CURRENT"},
        "configs": [
            {"config_type": "core-site", "tag": "v1", "properties": {"fs.defaultFS": "hdfs://h1:8020"}},
            {"config_type": "core-site", "tag": "v2", "properties": {"fs.defaultFS": "hdfs://h2:8020"}}
        ],
        "desired_configs": {"core-site": "v2"},
        "services": [
            {"name": "HDFS", "components": [
                {"name": "NAMENODE", "hosts": [
                    {"host": "h1", "state": "STARTED", "restart_required": true}
                ]},
                {"name": "DATANODE", "hosts": [
                    {"host": "h1", "state": "STARTED", "actual_configs": {"core-site": {"default_tag": "v1"}}},
                    {"host": "h2", "state": "STARTED", "actual_configs": {"core-site": {"default_tag": "v2"}}}
                ]}
            ]},
            {"name": "ZOOKEEPER", "components": [
                {"name": "ZOOKEEPER_SERVER", "hosts": [{"host": "h2", "state": "STARTED"}]}
            ]}
        ]
    }]
}"#;

const PACK: &str = r"
name: upgrade-2.3
target_stack: HDP-2.3
type: ROLLING
prerequisite_checks: [SERVICES_STALE_CONFIGS, HOSTS_REPOSITORY_VERSION]
groups:
  - name: CORE_SLAVES
    title: Core Slaves
    strategy: rolling
    services:
      - name: HDFS
        components: [DATANODE]
  - name: ZOOKEEPER
    title: ZooKeeper
    strategy: parallel
    services:
      - name: ZOOKEEPER
        components: [ZOOKEEPER_SERVER]
processing:
  HDFS:
    DATANODE:
      name: DATANODE
      tasks:
        - type: RESTART
  ZOOKEEPER:
    ZOOKEEPER_SERVER:
      name: ZOOKEEPER_SERVER
      tasks:
        - type: RESTART
";

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn engine(config: EngineConfig) -> ClusterEngine {
    let file = write_temp(TOPOLOGY);
    let topology = TopologyDocument::load(file.path()).unwrap().build().unwrap();
    ClusterEngine::from_topology(config, topology)
}

fn pack() -> UpgradePack {
    UpgradePack::from_yaml(PACK).unwrap()
}

fn group_names(plan: &strata_core::UpgradePlan) -> Vec<&str> {
    plan.groups.iter().map(|g| g.name.as_str()).collect()
}

#[test]
fn test_config_file_is_loaded() {
    let file = write_temp(
        "stale_configs_cache_enabled = false\n\n[upgrade]\nauto_skip_component_failures = true\n",
    );
    let config = EngineConfig::load(file.path()).unwrap();

    assert!(!config.stale_configs_cache_enabled);
    assert_eq!(config.stale_configs_cache_max_entries, EngineConfig::default().stale_configs_cache_max_entries);
    assert_eq!(
        config.upgrade,
        UpgradeSettings {
            auto_skip_component_failures: true,
            ..UpgradeSettings::default()
        }
    );
}

#[test]
fn test_missing_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");

    assert!(matches!(TopologyDocument::load(&missing), Err(EngineError::Io { .. })));
    assert!(matches!(EngineConfig::load(&missing), Err(EngineError::Io { .. })));
}

#[test]
fn test_stale_host_components_in_order() {
    let engine = engine(EngineConfig::default());
    let stale = engine.stale_host_components("c1").unwrap();

    assert_eq!(
        stale,
        vec![
            StaleComponent {
                service: "HDFS".into(),
                component: "DATANODE".into(),
                host: "h1".into(),
                refresh_command: None,
            },
            StaleComponent {
                service: "HDFS".into(),
                component: "NAMENODE".into(),
                host: "h1".into(),
                refresh_command: None,
            },
        ]
    );
    assert!(!engine.is_stale_configs("c1", "HDFS", "DATANODE", "h2").unwrap());
    assert!(!engine.is_stale_configs("c1", "ZOOKEEPER", "ZOOKEEPER_SERVER", "h2").unwrap());
}

#[test]
fn test_unknown_cluster_is_reported() {
    let engine = engine(EngineConfig::default());
    assert!(matches!(engine.stale_host_components("nope"), Err(EngineError::State(_))));
}

#[test]
fn test_upgrade_plan_targets_pack_stack() {
    let engine = engine(EngineConfig::default());
    let plan = engine.plan_upgrade("c1", pack(), Direction::Upgrade, None).unwrap();

    assert_eq!(plan.direction, Direction::Upgrade);
    assert_eq!(plan.upgrade_type, UpgradeType::Rolling);
    assert_eq!(plan.version, "2.3.0.0");
    assert_eq!(group_names(&plan), vec!["CORE_SLAVES", "ZOOKEEPER"]);

    let hosts: Vec<Vec<&str>> = plan.groups[0].stages.iter().map(|s| s.hosts()).collect();
    assert_eq!(hosts, vec![vec!["h1"], vec!["h2"]]);
    assert!(plan.unhealthy.is_empty());
    assert!(!plan.groups[0].auto_skip_failures);
}

#[test]
fn test_downgrade_plan_returns_to_current_version() {
    let engine = engine(EngineConfig::default());
    let plan = engine.plan_upgrade("c1", pack(), Direction::Downgrade, None).unwrap();

    assert_eq!(plan.direction, Direction::Downgrade);
    assert_eq!(plan.version, "2.2.0.0");
    assert_eq!(group_names(&plan), vec!["ZOOKEEPER", "CORE_SLAVES"]);
    assert!(plan.groups.iter().all(|g| g.skippable));
}

#[test]
fn test_plan_follows_auto_skip_settings() {
    let config = EngineConfig::default().with_upgrade(UpgradeSettings {
        auto_skip_component_failures: true,
        ..UpgradeSettings::default()
    });
    let plan = engine(config)
        .plan_upgrade("c1", pack(), Direction::Upgrade, Some("2.3.0.0"))
        .unwrap();

    assert!(plan.groups.iter().all(|g| g.auto_skip_failures));
}

#[test]
fn test_unknown_target_version_is_rejected() {
    let engine = engine(EngineConfig::default());
    let err = engine
        .plan_upgrade("c1", pack(), Direction::Upgrade, Some("9.9.9.9"))
        .unwrap_err();
    assert!(matches!(err, EngineError::InconsistentTopology(_)));
}

#[test]
fn test_plan_serializes_to_json() {
    let engine = engine(EngineConfig::default());
    let plan = engine.plan_upgrade("c1", pack(), Direction::Upgrade, None).unwrap();
    let json = serde_json::to_value(&plan).unwrap();

    assert_eq!(json["cluster"], "c1");
    assert_eq!(json["direction"], "UPGRADE");
    assert_eq!(json["groups"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_checks_without_repository_version() {
    let engine = engine(EngineConfig::default());
    let results = engine.perform_checks(&CheckRequest::new("c1"));

    let statuses: BTreeMap<&str, CheckStatus> = results.iter().map(|r| (r.id.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        BTreeMap::from([
            ("HOSTS_HEARTBEAT", CheckStatus::Pass),
            ("HOSTS_MASTER_MAINTENANCE", CheckStatus::Pass),
            ("SERVICES_MAINTENANCE_MODE", CheckStatus::Pass),
            ("SERVICES_STALE_CONFIGS", CheckStatus::Warning),
            ("SERVICES_UP", CheckStatus::Pass),
        ])
    );
    let stale = results.iter().find(|r| r.id == "SERVICES_STALE_CONFIGS").unwrap();
    assert_eq!(stale.failed_on, BTreeSet::from(["HDFS".to_string()]));
}

#[test]
fn test_checks_with_repository_version() {
    let engine = engine(EngineConfig::default());
    let results = engine.perform_checks(&CheckRequest::new("c1").with_repository_version("2.3.0.0"));

    let repo = results.iter().find(|r| r.id == "HOSTS_REPOSITORY_VERSION").unwrap();
    assert_eq!(repo.status, CheckStatus::Fail);
    assert_eq!(repo.failed_on, BTreeSet::from(["h2".to_string()]));
}

#[test]
fn test_pack_selects_its_checks() {
    let engine = engine(EngineConfig::default());
    let request = CheckRequest::new("c1").with_repository_version("2.3.0.0");
    let results = engine.perform_checks_for_pack(&request, &pack());

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["SERVICES_STALE_CONFIGS", "HOSTS_REPOSITORY_VERSION"]);

    let bare = UpgradePack::new("bare", UpgradeType::Rolling);
    assert!(engine.perform_checks_for_pack(&request, &bare).is_empty());
    assert_eq!(engine.perform_checks(&request).len(), 6);
}

#[test]
fn test_engine_over_existing_registry() {
    let fx = cluster_with_hosts(&["h1"]);
    fx.desire("hdfs-site", "v1", &[("dfs.replication", "3")]);
    let sch = fx.place_running("HDFS", "DATANODE", &["h1"]).remove(0);
    sch.update_actual_configs(BTreeMap::from([("hdfs-site".to_string(), HostConfig::with_default_tag("v1"))]))
        .unwrap();

    let metadata: Arc<dyn MetadataProvider> = fx.metadata.clone();
    let engine = ClusterEngine::new(EngineConfig::default(), fx.clusters.clone(), metadata);
    assert!(!engine.is_stale_configs("c1", "HDFS", "DATANODE", "h1").unwrap());

    fx.desire("hdfs-site", "v2", &[("dfs.replication", "2")]);
    engine.invalidate_host("h1").unwrap();
    assert!(engine.is_stale_configs("c1", "HDFS", "DATANODE", "h1").unwrap());
}

//! Testing utilities for the Strata workspace
//!
//! Shared stack metadata, cluster fixtures and property helpers.

#![allow(missing_docs)]

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_state::metadata::{ComponentDefinition, ServiceDefinition};
use strata_state::prelude::*;

pub const CLUSTER: &str = "c1";

pub fn stack() -> StackId {
    StackId::new("HDP", "2.2")
}

pub fn target_stack() -> StackId {
    StackId::new("HDP", "2.3")
}

fn hdfs() -> ServiceDefinition {
    ServiceDefinition::default()
        .config_type("core-site")
        .config_type("hdfs-site")
        .config_type("global")
        .property("global", "hdfs_user")
        .property("global", "dfs_datanode_data_dir")
        .property("hdfs-site", "dfs.replication")
        .component("NAMENODE", ComponentCategory::Master)
        .component("SECONDARY_NAMENODE", ComponentCategory::Master)
        .component_definition(
            "DATANODE",
            ComponentDefinition::new(ComponentCategory::Slave)
                .refresh_command("hdfs-site/dfs.heartbeat.interval", "REFRESH_CONFIGS")
                .refresh_command("hdfs-site/dfs.datanode.du.reserved", "RELOAD_CONFIGS")
                .refresh_command("hdfs-site/dfs.permissions.superusergroup", "RELOADPROXYUSERS"),
        )
        .component("HDFS_CLIENT", ComponentCategory::Client)
}

fn zookeeper() -> ServiceDefinition {
    ServiceDefinition::default()
        .config_type("global")
        .property("global", "zk_user")
        .component_definition(
            "ZOOKEEPER_SERVER",
            ComponentDefinition::new(ComponentCategory::Master).config_type("zoo.cfg"),
        )
        .component("ZOOKEEPER_CLIENT", ComponentCategory::Client)
}

fn yarn() -> ServiceDefinition {
    ServiceDefinition::default()
        .config_type("yarn-site")
        .config_type("core-site")
        .component("RESOURCEMANAGER", ComponentCategory::Master)
        .component("NODEMANAGER", ComponentCategory::Slave)
        .component("YARN_CLIENT", ComponentCategory::Client)
}

/// HDFS, ZOOKEEPER and YARN on both the source and the target stack
pub fn metadata() -> StaticMetadata {
    let mut metadata = StaticMetadata::new();
    for stack in [stack(), target_stack()] {
        metadata = metadata
            .with_service(&stack, "HDFS", hdfs())
            .with_service(&stack, "ZOOKEEPER", zookeeper())
            .with_service(&stack, "YARN", yarn());
    }
    metadata
}

pub fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A registry with one cluster and its member hosts
pub struct ClusterFixture {
    pub clusters: Arc<Clusters>,
    pub cluster: Arc<Cluster>,
    pub store: Arc<InMemoryPersistence>,
    pub metadata: Arc<StaticMetadata>,
}

/// Cluster `c1` on [`stack`] with the given member hosts
pub fn cluster_with_hosts(hosts: &[&str]) -> ClusterFixture {
    let store = Arc::new(InMemoryPersistence::new());
    let clusters = Arc::new(Clusters::new(store.clone()));
    let cluster = clusters.add_cluster(CLUSTER, stack()).unwrap();
    for host in hosts {
        clusters.add_host(host).unwrap();
        clusters.map_host_to_cluster(host, CLUSTER).unwrap();
    }
    ClusterFixture {
        clusters,
        cluster,
        store,
        metadata: Arc::new(metadata()),
    }
}

impl ClusterFixture {
    /// Place a component on hosts, creating the service and component first
    /// if needed
    pub fn place(&self, service: &str, component: &str, hosts: &[&str]) -> Vec<Arc<ServiceComponentHost>> {
        if self.cluster.service(service).is_err() {
            self.cluster.add_service(service).unwrap();
        }
        if self.cluster.component(service, component).is_err() {
            let category = self
                .metadata
                .component_category(&stack(), service, component)
                .unwrap_or(ComponentCategory::Slave);
            self.cluster.add_component(service, component, category).unwrap();
        }
        hosts
            .iter()
            .map(|host| self.cluster.add_host_component(service, component, host).unwrap())
            .collect()
    }

    /// Place a component and drive every instance to STARTED (or INSTALLED
    /// for clients)
    pub fn place_running(&self, service: &str, component: &str, hosts: &[&str]) -> Vec<Arc<ServiceComponentHost>> {
        let schs = self.place(service, component, hosts);
        for sch in &schs {
            install_and_start(sch);
        }
        schs
    }

    /// Add a config version and make it desired
    pub fn desire(&self, config_type: &str, tag: &str, pairs: &[(&str, &str)]) {
        self.cluster
            .add_config(Config::new(config_type, tag, props(pairs)))
            .unwrap();
        self.cluster.add_desired_config("admin", config_type, tag).unwrap();
    }

    /// Mark every host heartbeating and healthy
    pub fn heartbeat_all(&self) {
        for host in self.clusters.hosts() {
            host.heartbeat(Utc::now()).unwrap();
        }
    }

    /// Mark some hosts heartbeating; the others keep their health
    pub fn heartbeat(&self, hosts: &[&str]) {
        for host in hosts {
            self.clusters.host(host).unwrap().heartbeat(Utc::now()).unwrap();
        }
    }
}

pub fn install_and_start(sch: &ServiceComponentHost) {
    sch.handle_event(SchEvent::Install).unwrap();
    sch.handle_event(SchEvent::OpSucceeded).unwrap();
    if sch.category() != ComponentCategory::Client {
        sch.handle_event(SchEvent::Start).unwrap();
        sch.handle_event(SchEvent::OpSucceeded).unwrap();
    }
}

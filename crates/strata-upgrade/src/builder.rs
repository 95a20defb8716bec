//! Grouping strategies
//!
//! Each [`GroupingKind`] maps to a [`StageWrapperBuilder`]. The plan builder
//! feeds it every (service, component) of the grouping together with the
//! resolved hosts, then asks it for the finished stages.

use crate::context::UpgradeContext;
use crate::pack::{GroupingKind, ProcessingComponent, Task, TaskType};
use crate::resolver::HostsType;
use crate::stage::{StageKind, StageWrapper, TaskWrapper};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Turns the components of one grouping into stages
///
/// # Contract
/// `add` is called once per (service, component) in grouping order, possibly
/// several times for one component with different hosts. `build` consumes
/// the builder; an empty result drops the grouping from the plan.
pub trait StageWrapperBuilder: Send + Debug {
    /// Feed one component
    fn add(
        &mut self,
        ctx: &UpgradeContext,
        hosts: &HostsType,
        service: &str,
        client_only: bool,
        processing: &ProcessingComponent,
        params: Option<&BTreeMap<String, String>>,
    );

    /// Finished stages
    fn build(self: Box<Self>, ctx: &UpgradeContext) -> Vec<StageWrapper>;

    /// Strategy name
    fn name(&self) -> &'static str;
}

impl GroupingKind {
    /// Fresh builder for this strategy
    #[must_use]
    pub fn builder(self) -> Box<dyn StageWrapperBuilder> {
        match self {
            GroupingKind::Parallel => Box::new(ParallelBuilder::default()),
            GroupingKind::Rolling => Box::new(RollingBuilder::default()),
            GroupingKind::Colocated { batch_percentage } => Box::new(ColocatedBuilder::new(batch_percentage)),
            GroupingKind::ServiceCheck => Box::new(ServiceCheckBuilder::default()),
        }
    }
}

fn stage_kind(task: TaskType) -> StageKind {
    match task {
        TaskType::Restart | TaskType::Start | TaskType::Stop => StageKind::Restart,
        TaskType::Manual => StageKind::Manual,
        TaskType::ServiceCheck => StageKind::ServiceCheck,
        TaskType::Execute | TaskType::Configure => StageKind::Execute,
    }
}

fn stage_text(ctx: &UpgradeContext, task: &Task, service: &str, component: &str, hosts: &[String]) -> String {
    if let Some(summary) = &task.summary {
        return summary.clone();
    }
    let name = ctx.component_display_name(service, component);
    let target = match hosts {
        [one] => one.clone(),
        many => format!("{} hosts", many.len()),
    };
    match task.kind {
        TaskType::Restart => format!("Restarting {name} on {target}"),
        TaskType::Start => format!("Starting {name} on {target}"),
        TaskType::Stop => format!("Stopping {name} on {target}"),
        TaskType::Execute => format!("Executing task for {name} on {target}"),
        TaskType::Configure => format!("Updating configuration for {name}"),
        TaskType::Manual => format!("Manual action for {name}"),
        TaskType::ServiceCheck => format!("Service Check {}", ctx.service_display_name(service)),
    }
}

fn wrapper(
    service: &str,
    component: &str,
    hosts: Vec<String>,
    task: &Task,
    params: Option<&BTreeMap<String, String>>,
) -> TaskWrapper {
    TaskWrapper::new(service, component, hosts, vec![task.clone()]).with_params(params.cloned().unwrap_or_default())
}

/// One stage per task across every host of the component
#[derive(Debug, Default)]
pub struct ParallelBuilder {
    stages: Vec<StageWrapper>,
}

impl StageWrapperBuilder for ParallelBuilder {
    fn add(
        &mut self,
        ctx: &UpgradeContext,
        hosts: &HostsType,
        service: &str,
        _client_only: bool,
        processing: &ProcessingComponent,
        params: Option<&BTreeMap<String, String>>,
    ) {
        for task in processing.all_tasks() {
            let text = stage_text(ctx, task, service, &processing.name, &hosts.hosts);
            self.stages.push(StageWrapper::new(
                stage_kind(task.kind),
                text,
                vec![wrapper(service, &processing.name, hosts.hosts.clone(), task, params)],
            ));
        }
    }

    fn build(self: Box<Self>, _ctx: &UpgradeContext) -> Vec<StageWrapper> {
        self.stages
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// Restart-like tasks one host at a time, standby master before active
/// master; everything else in a single stage
#[derive(Debug, Default)]
pub struct RollingBuilder {
    stages: Vec<StageWrapper>,
}

impl RollingBuilder {
    fn host_order(hosts: &HostsType) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::with_capacity(hosts.hosts.len());
        if let Some(secondary) = hosts.secondary.as_ref().filter(|h| hosts.hosts.contains(h)) {
            ordered.push(secondary.clone());
        }
        for host in &hosts.hosts {
            if Some(host) != hosts.master.as_ref() && !ordered.contains(host) {
                ordered.push(host.clone());
            }
        }
        if let Some(master) = hosts.master.as_ref().filter(|h| hosts.hosts.contains(h)) {
            ordered.push(master.clone());
        }
        ordered
    }
}

impl StageWrapperBuilder for RollingBuilder {
    fn add(
        &mut self,
        ctx: &UpgradeContext,
        hosts: &HostsType,
        service: &str,
        client_only: bool,
        processing: &ProcessingComponent,
        params: Option<&BTreeMap<String, String>>,
    ) {
        let component = processing.name.as_str();
        for task in processing.all_tasks() {
            if task.kind.is_restart_like() && !client_only {
                for host in Self::host_order(hosts) {
                    let on = vec![host];
                    let text = stage_text(ctx, task, service, component, &on);
                    self.stages.push(StageWrapper::new(
                        stage_kind(task.kind),
                        text,
                        vec![wrapper(service, component, on, task, params)],
                    ));
                }
            } else {
                let text = stage_text(ctx, task, service, component, &hosts.hosts);
                self.stages.push(StageWrapper::new(
                    stage_kind(task.kind),
                    text,
                    vec![wrapper(service, component, hosts.hosts.clone(), task, params)],
                ));
            }
        }
    }

    fn build(self: Box<Self>, _ctx: &UpgradeContext) -> Vec<StageWrapper> {
        self.stages
    }

    fn name(&self) -> &'static str {
        "rolling"
    }
}

/// Message of the verification stage between colocated batches
pub const BATCH_VERIFICATION_MESSAGE: &str =
    "Please verify that the {{direction.text}} of the first batch of hosts succeeded before continuing.";

/// All components of a host in one stage; a first batch of hosts, a manual
/// verification, then the remaining hosts
#[derive(Debug)]
pub struct ColocatedBuilder {
    batch_percentage: u32,
    per_host: Vec<(String, Vec<TaskWrapper>)>,
}

impl ColocatedBuilder {
    /// Builder whose first batch holds `batch_percentage` percent of hosts
    #[must_use]
    pub fn new(batch_percentage: u32) -> Self {
        Self {
            batch_percentage,
            per_host: Vec::new(),
        }
    }

    /// Size of the first batch out of `total` hosts, at least one
    #[must_use]
    pub fn first_batch_size(&self, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        let percentage = usize::try_from(self.batch_percentage).unwrap_or(usize::MAX).min(100);
        (total * percentage).div_ceil(100).clamp(1, total)
    }

    fn host_stage(ctx: &UpgradeContext, host: String, tasks: Vec<TaskWrapper>) -> StageWrapper {
        let verb = ctx.direction().verb(true);
        StageWrapper::new(StageKind::Restart, format!("{verb} components on {host}"), tasks)
    }
}

impl StageWrapperBuilder for ColocatedBuilder {
    fn add(
        &mut self,
        _ctx: &UpgradeContext,
        hosts: &HostsType,
        service: &str,
        _client_only: bool,
        processing: &ProcessingComponent,
        params: Option<&BTreeMap<String, String>>,
    ) {
        let tasks: Vec<Task> = processing.all_tasks().cloned().collect();
        if tasks.is_empty() {
            return;
        }
        for host in &hosts.hosts {
            let item = TaskWrapper::new(service, &processing.name, vec![host.clone()], tasks.clone())
                .with_params(params.cloned().unwrap_or_default());
            match self.per_host.iter_mut().find(|(h, _)| h == host) {
                Some((_, items)) => items.push(item),
                None => self.per_host.push((host.clone(), vec![item])),
            }
        }
    }

    fn build(self: Box<Self>, ctx: &UpgradeContext) -> Vec<StageWrapper> {
        let first = self.first_batch_size(self.per_host.len());
        let mut per_host = self.per_host.into_iter();
        let mut stages: Vec<StageWrapper> = Vec::new();
        let mut first_hosts = Vec::with_capacity(first);

        for (host, tasks) in per_host.by_ref().take(first) {
            first_hosts.push(host.clone());
            stages.push(Self::host_stage(ctx, host, tasks));
        }

        let rest: Vec<_> = per_host.collect();
        if !rest.is_empty() && !ctx.auto_skip().manual_verification {
            let verify = Task::new(TaskType::Manual).with_message(BATCH_VERIFICATION_MESSAGE);
            stages.push(StageWrapper::new(
                StageKind::Manual,
                "Verification Required",
                vec![TaskWrapper::new("", "", first_hosts, vec![verify])],
            ));
        }
        stages.extend(rest.into_iter().map(|(host, tasks)| Self::host_stage(ctx, host, tasks)));
        stages
    }

    fn name(&self) -> &'static str {
        "colocated"
    }
}

/// One service check stage per service
#[derive(Debug, Default)]
pub struct ServiceCheckBuilder {
    services: Vec<String>,
}

impl StageWrapperBuilder for ServiceCheckBuilder {
    fn add(
        &mut self,
        _ctx: &UpgradeContext,
        _hosts: &HostsType,
        service: &str,
        _client_only: bool,
        _processing: &ProcessingComponent,
        _params: Option<&BTreeMap<String, String>>,
    ) {
        if !self.services.iter().any(|s| s == service) {
            self.services.push(service.to_string());
        }
    }

    fn build(self: Box<Self>, ctx: &UpgradeContext) -> Vec<StageWrapper> {
        self.services
            .into_iter()
            .map(|service| {
                let task = Task::new(TaskType::ServiceCheck);
                let text = stage_text(ctx, &task, &service, "", &[]);
                StageWrapper::new(
                    StageKind::ServiceCheck,
                    text,
                    vec![TaskWrapper::new(&service, "", Vec::new(), vec![task])],
                )
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "service_check"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AutoSkip;
    use crate::pack::{Direction, UpgradePack, UpgradeType};
    use crate::resolver::MockMasterHostResolver;
    use std::sync::Arc;
    use strata_state::{Clusters, InMemoryPersistence, RepositoryVersion, StackId};

    fn context() -> UpgradeContext {
        let clusters = Clusters::new(Arc::new(InMemoryPersistence::new()));
        let cluster = clusters.add_cluster("c1", StackId::new("HDP", "2.2")).unwrap();
        UpgradeContext::new(
            cluster,
            Direction::Upgrade,
            RepositoryVersion::new(1, StackId::new("HDP", "2.2"), "2.2.0.0"),
            RepositoryVersion::new(2, StackId::new("HDP", "2.3"), "2.3.0.0"),
            Arc::new(UpgradePack::new("p", UpgradeType::Rolling)),
            Arc::new(MockMasterHostResolver::new()),
        )
    }

    fn restart(component: &str) -> ProcessingComponent {
        ProcessingComponent::single(component, Task::new(TaskType::Restart))
    }

    fn stage_hosts(stages: &[StageWrapper]) -> Vec<Vec<&str>> {
        stages.iter().map(StageWrapper::hosts).collect()
    }

    #[test]
    fn parallel_is_one_stage_per_task() {
        let ctx = context();
        let mut builder = GroupingKind::Parallel.builder();
        let mut pc = restart("DATANODE");
        pc.pre_tasks.push(Task::new(TaskType::Execute));
        builder.add(&ctx, &HostsType::of(&["h1", "h2", "h3"]), "HDFS", false, &pc, None);
        let stages = builder.build(&ctx);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].kind, StageKind::Execute);
        assert_eq!(stages[1].hosts(), vec!["h1", "h2", "h3"]);
        assert_eq!(stages[1].text, "Restarting DATANODE on 3 hosts");
    }

    #[test]
    fn rolling_restarts_secondary_before_master() {
        let ctx = context();
        let mut builder = GroupingKind::Rolling.builder();
        let hosts = HostsType::of(&["h1", "h2", "h3"]).with_masters("h1", Some("h3"));
        builder.add(&ctx, &hosts, "HDFS", false, &restart("NAMENODE"), None);
        let stages = builder.build(&ctx);
        assert_eq!(stage_hosts(&stages), vec![vec!["h3"], vec!["h2"], vec!["h1"]]);
        assert_eq!(stages[0].text, "Restarting NAMENODE on h3");
    }

    #[test]
    fn rolling_client_only_service_is_parallel() {
        let ctx = context();
        let mut builder = GroupingKind::Rolling.builder();
        builder.add(&ctx, &HostsType::of(&["h1", "h2"]), "ZOOKEEPER", true, &restart("ZOOKEEPER_CLIENT"), None);
        let stages = builder.build(&ctx);
        assert_eq!(stage_hosts(&stages), vec![vec!["h1", "h2"]]);
    }

    #[test]
    fn colocated_batches_with_verification() {
        let ctx = context();
        let mut builder = GroupingKind::Colocated { batch_percentage: 30 }.builder();
        let hosts = HostsType::of(&["h1", "h2", "h3", "h4"]);
        builder.add(&ctx, &hosts, "HDFS", false, &restart("DATANODE"), None);
        builder.add(&ctx, &hosts, "YARN", false, &restart("NODEMANAGER"), None);
        let stages = builder.build(&ctx);

        // ceil(4 * 30%) = 2 hosts in the first batch
        let kinds: Vec<StageKind> = stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Restart,
                StageKind::Restart,
                StageKind::Manual,
                StageKind::Restart,
                StageKind::Restart
            ]
        );
        assert_eq!(stages[0].tasks.len(), 2);
        assert_eq!(stages[0].text, "Upgrading components on h1");
        assert_eq!(stages[2].hosts(), vec!["h1", "h2"]);
    }

    #[test]
    fn colocated_verification_auto_skipped() {
        let ctx = context().with_auto_skip(AutoSkip {
            manual_verification: true,
            ..AutoSkip::default()
        });
        let mut builder = GroupingKind::Colocated { batch_percentage: 50 }.builder();
        builder.add(&ctx, &HostsType::of(&["h1", "h2"]), "HDFS", false, &restart("DATANODE"), None);
        let stages = builder.build(&ctx);
        assert!(stages.iter().all(|s| s.kind == StageKind::Restart));
        assert_eq!(stages.len(), 2);
    }

    #[test]
    fn first_batch_is_clamped() {
        assert_eq!(ColocatedBuilder::new(0).first_batch_size(5), 1);
        assert_eq!(ColocatedBuilder::new(20).first_batch_size(5), 1);
        assert_eq!(ColocatedBuilder::new(21).first_batch_size(5), 2);
        assert_eq!(ColocatedBuilder::new(250).first_batch_size(5), 5);
        assert_eq!(ColocatedBuilder::new(50).first_batch_size(0), 0);
    }

    #[test]
    fn service_checks_deduplicate_services() {
        let ctx = context();
        let mut builder = GroupingKind::ServiceCheck.builder();
        let check = ProcessingComponent::single("", Task::new(TaskType::ServiceCheck));
        builder.add(&ctx, &HostsType::default(), "HDFS", false, &check, None);
        builder.add(&ctx, &HostsType::default(), "HDFS", false, &check, None);
        builder.add(&ctx, &HostsType::default(), "YARN", false, &check, None);
        let stages = builder.build(&ctx);
        let texts: Vec<&str> = stages.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Service Check HDFS", "Service Check YARN"]);
    }
}

//! Plan construction
//!
//! [`UpgradeHelper::create_upgrade`] walks the groupings of the pack in
//! execution order, resolves where each component runs and lets the
//! grouping's strategy turn them into stages. Text in the finished plan has
//! its `{{placeholders}}` rendered last.

use crate::context::UpgradeContext;
use crate::error::UpgradeResult;
use crate::pack::{Grouping, GroupingKind, OrderService, ProcessingComponent, Task, TaskType, UpgradeType};
use crate::resolver::HostsType;
use crate::stage::{TaskWrapper, UpgradeGroupHolder};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strata_state::MetadataProvider;
use tracing::{debug, info, warn};

const HDFS: &str = "HDFS";
const NAMENODE: &str = "NAMENODE";

/// Command parameter carrying the NameNode role in a non-rolling HA restart
pub const NAMENODE_ROLE_PARAM: &str = "desired_namenode_role";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"));

/// Builds upgrade plans
pub struct UpgradeHelper {
    metadata: Arc<dyn MetadataProvider>,
}

impl UpgradeHelper {
    /// Helper reading display names from `metadata`
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self { metadata }
    }

    /// Build the ordered plan for an upgrade or downgrade
    ///
    /// Groupings that end up with no stages are left out.
    ///
    /// # Errors
    /// Entity-model lookups that fail for a service the cluster has.
    pub fn create_upgrade(&self, ctx: &UpgradeContext) -> UpgradeResult<Vec<UpgradeGroupHolder>> {
        let pack = ctx.pack();
        let mut groups = Vec::new();

        for grouping in pack.groups(ctx.direction()) {
            let mut builder = grouping.kind.builder();
            let mut services: Vec<&OrderService> = grouping.services.iter().collect();
            if ctx.direction().is_downgrade() && ctx.upgrade_type() == UpgradeType::Rolling {
                services.reverse();
            }

            for order in services {
                let service = order.name.as_str();
                if !ctx.is_service_supported(service) {
                    debug!(grouping = %grouping.name, service, "service not in upgrade scope");
                    continue;
                }
                if ctx.cluster().service(service).is_err() {
                    debug!(grouping = %grouping.name, service, "service not installed");
                    continue;
                }
                self.record_display_names(ctx, service, &order.components);

                if grouping.kind == GroupingKind::ServiceCheck {
                    if Self::has_live_component(ctx, service)? {
                        let check = ProcessingComponent::single("", Task::new(TaskType::ServiceCheck));
                        builder.add(ctx, &HostsType::default(), service, false, &check, None);
                    }
                    continue;
                }

                let client_only = Self::is_client_only(ctx, service)?;
                for component in &order.components {
                    let Some(hosts) = ctx.resolver().master_and_hosts(service, component) else {
                        continue;
                    };
                    if !hosts.unhealthy.is_empty() {
                        warn!(service, component = %component, hosts = ?hosts.unhealthy, "unhealthy hosts left out of the plan");
                        ctx.add_unhealthy(service, component, &hosts.unhealthy);
                    }
                    if hosts.is_empty() {
                        continue;
                    }
                    let Some(processing) = Self::processing(ctx, grouping, service, component) else {
                        debug!(grouping = %grouping.name, service, component = %component, "no processing for component");
                        continue;
                    };

                    if service == HDFS && component == NAMENODE {
                        Self::add_name_node(ctx, builder.as_mut(), &hosts, client_only, &processing);
                    } else {
                        builder.add(ctx, &hosts, service, client_only, &processing, None);
                    }
                }
            }

            let strategy = builder.name();
            let stages = builder.build(ctx);
            if stages.is_empty() {
                debug!(grouping = %grouping.name, "grouping produced no stages");
                continue;
            }

            let auto_skip = ctx.auto_skip();
            let auto_skip_failures = grouping.supports_auto_skip_on_failure
                && match grouping.kind {
                    GroupingKind::ServiceCheck => auto_skip.service_check_failures,
                    _ => auto_skip.component_failures,
                };
            let mut holder = UpgradeGroupHolder {
                name: grouping.name.clone(),
                title: grouping.title.clone(),
                skippable: grouping.skippable || ctx.direction().is_downgrade(),
                allow_retry: grouping.allow_retry,
                supports_auto_skip_on_failure: grouping.supports_auto_skip_on_failure,
                auto_skip_failures,
                stages,
            };
            post_process(ctx, &mut holder);
            debug!(grouping = %holder.name, strategy, stages = holder.stages.len(), "grouping planned");
            groups.push(holder);
        }

        info!(
            cluster = %ctx.cluster().name(),
            direction = %ctx.direction(),
            pack = %pack.name,
            groups = groups.len(),
            unhealthy = ctx.unhealthy().len(),
            "upgrade plan created"
        );
        Ok(groups)
    }

    fn record_display_names(&self, ctx: &UpgradeContext, service: &str, components: &[String]) {
        let stack = &ctx.target().stack_id;
        if let Some(name) = self.metadata.service_display_name(stack, service) {
            ctx.set_service_display_name(service, &name);
        }
        for component in components {
            if let Some(name) = self.metadata.component_display_name(stack, service, component) {
                ctx.set_component_display_name(service, component, &name);
            }
        }
    }

    fn has_live_component(ctx: &UpgradeContext, service: &str) -> UpgradeResult<bool> {
        for component in ctx.cluster().components(service)? {
            if !ctx.cluster().host_components(service, component.name())?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn is_client_only(ctx: &UpgradeContext, service: &str) -> UpgradeResult<bool> {
        let components = ctx.cluster().components(service)?;
        Ok(!components.is_empty() && components.iter().all(|c| c.is_client()))
    }

    /// Tasks for a component: the pack's processing, or for non-rolling
    /// lifecycle groupings a synthesized STOP/START/RESTART
    fn processing(
        ctx: &UpgradeContext,
        grouping: &Grouping,
        service: &str,
        component: &str,
    ) -> Option<ProcessingComponent> {
        let declared = ctx.pack().processing_for(service, component).cloned();
        match (ctx.upgrade_type(), grouping.function) {
            (UpgradeType::NonRolling, Some(function)) => Some(ProcessingComponent::single(component, Task::new(function))),
            _ => declared,
        }
    }

    fn add_name_node(
        ctx: &UpgradeContext,
        builder: &mut dyn crate::builder::StageWrapperBuilder,
        hosts: &HostsType,
        client_only: bool,
        processing: &ProcessingComponent,
    ) {
        match (ctx.upgrade_type(), &hosts.master, &hosts.secondary) {
            (UpgradeType::Rolling, Some(master), Some(secondary)) => {
                let mut ordered = hosts.clone();
                ordered.hosts = vec![secondary.clone(), master.clone()];
                builder.add(ctx, &ordered, HDFS, client_only, processing, None);
            }
            (UpgradeType::Rolling, _, _) => {
                warn!(hosts = ?hosts.hosts, "NameNode is not highly available, restarting in host order");
                builder.add(ctx, hosts, HDFS, client_only, processing, None);
            }
            (UpgradeType::NonRolling, Some(master), Some(secondary)) if ctx.resolver().is_name_node_ha() => {
                for (host, role) in [(master, "active"), (secondary, "standby")] {
                    let params = BTreeMap::from([(NAMENODE_ROLE_PARAM.to_string(), role.to_string())]);
                    let single = HostsType::of(&[host.as_str()]);
                    builder.add(ctx, &single, HDFS, client_only, processing, Some(&params));
                }
            }
            (UpgradeType::NonRolling, _, _) => {
                builder.add(ctx, hosts, HDFS, client_only, processing, None);
            }
        }
    }
}

impl fmt::Debug for UpgradeHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeHelper").finish_non_exhaustive()
    }
}

/// Render placeholders in the group title, stage texts, task summaries and
/// manual messages
fn post_process(ctx: &UpgradeContext, holder: &mut UpgradeGroupHolder) {
    holder.title = render(ctx, &holder.title, None);
    for stage in &mut holder.stages {
        let first = stage.tasks.first().cloned();
        stage.text = render(ctx, &stage.text, first.as_ref());
        for wrapper in &mut stage.tasks {
            let scope = wrapper.clone();
            for task in &mut wrapper.tasks {
                if let Some(summary) = &task.summary {
                    task.summary = Some(render(ctx, summary, Some(&scope)));
                }
                if task.kind == TaskType::Manual {
                    for message in &mut task.messages {
                        *message = render(ctx, message, Some(&scope));
                    }
                }
            }
        }
    }
}

/// Replace every `{{token}}` that resolves; unresolved tokens stay as they are
#[must_use]
pub fn render(ctx: &UpgradeContext, text: &str, scope: Option<&TaskWrapper>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            resolve(ctx, caps[1].trim(), scope).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn resolve(ctx: &UpgradeContext, token: &str, scope: Option<&TaskWrapper>) -> Option<String> {
    let direction = ctx.direction();
    let value = match token {
        "version" => ctx.version().to_string(),
        "direction.text" => direction.text(false),
        "direction.text.proper" => direction.text(true),
        "direction.past" => direction.past(false),
        "direction.past.proper" => direction.past(true),
        "direction.plural" => direction.plural(false),
        "direction.plural.proper" => direction.plural(true),
        "direction.verb" => direction.verb(false),
        "direction.verb.proper" => direction.verb(true),
        "hosts.all" | "hosts.master" => {
            let scope = scope.filter(|w| !w.service.is_empty() && !w.component.is_empty())?;
            let hosts = ctx.resolver().master_and_hosts(&scope.service, &scope.component)?;
            if token == "hosts.all" {
                hosts.hosts.join(", ")
            } else {
                hosts.master?
            }
        }
        other => {
            let (config_type, property) = other.split_once('/')?;
            let config = ctx.cluster().desired_config_by_type(config_type)?;
            config.property(property)?.to_string()
        }
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{Direction, UpgradePack};
    use crate::resolver::MockMasterHostResolver;
    use std::collections::BTreeMap as Map;
    use strata_state::{Clusters, Config, InMemoryPersistence, RepositoryVersion, StackId};

    fn context(resolver: MockMasterHostResolver) -> UpgradeContext {
        let clusters = Clusters::new(Arc::new(InMemoryPersistence::new()));
        let cluster = clusters.add_cluster("c1", StackId::new("HDP", "2.2")).unwrap();
        let props: Map<String, String> = [("dfs.namenode.http-address".to_string(), "nn:50070".to_string())].into();
        cluster.add_config(Config::new("hdfs-site", "v1", props)).unwrap();
        cluster.add_desired_config("admin", "hdfs-site", "v1").unwrap();
        UpgradeContext::new(
            cluster,
            Direction::Upgrade,
            RepositoryVersion::new(1, StackId::new("HDP", "2.2"), "2.2.0.0"),
            RepositoryVersion::new(2, StackId::new("HDP", "2.3"), "2.3.0.0"),
            Arc::new(UpgradePack::new("p", UpgradeType::Rolling)),
            Arc::new(resolver),
        )
    }

    #[test]
    fn renders_version_direction_and_config() {
        let ctx = context(MockMasterHostResolver::new());
        let text = "{{direction.verb.proper}} to {{version}} via {{hdfs-site/dfs.namenode.http-address}}";
        assert_eq!(render(&ctx, text, None), "Upgrading to 2.3.0.0 via nn:50070");
        assert_eq!(render(&ctx.reversed(), "{{direction.past}} to {{version}}", None), "downgraded to 2.2.0.0");
    }

    #[test]
    fn unresolved_tokens_are_kept() {
        let ctx = context(MockMasterHostResolver::new());
        assert_eq!(render(&ctx, "{{nope}} {{hdfs-site/missing}}", None), "{{nope}} {{hdfs-site/missing}}");
        assert_eq!(render(&ctx, "{{hosts.all}}", None), "{{hosts.all}}");
    }

    #[test]
    fn renders_hosts_through_resolver() {
        let mut resolver = MockMasterHostResolver::new();
        resolver
            .expect_master_and_hosts()
            .returning(|_, _| Some(HostsType::of(&["h1", "h2"]).with_masters("h2", Some("h1"))));
        let ctx = context(resolver);
        let scope = TaskWrapper::new("HDFS", "NAMENODE", vec!["h1".to_string()], Vec::new());
        assert_eq!(
            render(&ctx, "Failover from {{hosts.master}} ({{hosts.all}})", Some(&scope)),
            "Failover from h2 (h1, h2)"
        );
    }
}

//! Built-in pre-flight checks

use crate::check::{CheckContext, CheckDescriptor, CheckRequest, CheckStatus, CheckType, PrerequisiteCheck};
use crate::error::CheckResult;
use std::sync::Arc;
use strata_state::{Cluster, ComponentCategory, HostHealthStatus, RepositoryVersionState, ServiceComponentHost, State};
use tracing::debug;

fn cluster(request: &CheckRequest, ctx: &CheckContext) -> CheckResult<Arc<Cluster>> {
    Ok(ctx.clusters.cluster(&request.cluster_name)?)
}

/// Category the desired stack declares, else the one the component was added with
fn category(sch: &ServiceComponentHost, ctx: &CheckContext) -> ComponentCategory {
    ctx.metadata
        .component_category(&sch.desired_stack_id(), sch.service_name(), sch.component_name())
        .unwrap_or_else(|| sch.category())
}

/// Every host not in maintenance must be heartbeating and healthy
#[derive(Debug, Default)]
pub struct HostsHeartbeatCheck;

impl CheckDescriptor for HostsHeartbeatCheck {
    fn id(&self) -> &'static str {
        "HOSTS_HEARTBEAT"
    }

    fn description(&self) -> &'static str {
        "All hosts must be heartbeating with the server unless they are in Maintenance Mode"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Host
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        let cluster = cluster(request, ctx)?;
        for host in ctx.clusters.hosts_for_cluster(cluster.name())? {
            if host.maintenance_state(cluster.id()).is_on() {
                continue;
            }
            if host.health() != HostHealthStatus::Healthy {
                debug!(host = %host.name(), health = %host.health(), "host not heartbeating");
                result.fail_on(host.name());
            }
        }
        result.fail_if_any(CheckStatus::Fail, "The following hosts must be heartbeating to the server");
        Ok(())
    }
}

/// Hosts running a master must not be in maintenance
#[derive(Debug, Default)]
pub struct HostsMasterMaintenanceCheck;

impl CheckDescriptor for HostsMasterMaintenanceCheck {
    fn id(&self) -> &'static str {
        "HOSTS_MASTER_MAINTENANCE"
    }

    fn description(&self) -> &'static str {
        "Hosts in Maintenance Mode must not have any master components"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Host
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        let cluster = cluster(request, ctx)?;
        for sch in cluster.all_host_components() {
            if category(&sch, ctx) != ComponentCategory::Master {
                continue;
            }
            let host = ctx.clusters.host(sch.host_name())?;
            if host.maintenance_state(cluster.id()).is_on() {
                result.fail_on(sch.host_name());
            }
        }
        result.fail_if_any(
            CheckStatus::Fail,
            "The following hosts in Maintenance Mode run master components",
        );
        Ok(())
    }
}

/// Every non-client component outside maintenance must be started
#[derive(Debug, Default)]
pub struct ServicesUpCheck;

impl CheckDescriptor for ServicesUpCheck {
    fn id(&self) -> &'static str {
        "SERVICES_UP"
    }

    fn description(&self) -> &'static str {
        "All services must be started"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Service
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        let cluster = cluster(request, ctx)?;
        for sch in cluster.all_host_components() {
            if category(&sch, ctx) == ComponentCategory::Client || sch.maintenance_state().is_on() {
                continue;
            }
            if sch.state() != State::Started {
                debug!(
                    service = %sch.service_name(),
                    component = %sch.component_name(),
                    host = %sch.host_name(),
                    state = %sch.state(),
                    "component not started"
                );
                result.fail_on(sch.service_name());
            }
        }
        result.fail_if_any(CheckStatus::Fail, "The following services must be started");
        Ok(())
    }
}

/// No service may be in maintenance
#[derive(Debug, Default)]
pub struct ServicesMaintenanceModeCheck;

impl CheckDescriptor for ServicesMaintenanceModeCheck {
    fn id(&self) -> &'static str {
        "SERVICES_MAINTENANCE_MODE"
    }

    fn description(&self) -> &'static str {
        "No services can be in Maintenance Mode"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Service
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        for service in cluster(request, ctx)?.services() {
            if service.maintenance_state().is_on() {
                result.fail_on(service.name());
            }
        }
        result.fail_if_any(
            CheckStatus::Fail,
            "The following services must be taken out of Maintenance Mode",
        );
        Ok(())
    }
}

/// Components running stale configuration should be restarted first
#[derive(Debug, Default)]
pub struct StaleConfigsCheck;

impl CheckDescriptor for StaleConfigsCheck {
    fn id(&self) -> &'static str {
        "SERVICES_STALE_CONFIGS"
    }

    fn description(&self) -> &'static str {
        "Services should not have components that require a restart"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Service
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        let cluster = cluster(request, ctx)?;
        for sch in cluster.all_host_components() {
            if ctx.config_helper.is_stale_configs(&cluster, &sch)? {
                result.fail_on(sch.service_name());
            }
        }
        result.fail_if_any(
            CheckStatus::Warning,
            "The following services have components that must be restarted to apply configuration changes",
        );
        Ok(())
    }
}

/// Every host outside maintenance must have the target version installed
#[derive(Debug, Default)]
pub struct HostsRepositoryVersionCheck;

impl CheckDescriptor for HostsRepositoryVersionCheck {
    fn id(&self) -> &'static str {
        "HOSTS_REPOSITORY_VERSION"
    }

    fn description(&self) -> &'static str {
        "All hosts must have the target version installed"
    }

    fn check_type(&self) -> CheckType {
        CheckType::Host
    }

    fn is_applicable(&self, request: &CheckRequest, _ctx: &CheckContext) -> CheckResult<bool> {
        Ok(request.repository_version.is_some())
    }

    fn perform(&self, result: &mut PrerequisiteCheck, request: &CheckRequest, ctx: &CheckContext) -> CheckResult<()> {
        let Some(version) = request.repository_version.as_deref() else {
            return Ok(());
        };
        let cluster = cluster(request, ctx)?;
        for host in ctx.clusters.hosts_for_cluster(cluster.name())? {
            if host.maintenance_state(cluster.id()).is_on() {
                continue;
            }
            let installed = matches!(
                host.version_state(version),
                Some(RepositoryVersionState::Installed | RepositoryVersionState::Current)
            );
            if !installed {
                result.fail_on(host.name());
            }
        }
        result.fail_if_any(
            CheckStatus::Fail,
            format!("The following hosts must have version {version} installed"),
        );
        Ok(())
    }
}

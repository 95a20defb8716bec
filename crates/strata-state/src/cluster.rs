//! Clusters: the arena that owns services, components and host-components
//!
//! The cluster keeps its entities in a [`Topology`] keyed by stable ids, with
//! parent → child relationships stored as key sets rather than references.
//! The topology sits behind the cluster-global lock; reads take it shared,
//! every structural change takes it exclusively.

use crate::component::{ComponentState, ServiceComponent};
use crate::config::{Config, ConfigGroup, DesiredConfig, HostConfig};
use crate::error::{StateError, StateResult};
use crate::host_component::{HostComponentState, SchIdentity, ServiceComponentHost};
use crate::ids::{ClusterId, ComponentId, ConfigGroupId, SchId, ServiceId};
use crate::lock::{ClusterGlobalLock, EntityLock, GlobalHeld};
use crate::metadata::ComponentCategory;
use crate::persist::{EntityKey, EntitySnapshot, Persistence};
use crate::service::{Service, ServiceState};
use crate::stack::StackId;
use crate::state::{MaintenanceState, State};
use crate::version::{RepositoryVersionState, VersionLedger};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cluster-level mutable fields
#[derive(Debug, Clone)]
struct ClusterFields {
    desired_stack_id: StackId,
    current_stack_id: Option<StackId>,
    configs: BTreeMap<String, BTreeMap<String, Arc<Config>>>,
    desired_configs: BTreeMap<String, DesiredConfig>,
    config_groups: BTreeMap<ConfigGroupId, ConfigGroup>,
    versions: VersionLedger,
}

/// Entity arena of one cluster
#[derive(Debug, Default)]
struct Topology {
    hosts: BTreeSet<String>,
    services: BTreeMap<ServiceId, Arc<Service>>,
    service_names: BTreeMap<String, ServiceId>,
    components: BTreeMap<ComponentId, Arc<ServiceComponent>>,
    service_components: BTreeMap<ServiceId, BTreeMap<String, ComponentId>>,
    host_components: BTreeMap<SchId, Arc<ServiceComponentHost>>,
    component_hosts: BTreeMap<ComponentId, BTreeMap<String, SchId>>,
    host_index: BTreeMap<String, BTreeSet<SchId>>,
}

impl Topology {
    fn service(&self, name: &str) -> Option<&Arc<Service>> {
        self.service_names.get(name).and_then(|id| self.services.get(id))
    }

    fn component(&self, service: ServiceId, name: &str) -> Option<&Arc<ServiceComponent>> {
        self.service_components
            .get(&service)?
            .get(name)
            .and_then(|id| self.components.get(id))
    }

    fn host_component(&self, component: ComponentId, host: &str) -> Option<&Arc<ServiceComponentHost>> {
        self.component_hosts
            .get(&component)?
            .get(host)
            .and_then(|id| self.host_components.get(id))
    }

    fn components_of(&self, service: ServiceId) -> impl Iterator<Item = &Arc<ServiceComponent>> {
        self.service_components
            .get(&service)
            .into_iter()
            .flat_map(|names| names.values())
            .filter_map(|id| self.components.get(id))
    }

    fn host_components_of(&self, component: ComponentId) -> impl Iterator<Item = &Arc<ServiceComponentHost>> {
        self.component_hosts
            .get(&component)
            .into_iter()
            .flat_map(|hosts| hosts.values())
            .filter_map(|id| self.host_components.get(id))
    }

    fn insert_service(&mut self, service: Arc<Service>) {
        self.service_names.insert(service.name().to_string(), service.id());
        self.service_components.entry(service.id()).or_default();
        self.services.insert(service.id(), service);
    }

    fn insert_component(&mut self, component: Arc<ServiceComponent>) {
        self.service_components
            .entry(component.service_id())
            .or_default()
            .insert(component.name().to_string(), component.id());
        self.component_hosts.entry(component.id()).or_default();
        self.components.insert(component.id(), component);
    }

    fn insert_host_component(&mut self, sch: Arc<ServiceComponentHost>) {
        self.component_hosts
            .entry(sch.component_id())
            .or_default()
            .insert(sch.host_name().to_string(), sch.id());
        self.host_index
            .entry(sch.host_name().to_string())
            .or_default()
            .insert(sch.id());
        self.host_components.insert(sch.id(), sch);
    }

    fn remove_host_component(&mut self, id: SchId) {
        if let Some(sch) = self.host_components.remove(&id) {
            if let Some(hosts) = self.component_hosts.get_mut(&sch.component_id()) {
                hosts.remove(sch.host_name());
            }
            if let Some(ids) = self.host_index.get_mut(sch.host_name()) {
                ids.remove(&id);
            }
        }
    }

    fn remove_component(&mut self, id: ComponentId) {
        let sch_ids: Vec<SchId> = self.host_components_of(id).map(|sch| sch.id()).collect();
        for sch in sch_ids {
            self.remove_host_component(sch);
        }
        self.component_hosts.remove(&id);
        if let Some(component) = self.components.remove(&id) {
            if let Some(names) = self.service_components.get_mut(&component.service_id()) {
                names.remove(component.name());
            }
        }
    }

    fn remove_service(&mut self, id: ServiceId) {
        let component_ids: Vec<ComponentId> = self.components_of(id).map(|c| c.id()).collect();
        for component in component_ids {
            self.remove_component(component);
        }
        self.service_components.remove(&id);
        if let Some(service) = self.services.remove(&id) {
            self.service_names.remove(service.name());
        }
    }
}

/// A managed cluster
pub struct Cluster {
    id: ClusterId,
    name: String,
    global: ClusterGlobalLock,
    fields: EntityLock<ClusterFields>,
    topology: EntityLock<Topology>,
    persistence: Arc<dyn Persistence>,
    next_id: AtomicU64,
}

impl Cluster {
    pub(crate) fn new(
        id: ClusterId,
        name: impl Into<String>,
        desired_stack_id: StackId,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let global = ClusterGlobalLock::new();
        let fields = ClusterFields {
            desired_stack_id,
            current_stack_id: None,
            configs: BTreeMap::new(),
            desired_configs: BTreeMap::new(),
            config_groups: BTreeMap::new(),
            versions: VersionLedger::new(),
        };
        Self {
            id,
            name: name.into(),
            fields: EntityLock::new(global.clone(), fields),
            topology: EntityLock::persisted(global.clone(), Topology::default()),
            global,
            persistence,
            next_id: AtomicU64::new(1),
        }
    }

    /// Cluster id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Cluster name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cluster-global lock
    #[inline]
    #[must_use]
    pub fn global_lock(&self) -> &ClusterGlobalLock {
        &self.global
    }

    /// Write the cluster row; the first call registers it
    ///
    /// # Errors
    /// Persistence failure.
    pub fn persist(&self) -> StateResult<()> {
        self.fields.persist(|_, f| self.store_fields(f), |f| self.store_fields(f))
    }

    // ----- stacks -----

    /// Desired stack
    #[must_use]
    pub fn desired_stack_id(&self) -> StackId {
        self.fields.read().desired_stack_id.clone()
    }

    /// Set desired stack
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_desired_stack_id(&self, stack: StackId) -> StateResult<()> {
        self.update_fields(|f| {
            f.desired_stack_id = stack;
            Ok(())
        })
    }

    /// Stack the cluster currently runs
    #[must_use]
    pub fn current_stack_id(&self) -> Option<StackId> {
        self.fields.read().current_stack_id.clone()
    }

    /// Set the running stack
    ///
    /// # Errors
    /// Persistence failure.
    pub fn set_current_stack_id(&self, stack: StackId) -> StateResult<()> {
        self.update_fields(|f| {
            f.current_stack_id = Some(stack);
            Ok(())
        })
    }

    // ----- hosts -----

    /// Add a host to the cluster; returns `false` if it was already a member
    pub(crate) fn add_host_membership(&self, host: &str) -> StateResult<bool> {
        let mut topology = self.topology.write_exclusive();
        if topology.hosts.contains(host) {
            return Ok(false);
        }
        self.persistence.store(&EntitySnapshot::HostMapping {
            cluster_id: self.id,
            host: host.to_string(),
        })?;
        topology.hosts.insert(host.to_string());
        info!(cluster = %self.name, host, "host mapped to cluster");
        Ok(true)
    }

    /// Whether the host is a member
    #[must_use]
    pub fn has_host(&self, host: &str) -> bool {
        self.topology.read().hosts.contains(host)
    }

    /// Member hosts, sorted
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        self.topology.read().hosts.iter().cloned().collect()
    }

    // ----- services -----

    /// Create and persist a service at the cluster's desired stack
    ///
    /// # Errors
    /// `DuplicateService` or persistence failure.
    pub fn add_service(&self, name: &str) -> StateResult<Arc<Service>> {
        let state = ServiceState {
            desired_state: State::Init,
            desired_stack_id: self.desired_stack_id(),
            maintenance: MaintenanceState::Off,
        };
        let service = Arc::new(Service::new(
            ServiceId(self.allocate_id()),
            self.id,
            self.name.clone(),
            name.to_string(),
            EntityLock::new(self.global.clone(), state),
            self.persistence.clone(),
        ));
        service.lock.persist(
            |global, state| {
                let mut topology = self.topology.write_held(global);
                if topology.service(name).is_some() {
                    return Err(StateError::DuplicateService {
                        cluster: self.name.clone(),
                        service: name.to_string(),
                    });
                }
                self.persistence.store(&service.snapshot_of(state))?;
                topology.insert_service(service.clone());
                Ok(())
            },
            |state| Ok(self.persistence.store(&service.snapshot_of(state))?),
        )?;
        info!(cluster = %self.name, service = name, id = %service.id(), "service added");
        Ok(service)
    }

    /// Service by name
    ///
    /// # Errors
    /// `ServiceNotFound`.
    pub fn service(&self, name: &str) -> StateResult<Arc<Service>> {
        self.topology
            .read()
            .service(name)
            .cloned()
            .ok_or_else(|| self.service_not_found(name))
    }

    /// All services, ordered by id
    #[must_use]
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.topology.read().services.values().cloned().collect()
    }

    /// Delete a service with all its components and host-components
    ///
    /// # Errors
    /// `ServiceNotFound`, `NotRemovable` if any host-component is not in a
    /// removable state, or persistence failure.
    pub fn delete_service(&self, name: &str) -> StateResult<()> {
        let global = self.global.write();
        let mut topology = self.topology.write_held(&global);
        let service_id = topology
            .service(name)
            .map(|s| s.id())
            .ok_or_else(|| self.service_not_found(name))?;

        let mut keys = Vec::new();
        for component in topology.components_of(service_id) {
            for sch in topology.host_components_of(component.id()) {
                self.ensure_removable(&global, sch)?;
                keys.push(EntityKey::HostComponent(self.id, sch.id()));
            }
            keys.push(EntityKey::Component(self.id, component.id()));
        }
        keys.push(EntityKey::Service(self.id, service_id));
        for key in &keys {
            self.persistence.remove(key)?;
        }
        topology.remove_service(service_id);
        info!(cluster = %self.name, service = name, "service deleted");
        Ok(())
    }

    // ----- components -----

    /// Create and persist a component under a service
    ///
    /// # Errors
    /// `ServiceNotFound`, `DuplicateComponent` or persistence failure.
    pub fn add_component(
        &self,
        service: &str,
        name: &str,
        category: ComponentCategory,
    ) -> StateResult<Arc<ServiceComponent>> {
        let parent = self.service(service)?;
        let state = ComponentState {
            desired_state: State::Init,
            desired_stack_id: parent.desired_stack_id(),
            category,
        };
        let component = Arc::new(ServiceComponent::new(
            ComponentId(self.allocate_id()),
            self.id,
            parent.id(),
            service.to_string(),
            name.to_string(),
            category,
            EntityLock::new(self.global.clone(), state),
            self.persistence.clone(),
        ));
        component.lock.persist(
            |global, state| {
                let mut topology = self.topology.write_held(global);
                if !topology.services.contains_key(&parent.id()) {
                    return Err(self.service_not_found(service));
                }
                if topology.component(parent.id(), name).is_some() {
                    return Err(StateError::DuplicateComponent {
                        cluster: self.name.clone(),
                        service: service.to_string(),
                        component: name.to_string(),
                    });
                }
                self.persistence.store(&component.snapshot_of(state))?;
                topology.insert_component(component.clone());
                Ok(())
            },
            |state| Ok(self.persistence.store(&component.snapshot_of(state))?),
        )?;
        info!(cluster = %self.name, service, component = name, %category, "component added");
        Ok(component)
    }

    /// Component by service and name
    ///
    /// # Errors
    /// `ServiceNotFound` or `ComponentNotFound`.
    pub fn component(&self, service: &str, name: &str) -> StateResult<Arc<ServiceComponent>> {
        let topology = self.topology.read();
        let service_id = topology
            .service(service)
            .map(|s| s.id())
            .ok_or_else(|| self.service_not_found(service))?;
        topology
            .component(service_id, name)
            .cloned()
            .ok_or_else(|| self.component_not_found(service, name))
    }

    /// Components of a service, ordered by name
    ///
    /// # Errors
    /// `ServiceNotFound`.
    pub fn components(&self, service: &str) -> StateResult<Vec<Arc<ServiceComponent>>> {
        let topology = self.topology.read();
        let service_id = topology
            .service(service)
            .map(|s| s.id())
            .ok_or_else(|| self.service_not_found(service))?;
        Ok(topology.components_of(service_id).cloned().collect())
    }

    /// Delete a component with all its host-components
    ///
    /// # Errors
    /// `ServiceNotFound`, `ComponentNotFound`, `NotRemovable` or persistence
    /// failure.
    pub fn delete_component(&self, service: &str, name: &str) -> StateResult<()> {
        let global = self.global.write();
        let mut topology = self.topology.write_held(&global);
        let service_id = topology
            .service(service)
            .map(|s| s.id())
            .ok_or_else(|| self.service_not_found(service))?;
        let component_id = topology
            .component(service_id, name)
            .map(|c| c.id())
            .ok_or_else(|| self.component_not_found(service, name))?;

        let mut keys = Vec::new();
        for sch in topology.host_components_of(component_id) {
            self.ensure_removable(&global, sch)?;
            keys.push(EntityKey::HostComponent(self.id, sch.id()));
        }
        keys.push(EntityKey::Component(self.id, component_id));
        for key in &keys {
            self.persistence.remove(key)?;
        }
        topology.remove_component(component_id);
        info!(cluster = %self.name, service, component = name, "component deleted");
        Ok(())
    }

    // ----- host-components -----

    /// Create a detached host-component
    ///
    /// The returned entity is not visible through the cluster until
    /// [`persist_host_component`](Self::persist_host_component) runs.
    ///
    /// # Errors
    /// `ServiceNotFound`, `ComponentNotFound` or `HostNotInCluster`.
    pub fn new_host_component(
        &self,
        service: &str,
        component: &str,
        host: &str,
    ) -> StateResult<Arc<ServiceComponentHost>> {
        let parent = self.component(service, component)?;
        if !self.has_host(host) {
            return Err(StateError::HostNotInCluster {
                cluster: self.name.clone(),
                host: host.to_string(),
            });
        }
        let identity = SchIdentity {
            id: SchId(self.allocate_id()),
            cluster_id: self.id,
            cluster_name: self.name.clone(),
            service_id: parent.service_id(),
            service_name: service.to_string(),
            component_id: parent.id(),
            component_name: component.to_string(),
            host_name: host.to_string(),
            category: parent.category(),
        };
        let state = HostComponentState::new(parent.desired_stack_id());
        Ok(Arc::new(ServiceComponentHost::new(
            identity,
            EntityLock::new(self.global.clone(), state),
            self.persistence.clone(),
        )))
    }

    /// Persist a host-component
    ///
    /// The first call takes the cluster-global lock exclusively, checks that
    /// the component has no other instance on the host and registers the
    /// entity. Later calls only write it out.
    ///
    /// # Errors
    /// `DuplicateHostComponent`, `ComponentNotFound` if the component was
    /// deleted meanwhile, or persistence failure.
    pub fn persist_host_component(&self, sch: &Arc<ServiceComponentHost>) -> StateResult<()> {
        let first_persist = !sch.is_persisted();
        sch.lock.persist(
            |global, state| {
                let mut topology = self.topology.write_held(global);
                if !topology.components.contains_key(&sch.component_id()) {
                    return Err(self.component_not_found(sch.service_name(), sch.component_name()));
                }
                if topology.host_component(sch.component_id(), sch.host_name()).is_some() {
                    return Err(StateError::DuplicateHostComponent {
                        cluster: self.name.clone(),
                        service: sch.service_name().to_string(),
                        component: sch.component_name().to_string(),
                        host: sch.host_name().to_string(),
                    });
                }
                self.persistence.store(&sch.snapshot_of(state))?;
                topology.insert_host_component(sch.clone());
                Ok(())
            },
            |state| Ok(self.persistence.store(&sch.snapshot_of(state))?),
        )?;
        if first_persist {
            info!(
                cluster = %self.name,
                service = sch.service_name(),
                component = sch.component_name(),
                host = sch.host_name(),
                "host-component added"
            );
        }
        Ok(())
    }

    /// Create and persist a host-component in one step
    ///
    /// # Errors
    /// See [`new_host_component`](Self::new_host_component) and
    /// [`persist_host_component`](Self::persist_host_component).
    pub fn add_host_component(
        &self,
        service: &str,
        component: &str,
        host: &str,
    ) -> StateResult<Arc<ServiceComponentHost>> {
        let sch = self.new_host_component(service, component, host)?;
        self.persist_host_component(&sch)?;
        Ok(sch)
    }

    /// Host-component by names
    ///
    /// # Errors
    /// `ServiceNotFound`, `ComponentNotFound` or `HostComponentNotFound`.
    pub fn host_component(
        &self,
        service: &str,
        component: &str,
        host: &str,
    ) -> StateResult<Arc<ServiceComponentHost>> {
        let parent = self.component(service, component)?;
        self.topology
            .read()
            .host_component(parent.id(), host)
            .cloned()
            .ok_or_else(|| StateError::HostComponentNotFound {
                cluster: self.name.clone(),
                service: service.to_string(),
                component: component.to_string(),
                host: host.to_string(),
            })
    }

    /// Host-component by id
    #[must_use]
    pub fn host_component_by_id(&self, id: SchId) -> Option<Arc<ServiceComponentHost>> {
        self.topology.read().host_components.get(&id).cloned()
    }

    /// Instances of a component, ordered by host name
    ///
    /// # Errors
    /// `ServiceNotFound` or `ComponentNotFound`.
    pub fn host_components(&self, service: &str, component: &str) -> StateResult<Vec<Arc<ServiceComponentHost>>> {
        let parent = self.component(service, component)?;
        Ok(self.topology.read().host_components_of(parent.id()).cloned().collect())
    }

    /// Host-components placed on a host
    #[must_use]
    pub fn host_components_for_host(&self, host: &str) -> Vec<Arc<ServiceComponentHost>> {
        let topology = self.topology.read();
        topology
            .host_index
            .get(host)
            .into_iter()
            .flatten()
            .filter_map(|id| topology.host_components.get(id).cloned())
            .collect()
    }

    /// Every host-component of the cluster
    #[must_use]
    pub fn all_host_components(&self) -> Vec<Arc<ServiceComponentHost>> {
        self.topology.read().host_components.values().cloned().collect()
    }

    /// Delete a host-component
    ///
    /// # Errors
    /// Lookup errors, `NotRemovable` or persistence failure.
    pub fn delete_host_component(&self, service: &str, component: &str, host: &str) -> StateResult<()> {
        let global = self.global.write();
        let mut topology = self.topology.write_held(&global);
        let sch = topology
            .service(service)
            .and_then(|s| topology.component(s.id(), component))
            .and_then(|c| topology.host_component(c.id(), host))
            .cloned()
            .ok_or_else(|| StateError::HostComponentNotFound {
                cluster: self.name.clone(),
                service: service.to_string(),
                component: component.to_string(),
                host: host.to_string(),
            })?;
        self.ensure_removable(&global, &sch)?;
        self.persistence.remove(&EntityKey::HostComponent(self.id, sch.id()))?;
        topology.remove_host_component(sch.id());
        info!(cluster = %self.name, service, component, host, "host-component deleted");
        Ok(())
    }

    /// Whether every host-component is in a removable state
    #[must_use]
    pub fn can_be_removed(&self) -> bool {
        let global = self.global.read();
        let topology = self.topology.read_held(&global);
        topology
            .host_components
            .values()
            .all(|sch| sch.lock.read_held(&global).state.is_removable_state())
    }

    // ----- configs -----

    /// Add a config version; assigns the next per-type version number
    ///
    /// # Errors
    /// `DuplicateConfig` or persistence failure.
    pub fn add_config(&self, config: Config) -> StateResult<Arc<Config>> {
        let config_type = config.config_type.clone();
        let tag = config.tag.clone();
        let added = self.fields.update(
            |f| {
                let versions = f.configs.entry(config.config_type.clone()).or_default();
                if versions.contains_key(&config.tag) {
                    return Err(StateError::DuplicateConfig {
                        cluster: self.name.clone(),
                        config_type: config.config_type,
                        tag: config.tag,
                    });
                }
                let next = versions.values().map(|c| c.version).max().unwrap_or(0) + 1;
                let config = Arc::new(Config { version: next, ..config });
                versions.insert(config.tag.clone(), config.clone());
                Ok(config)
            },
            |f| {
                let stored = f.configs.get(&config_type).and_then(|v| v.get(&tag));
                if let Some(config) = stored {
                    self.persistence.store(&EntitySnapshot::Config {
                        cluster_id: self.id,
                        config: Config::clone(config),
                    })?;
                }
                Ok(())
            },
        )?;
        debug!(cluster = %self.name, config_type = %added.config_type, tag = %added.tag, version = added.version, "config added");
        Ok(added)
    }

    /// Config by type and tag
    ///
    /// # Errors
    /// `ConfigNotFound`.
    pub fn config(&self, config_type: &str, tag: &str) -> StateResult<Arc<Config>> {
        self.fields
            .read()
            .configs
            .get(config_type)
            .and_then(|versions| versions.get(tag))
            .cloned()
            .ok_or_else(|| self.config_not_found(config_type, tag))
    }

    /// All versions of a config type, oldest first
    #[must_use]
    pub fn configs_by_type(&self, config_type: &str) -> Vec<Arc<Config>> {
        let mut configs: Vec<Arc<Config>> = self
            .fields
            .read()
            .configs
            .get(config_type)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default();
        configs.sort_by_key(|c| c.version);
        configs
    }

    /// Select the desired tag for a config type, replacing any previous one
    ///
    /// # Errors
    /// `ConfigNotFound` or persistence failure.
    pub fn add_desired_config(&self, user: &str, config_type: &str, tag: &str) -> StateResult<DesiredConfig> {
        let desired = self.update_fields(|f| {
            let config = f
                .configs
                .get(config_type)
                .and_then(|versions| versions.get(tag))
                .ok_or_else(|| self.config_not_found(config_type, tag))?;
            let desired = DesiredConfig {
                tag: tag.to_string(),
                version: config.version,
                user: user.to_string(),
                service_name: None,
            };
            f.desired_configs.insert(config_type.to_string(), desired.clone());
            Ok(desired)
        })?;
        info!(cluster = %self.name, config_type, tag, user, "desired config changed");
        Ok(desired)
    }

    /// Desired config per type
    #[must_use]
    pub fn desired_configs(&self) -> BTreeMap<String, DesiredConfig> {
        self.fields.read().desired_configs.clone()
    }

    /// The desired config of a type
    #[must_use]
    pub fn desired_config_by_type(&self, config_type: &str) -> Option<Arc<Config>> {
        let fields = self.fields.read();
        let desired = fields.desired_configs.get(config_type)?;
        fields.configs.get(config_type)?.get(&desired.tag).cloned()
    }

    // ----- config groups -----

    /// Create a config group
    ///
    /// # Errors
    /// `ConfigNotFound` for an unknown `(type, tag)`, `HostNotInCluster`, or
    /// persistence failure.
    pub fn add_config_group(
        &self,
        name: &str,
        service: &str,
        hosts: BTreeSet<String>,
        configs: BTreeMap<String, String>,
    ) -> StateResult<ConfigGroupId> {
        if let Some(host) = hosts.iter().find(|h| !self.has_host(h)) {
            return Err(StateError::HostNotInCluster {
                cluster: self.name.clone(),
                host: host.clone(),
            });
        }
        let group = ConfigGroup {
            id: ConfigGroupId(self.allocate_id()),
            name: name.to_string(),
            tag: service.to_string(),
            hosts,
            configs,
        };
        let id = group.id;
        self.fields.update(
            |f| {
                for (config_type, tag) in &group.configs {
                    let known = f.configs.get(config_type).is_some_and(|v| v.contains_key(tag));
                    if !known {
                        return Err(self.config_not_found(config_type, tag));
                    }
                }
                f.config_groups.insert(group.id, group.clone());
                Ok(())
            },
            |f| {
                if let Some(group) = f.config_groups.get(&id) {
                    self.persistence.store(&EntitySnapshot::ConfigGroup {
                        cluster_id: self.id,
                        group: group.clone(),
                    })?;
                }
                Ok(())
            },
        )?;
        info!(cluster = %self.name, group = name, %id, "config group added");
        Ok(id)
    }

    /// Delete a config group
    ///
    /// # Errors
    /// `ConfigGroupNotFound` or persistence failure.
    pub fn delete_config_group(&self, id: ConfigGroupId) -> StateResult<()> {
        self.fields.update(
            |f| {
                f.config_groups
                    .remove(&id)
                    .map(|_| ())
                    .ok_or_else(|| StateError::ConfigGroupNotFound(id.to_string()))
            },
            |_| Ok(self.persistence.remove(&EntityKey::ConfigGroup(self.id, id))?),
        )
    }

    /// Config group by id
    #[must_use]
    pub fn config_group(&self, id: ConfigGroupId) -> Option<ConfigGroup> {
        self.fields.read().config_groups.get(&id).cloned()
    }

    /// All config groups
    #[must_use]
    pub fn config_groups(&self) -> Vec<ConfigGroup> {
        self.fields.read().config_groups.values().cloned().collect()
    }

    /// Config groups the host belongs to
    #[must_use]
    pub fn config_groups_by_host(&self, host: &str) -> BTreeMap<ConfigGroupId, ConfigGroup> {
        self.fields
            .read()
            .config_groups
            .values()
            .filter(|g| g.contains_host(host))
            .map(|g| (g.id, g.clone()))
            .collect()
    }

    /// Desired tags for a host: the cluster tag per type plus the overrides of
    /// every config group the host belongs to
    #[must_use]
    pub fn host_config_overrides(&self, host: &str) -> BTreeMap<String, HostConfig> {
        let fields = self.fields.read();
        let mut result: BTreeMap<String, HostConfig> = fields
            .desired_configs
            .iter()
            .map(|(config_type, desired)| (config_type.clone(), HostConfig::with_default_tag(&desired.tag)))
            .collect();
        for group in fields.config_groups.values().filter(|g| g.contains_host(host)) {
            for (config_type, tag) in &group.configs {
                result
                    .entry(config_type.clone())
                    .or_default()
                    .overrides
                    .insert(group.id, tag.clone());
            }
        }
        result
    }

    // ----- repository versions -----

    /// Record a repository version for the cluster
    ///
    /// # Errors
    /// Ledger rejection or persistence failure.
    pub fn register_cluster_version(&self, version: &str, state: RepositoryVersionState) -> StateResult<()> {
        self.update_fields(|f| f.versions.register(version, state))
    }

    /// Move a cluster repository version
    ///
    /// # Errors
    /// Ledger rejection or persistence failure.
    pub fn transition_cluster_version(&self, version: &str, to: RepositoryVersionState) -> StateResult<()> {
        self.update_fields(|f| f.versions.transition(version, to))?;
        info!(cluster = %self.name, version, to = %to, "cluster version transition");
        Ok(())
    }

    /// State of a cluster repository version
    #[must_use]
    pub fn cluster_version_state(&self, version: &str) -> Option<RepositoryVersionState> {
        self.fields.read().versions.state(version)
    }

    /// Version the cluster currently runs
    #[must_use]
    pub fn current_cluster_version(&self) -> Option<String> {
        self.fields.read().versions.current().map(str::to_string)
    }

    // ----- internals -----

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn update_fields<R>(&self, mutate: impl FnOnce(&mut ClusterFields) -> StateResult<R>) -> StateResult<R> {
        self.fields.update(mutate, |f| self.store_fields(f))
    }

    fn store_fields(&self, fields: &ClusterFields) -> StateResult<()> {
        self.persistence.store(&EntitySnapshot::Cluster {
            id: self.id,
            name: self.name.clone(),
            desired_stack_id: fields.desired_stack_id.clone(),
            current_stack_id: fields.current_stack_id.clone(),
            desired_configs: fields.desired_configs.clone(),
            versions: fields.versions.clone(),
        })?;
        Ok(())
    }

    fn ensure_removable(&self, held: &impl GlobalHeld, sch: &ServiceComponentHost) -> StateResult<()> {
        let state = sch.lock.read_held(held).state;
        if state.is_removable_state() {
            return Ok(());
        }
        Err(StateError::NotRemovable {
            cluster: self.name.clone(),
            component: sch.component_name().to_string(),
            host: sch.host_name().to_string(),
            state,
        })
    }

    fn service_not_found(&self, service: &str) -> StateError {
        StateError::ServiceNotFound {
            cluster: self.name.clone(),
            service: service.to_string(),
        }
    }

    fn component_not_found(&self, service: &str, component: &str) -> StateError {
        StateError::ComponentNotFound {
            cluster: self.name.clone(),
            service: service.to_string(),
            component: component.to_string(),
        }
    }

    fn config_not_found(&self, config_type: &str, tag: &str) -> StateError {
        StateError::ConfigNotFound {
            cluster: self.name.clone(),
            config_type: config_type.to_string(),
            tag: tag.to_string(),
        }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

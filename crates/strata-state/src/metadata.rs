//! Stack metadata contract
//!
//! The engine never parses stack definitions itself. It asks a
//! [`MetadataProvider`] which config types and properties each service and
//! component declares. [`StaticMetadata`] is a serde-loadable in-memory
//! provider.

use crate::stack::StackId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Role of a component within its service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentCategory {
    /// Singleton or HA master
    Master,
    /// Worker running on many hosts
    Slave,
    /// Client libraries only
    Client,
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentCategory::Master => "MASTER",
            ComponentCategory::Slave => "SLAVE",
            ComponentCategory::Client => "CLIENT",
        };
        f.write_str(name)
    }
}

/// Read-only view of stack/service definitions
pub trait MetadataProvider: Send + Sync {
    /// Whether the service declares the config type
    fn service_has_config_type(&self, stack: &StackId, service: &str, config_type: &str) -> bool;

    /// Whether the component declares the config type
    fn component_has_config_type(
        &self,
        stack: &StackId,
        service: &str,
        component: &str,
        config_type: &str,
    ) -> bool;

    /// Whether the service defines any of `keys` under the config type
    fn service_has_property_for(
        &self,
        stack: &StackId,
        service: &str,
        config_type: &str,
        keys: &[String],
    ) -> bool;

    /// Whether any service of the stack defines any of `keys` under the type
    fn stack_has_property_for(&self, stack: &StackId, config_type: &str, keys: &[String]) -> bool;

    /// Category of a component, if the stack knows it
    fn component_category(
        &self,
        stack: &StackId,
        service: &str,
        component: &str,
    ) -> Option<ComponentCategory>;

    /// Command able to apply a changed property without a restart
    ///
    /// `property` is written `type/key`.
    fn refresh_command(
        &self,
        _stack: &StackId,
        _service: &str,
        _component: &str,
        _property: &str,
    ) -> Option<String> {
        None
    }

    /// Human-readable service name
    fn service_display_name(&self, _stack: &StackId, _service: &str) -> Option<String> {
        None
    }

    /// Human-readable component name
    fn component_display_name(&self, _stack: &StackId, _service: &str, _component: &str) -> Option<String> {
        None
    }
}

/// Component definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Category
    pub category: ComponentCategory,
    /// Config types the component itself declares
    #[serde(default)]
    pub config_types: BTreeSet<String>,
    /// `type/key` → refresh command
    #[serde(default)]
    pub refresh_commands: BTreeMap<String, String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Service definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Config types the service declares
    #[serde(default)]
    pub config_types: BTreeSet<String>,
    /// Config type → property keys the service defines
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
    /// Components by name
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDefinition>,
}

/// In-memory metadata keyed by stack id string (`NAME-VERSION`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMetadata {
    #[serde(default)]
    stacks: BTreeMap<String, BTreeMap<String, ServiceDefinition>>,
}

impl StaticMetadata {
    /// Create empty metadata
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a service definition
    #[must_use]
    pub fn with_service(mut self, stack: &StackId, service: &str, definition: ServiceDefinition) -> Self {
        self.stacks
            .entry(stack.to_string())
            .or_default()
            .insert(service.to_string(), definition);
        self
    }

    /// Service definition
    #[must_use]
    pub fn service(&self, stack: &StackId, service: &str) -> Option<&ServiceDefinition> {
        self.stacks.get(&stack.to_string())?.get(service)
    }

    /// Service names of a stack
    #[must_use]
    pub fn services(&self, stack: &StackId) -> Vec<&str> {
        self.stacks
            .get(&stack.to_string())
            .map(|services| services.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn component(&self, stack: &StackId, service: &str, component: &str) -> Option<&ComponentDefinition> {
        self.service(stack, service)?.components.get(component)
    }
}

impl MetadataProvider for StaticMetadata {
    fn service_has_config_type(&self, stack: &StackId, service: &str, config_type: &str) -> bool {
        self.service(stack, service)
            .is_some_and(|s| s.config_types.contains(config_type))
    }

    fn component_has_config_type(
        &self,
        stack: &StackId,
        service: &str,
        component: &str,
        config_type: &str,
    ) -> bool {
        self.component(stack, service, component)
            .is_some_and(|c| c.config_types.contains(config_type))
    }

    fn service_has_property_for(
        &self,
        stack: &StackId,
        service: &str,
        config_type: &str,
        keys: &[String],
    ) -> bool {
        self.service(stack, service)
            .and_then(|s| s.properties.get(config_type))
            .is_some_and(|defined| keys.iter().any(|k| defined.contains(k)))
    }

    fn stack_has_property_for(&self, stack: &StackId, config_type: &str, keys: &[String]) -> bool {
        self.stacks.get(&stack.to_string()).is_some_and(|services| {
            services.values().any(|s| {
                s.properties
                    .get(config_type)
                    .is_some_and(|defined| keys.iter().any(|k| defined.contains(k)))
            })
        })
    }

    fn component_category(
        &self,
        stack: &StackId,
        service: &str,
        component: &str,
    ) -> Option<ComponentCategory> {
        self.component(stack, service, component).map(|c| c.category)
    }

    fn refresh_command(
        &self,
        stack: &StackId,
        service: &str,
        component: &str,
        property: &str,
    ) -> Option<String> {
        self.component(stack, service, component)?
            .refresh_commands
            .get(property)
            .cloned()
    }

    fn service_display_name(&self, stack: &StackId, service: &str) -> Option<String> {
        self.service(stack, service)?.display_name.clone()
    }

    fn component_display_name(&self, stack: &StackId, service: &str, component: &str) -> Option<String> {
        self.component(stack, service, component)?.display_name.clone()
    }
}

impl ServiceDefinition {
    /// Set the display name
    #[must_use]
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// Declare a config type
    #[must_use]
    pub fn config_type(mut self, config_type: &str) -> Self {
        self.config_types.insert(config_type.to_string());
        self
    }

    /// Declare a property under a config type
    #[must_use]
    pub fn property(mut self, config_type: &str, key: &str) -> Self {
        self.properties
            .entry(config_type.to_string())
            .or_default()
            .insert(key.to_string());
        self
    }

    /// Add a component
    #[must_use]
    pub fn component(mut self, name: &str, category: ComponentCategory) -> Self {
        self.components.insert(name.to_string(), ComponentDefinition::new(category));
        self
    }

    /// Add a fully specified component
    #[must_use]
    pub fn component_definition(mut self, name: &str, definition: ComponentDefinition) -> Self {
        self.components.insert(name.to_string(), definition);
        self
    }
}

impl ComponentDefinition {
    /// Component with no config declarations
    #[must_use]
    pub fn new(category: ComponentCategory) -> Self {
        Self {
            category,
            config_types: BTreeSet::new(),
            refresh_commands: BTreeMap::new(),
            display_name: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// Declare a config type on the component
    #[must_use]
    pub fn config_type(mut self, config_type: &str) -> Self {
        self.config_types.insert(config_type.to_string());
        self
    }

    /// Register a refresh command for a `type/key` property
    #[must_use]
    pub fn refresh_command(mut self, property: &str, command: &str) -> Self {
        self.refresh_commands.insert(property.to_string(), command.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> StackId {
        StackId::new("HDP", "2.2")
    }

    fn metadata() -> StaticMetadata {
        StaticMetadata::new()
            .with_service(
                &stack(),
                "HDFS",
                ServiceDefinition::default()
                    .config_type("core-site")
                    .config_type("hdfs-site")
                    .property("global", "hdfs_user")
                    .component("NAMENODE", ComponentCategory::Master),
            )
            .with_service(
                &stack(),
                "ZOOKEEPER",
                ServiceDefinition::default().component_definition(
                    "ZOOKEEPER_SERVER",
                    ComponentDefinition::new(ComponentCategory::Master).config_type("zoo.cfg"),
                ),
            )
    }

    #[test]
    fn config_type_lookup() {
        let m = metadata();
        assert!(m.service_has_config_type(&stack(), "HDFS", "core-site"));
        assert!(!m.service_has_config_type(&stack(), "ZOOKEEPER", "core-site"));
        assert!(m.component_has_config_type(&stack(), "ZOOKEEPER", "ZOOKEEPER_SERVER", "zoo.cfg"));
    }

    #[test]
    fn property_lookup_spans_stack() {
        let m = metadata();
        let keys = vec!["hdfs_user".to_string()];
        assert!(m.service_has_property_for(&stack(), "HDFS", "global", &keys));
        assert!(!m.service_has_property_for(&stack(), "ZOOKEEPER", "global", &keys));
        assert!(m.stack_has_property_for(&stack(), "global", &keys));
        assert!(!m.stack_has_property_for(&stack(), "global", &["nope".to_string()]));
    }

    #[test]
    fn loads_from_json() {
        let json = r#"{"stacks":{"HDP-2.2":{"HDFS":{"config_types":["core-site"],
            "components":{"DATANODE":{"category":"SLAVE"}}}}}}"#;
        let m: StaticMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            m.component_category(&stack(), "HDFS", "DATANODE"),
            Some(ComponentCategory::Slave)
        );
    }
}

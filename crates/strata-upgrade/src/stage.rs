//! Plan output

use crate::pack::Task;
use serde::Serialize;
use std::collections::BTreeMap;

/// What a stage does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    /// Restart, start or stop of a component
    Restart,
    /// Command or configuration task
    Execute,
    /// Operator action
    Manual,
    /// Service check
    ServiceCheck,
}

/// Tasks of one component on a set of hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskWrapper {
    /// Service name
    pub service: String,
    /// Component name, empty for service checks
    pub component: String,
    /// Target hosts
    pub hosts: Vec<String>,
    /// Tasks in order
    pub tasks: Vec<Task>,
    /// Extra command parameters
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl TaskWrapper {
    /// Wrap tasks for a component on hosts
    #[must_use]
    pub fn new(service: &str, component: &str, hosts: Vec<String>, tasks: Vec<Task>) -> Self {
        Self {
            service: service.to_string(),
            component: component.to_string(),
            hosts,
            tasks,
            params: BTreeMap::new(),
        }
    }

    /// Attach command parameters
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }
}

/// One orchestration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageWrapper {
    /// What the stage does
    pub kind: StageKind,
    /// Display text
    pub text: String,
    /// Work items, run together
    pub tasks: Vec<TaskWrapper>,
}

impl StageWrapper {
    /// Stage from work items
    #[must_use]
    pub fn new(kind: StageKind, text: impl Into<String>, tasks: Vec<TaskWrapper>) -> Self {
        Self {
            kind,
            text: text.into(),
            tasks,
        }
    }

    /// Every host the stage touches, in first-seen order
    #[must_use]
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::new();
        for host in self.tasks.iter().flat_map(|t| &t.hosts) {
            if !hosts.contains(&host.as_str()) {
                hosts.push(host);
            }
        }
        hosts
    }
}

/// Stages of one grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeGroupHolder {
    /// Grouping name
    pub name: String,
    /// Rendered title
    pub title: String,
    /// Failed stages may be skipped
    pub skippable: bool,
    /// Failed stages may be retried
    pub allow_retry: bool,
    /// Grouping supports skipping failures automatically
    pub supports_auto_skip_on_failure: bool,
    /// Failures of this grouping are skipped automatically
    pub auto_skip_failures: bool,
    /// Stages in order
    pub stages: Vec<StageWrapper>,
}

//! Declarative upgrade definition
//!
//! An [`UpgradePack`] lists groupings in execution order. Each grouping names
//! the services and components it touches and the strategy that turns them
//! into stages. Rolling packs also carry per-component processing: the tasks
//! to run for each component.

use crate::error::UpgradeResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strata_state::StackId;

/// Which way the cluster is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Towards the target version
    #[default]
    Upgrade,
    /// Back to the source version
    Downgrade,
}

impl Direction {
    /// Whether this is a downgrade
    #[inline]
    #[must_use]
    pub fn is_downgrade(self) -> bool {
        self == Direction::Downgrade
    }

    /// The opposite direction
    #[inline]
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Upgrade => Direction::Downgrade,
            Direction::Downgrade => Direction::Upgrade,
        }
    }

    /// `upgrade` / `Upgrade`
    #[must_use]
    pub fn text(self, proper: bool) -> String {
        Self::cased(self.pick("upgrade", "downgrade"), proper)
    }

    /// `upgraded` / `Upgraded`
    #[must_use]
    pub fn past(self, proper: bool) -> String {
        Self::cased(self.pick("upgraded", "downgraded"), proper)
    }

    /// `upgrades` / `Upgrades`
    #[must_use]
    pub fn plural(self, proper: bool) -> String {
        Self::cased(self.pick("upgrades", "downgrades"), proper)
    }

    /// `upgrading` / `Upgrading`
    #[must_use]
    pub fn verb(self, proper: bool) -> String {
        Self::cased(self.pick("upgrading", "downgrading"), proper)
    }

    fn pick(self, upgrade: &'static str, downgrade: &'static str) -> &'static str {
        match self {
            Direction::Upgrade => upgrade,
            Direction::Downgrade => downgrade,
        }
    }

    fn cased(word: &str, proper: bool) -> String {
        if !proper {
            return word.to_string();
        }
        let mut chars = word.chars();
        chars
            .next()
            .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pick("UPGRADE", "DOWNGRADE"))
    }
}

/// Orchestration style of a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeType {
    /// Components restart one host at a time while the cluster stays up
    Rolling,
    /// The cluster is stopped, upgraded and started again
    NonRolling,
}

/// Kind of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Run a script or command
    Execute,
    /// Wait for an operator
    Manual,
    /// Change configuration
    Configure,
    /// Restart the component
    Restart,
    /// Start the component
    Start,
    /// Stop the component
    Stop,
    /// Run the service check
    ServiceCheck,
}

impl TaskType {
    /// Whether the task bounces the component process
    #[inline]
    #[must_use]
    pub fn is_restart_like(self) -> bool {
        matches!(self, TaskType::Restart | TaskType::Start | TaskType::Stop)
    }
}

/// One unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Kind
    #[serde(rename = "type")]
    pub kind: TaskType,
    /// One-line description, may contain placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Operator messages of manual tasks, may contain placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    /// Command or script to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Task {
    /// Task of a kind with no summary or command
    #[must_use]
    pub fn new(kind: TaskType) -> Self {
        Self {
            kind,
            summary: None,
            messages: Vec::new(),
            command: None,
        }
    }

    /// Set the summary
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Add an operator message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

/// Tasks for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingComponent {
    /// Component name
    pub name: String,
    /// Run before the main tasks
    #[serde(default)]
    pub pre_tasks: Vec<Task>,
    /// Main tasks
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Run after the main tasks
    #[serde(default)]
    pub post_tasks: Vec<Task>,
}

impl ProcessingComponent {
    /// Component whose only task is `task`
    #[must_use]
    pub fn single(name: &str, task: Task) -> Self {
        Self {
            name: name.to_string(),
            pre_tasks: Vec::new(),
            tasks: vec![task],
            post_tasks: Vec::new(),
        }
    }

    /// Pre, main and post tasks in order
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.pre_tasks.iter().chain(&self.tasks).chain(&self.post_tasks)
    }
}

/// A service and the components a grouping touches, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderService {
    /// Service name
    pub name: String,
    /// Component names
    #[serde(default)]
    pub components: Vec<String>,
}

/// Stage-building strategy of a grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum GroupingKind {
    /// One stage per task across all hosts
    Parallel,
    /// Restart-like tasks run one host at a time
    Rolling,
    /// All components of a host together, first batch then the rest
    Colocated {
        /// Share of hosts in the first batch
        #[serde(default = "default_batch_percentage")]
        batch_percentage: u32,
    },
    /// One service check per service
    ServiceCheck,
}

fn default_batch_percentage() -> u32 {
    50
}

impl GroupingKind {
    /// Short strategy name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GroupingKind::Parallel => "parallel",
            GroupingKind::Rolling => "rolling",
            GroupingKind::Colocated { .. } => "colocated",
            GroupingKind::ServiceCheck => "service_check",
        }
    }
}

fn default_true() -> bool {
    true
}

/// One step of a pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    /// Unique name within the pack
    pub name: String,
    /// Display title, may contain placeholders
    #[serde(default)]
    pub title: String,
    /// Strategy
    #[serde(flatten)]
    pub kind: GroupingKind,
    /// Services and components in order
    #[serde(default)]
    pub services: Vec<OrderService>,
    /// Failed stages may be skipped
    #[serde(default)]
    pub skippable: bool,
    /// Failed stages may be retried
    #[serde(default = "default_true")]
    pub allow_retry: bool,
    /// Failures may be skipped automatically when the upgrade asks for it
    #[serde(default = "default_true")]
    pub supports_auto_skip_on_failure: bool,
    /// Non-rolling lifecycle function (STOP, START or RESTART)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<TaskType>,
    /// Only include the grouping in this direction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl Grouping {
    /// Grouping with a strategy and no services
    #[must_use]
    pub fn new(name: &str, title: &str, kind: GroupingKind) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            kind,
            services: Vec::new(),
            skippable: false,
            allow_retry: true,
            supports_auto_skip_on_failure: true,
            function: None,
            direction: None,
        }
    }

    /// Append a service with its components
    #[must_use]
    pub fn with_service(mut self, service: &str, components: &[&str]) -> Self {
        self.services.push(OrderService {
            name: service.to_string(),
            components: components.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Make the grouping a lifecycle function
    #[must_use]
    pub fn with_function(mut self, function: TaskType) -> Self {
        self.function = Some(function);
        self
    }
}

/// Declarative upgrade definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePack {
    /// Pack name
    pub name: String,
    /// Stack the pack upgrades to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_stack: Option<StackId>,
    /// Orchestration style
    #[serde(rename = "type")]
    pub upgrade_type: UpgradeType,
    /// Ids of the pre-flight checks to run before this pack
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisite_checks: Vec<String>,
    /// Groupings in upgrade order
    #[serde(default)]
    pub groups: Vec<Grouping>,
    /// Service → component → tasks
    #[serde(default)]
    pub processing: BTreeMap<String, BTreeMap<String, ProcessingComponent>>,
}

impl UpgradePack {
    /// Empty pack
    #[must_use]
    pub fn new(name: &str, upgrade_type: UpgradeType) -> Self {
        Self {
            name: name.to_string(),
            target_stack: None,
            upgrade_type,
            prerequisite_checks: Vec::new(),
            groups: Vec::new(),
            processing: BTreeMap::new(),
        }
    }

    /// Parse a JSON pack
    ///
    /// # Errors
    /// `UpgradeError::Json` on malformed input.
    pub fn from_json(input: &str) -> UpgradeResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a YAML pack
    ///
    /// # Errors
    /// `UpgradeError::Yaml` on malformed input.
    pub fn from_yaml(input: &str) -> UpgradeResult<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Require a pre-flight check
    #[must_use]
    pub fn with_prerequisite_check(mut self, id: &str) -> Self {
        self.prerequisite_checks.push(id.to_string());
        self
    }

    /// Append a grouping
    #[must_use]
    pub fn with_group(mut self, grouping: Grouping) -> Self {
        self.groups.push(grouping);
        self
    }

    /// Register the tasks of a component
    #[must_use]
    pub fn with_processing(mut self, service: &str, component: ProcessingComponent) -> Self {
        self.processing
            .entry(service.to_string())
            .or_default()
            .insert(component.name.clone(), component);
        self
    }

    /// Groupings applicable to `direction`, in execution order
    ///
    /// A downgrade runs the groupings in reverse.
    #[must_use]
    pub fn groups(&self, direction: Direction) -> Vec<&Grouping> {
        let applicable = self
            .groups
            .iter()
            .filter(|g| g.direction.map_or(true, |d| d == direction));
        if direction.is_downgrade() {
            applicable.rev().collect()
        } else {
            applicable.collect()
        }
    }

    /// Tasks of a component
    #[must_use]
    pub fn processing_for(&self, service: &str, component: &str) -> Option<&ProcessingComponent> {
        self.processing.get(service)?.get(component)
    }

    /// Whether any component of the service has processing
    #[must_use]
    pub fn has_processing_for_service(&self, service: &str) -> bool {
        self.processing.contains_key(service)
    }
}

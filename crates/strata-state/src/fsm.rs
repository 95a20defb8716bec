//! Host-component lifecycle state machine
//!
//! Two transition tables: one for daemon components (masters and slaves, which
//! run a process) and one for client components (which are only ever
//! installed). A `(state, event)` pair missing from the table is rejected.

use crate::event::SchEvent;
use crate::state::State;

/// Which transition table applies to a host-component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateMachineKind {
    /// Long-running process (master or slave)
    Daemon,
    /// Client libraries and configs only
    Client,
}

/// Side effect attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionAction {
    /// A command was issued: stamp the operation start time
    OpStarted,
    /// The running command reported progress
    OpInProgress,
    /// The command finished (either way): stamp the end time
    OpCompleted,
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Next state
    pub to: State,
    /// Side effect to apply
    pub action: TransitionAction,
}

impl Transition {
    const fn new(to: State, action: TransitionAction) -> Self {
        Self { to, action }
    }
}

/// Look up the transition for `event` in `from`
///
/// Returns `None` when the event is not valid in that state.
#[must_use]
pub fn next_state(kind: StateMachineKind, from: State, event: SchEvent) -> Option<Transition> {
    shared_transition(from, event).or_else(|| match kind {
        StateMachineKind::Daemon => daemon_transition(from, event),
        StateMachineKind::Client => None,
    })
}

/// Events accepted in `from`
#[must_use]
pub fn allowed_events(kind: StateMachineKind, from: State) -> Vec<SchEvent> {
    SchEvent::ALL
        .into_iter()
        .filter(|event| next_state(kind, from, *event).is_some())
        .collect()
}

/// Rows common to daemons and clients
fn shared_transition(from: State, event: SchEvent) -> Option<Transition> {
    use SchEvent as E;
    use State as S;
    use TransitionAction::{OpCompleted, OpInProgress, OpStarted};

    let (to, action) = match (from, event) {
        (S::Init, E::Install) => (S::Installing, OpStarted),

        (S::Installing, E::OpSucceeded) => (S::Installed, OpCompleted),
        (S::Installing, E::OpInProgress) => (S::Installing, OpInProgress),
        (S::Installing, E::Install) => (S::Installing, OpStarted),
        (S::Installing, E::OpFailed) => (S::InstallFailed, OpCompleted),

        (S::InstallFailed, E::OpRestart | E::Install) => (S::Installing, OpStarted),
        (S::InstallFailed, E::OpFailed) => (S::InstallFailed, OpCompleted),
        (S::InstallFailed, E::OpInProgress) => (S::InstallFailed, OpInProgress),
        (S::InstallFailed, E::Disable) => (S::Maintenance, OpCompleted),

        (S::Installed, E::Uninstall) => (S::Uninstalling, OpStarted),
        (S::Installed, E::Install) => (S::Installing, OpStarted),
        (S::Installed, E::Upgrade) => (S::Upgrading, OpStarted),
        (S::Installed, E::OpInProgress) => (S::Installed, OpInProgress),
        (S::Installed, E::OpSucceeded) => (S::Installed, OpCompleted),
        (S::Installed, E::Disable) => (S::Maintenance, OpCompleted),

        (S::Uninstalling, E::OpInProgress) => (S::Uninstalling, OpInProgress),
        (S::Uninstalling, E::OpSucceeded) => (S::Uninstalled, OpCompleted),
        (S::Uninstalling, E::OpFailed) => (S::Uninstalling, OpCompleted),
        (S::Uninstalling, E::OpRestart | E::Uninstall) => (S::Uninstalling, OpStarted),

        (S::Uninstalled, E::Install) => (S::Installing, OpStarted),
        (S::Uninstalled, E::Wipeout) => (S::WipingOut, OpStarted),

        (S::WipingOut, E::OpInProgress) => (S::WipingOut, OpInProgress),
        (S::WipingOut, E::OpSucceeded) => (S::Init, OpCompleted),
        (S::WipingOut, E::OpFailed) => (S::WipingOut, OpCompleted),
        (S::WipingOut, E::OpRestart | E::Wipeout) => (S::WipingOut, OpStarted),

        (S::Upgrading, E::OpInProgress) => (S::Upgrading, OpInProgress),
        (S::Upgrading, E::OpSucceeded) => (S::Installed, OpCompleted),
        (S::Upgrading, E::OpFailed) => (S::Upgrading, OpCompleted),
        (S::Upgrading, E::Upgrade) => (S::Upgrading, OpStarted),

        (S::Maintenance, E::Disable) => (S::Maintenance, OpCompleted),
        (S::Maintenance, E::Restore) => (S::Installed, OpCompleted),

        (S::Unknown, E::Disable) => (S::Maintenance, OpCompleted),
        (S::Unknown, E::OpInProgress) => (S::Unknown, OpInProgress),

        _ => return None,
    };
    Some(Transition::new(to, action))
}

/// Rows that only make sense for a component with a running process
fn daemon_transition(from: State, event: SchEvent) -> Option<Transition> {
    use SchEvent as E;
    use State as S;
    use TransitionAction::{OpCompleted, OpInProgress, OpStarted};

    let (to, action) = match (from, event) {
        (S::Installed, E::Start | E::OpRestart) => (S::Starting, OpStarted),
        (S::Installed, E::Stop) => (S::Stopping, OpStarted),
        (S::Installed, E::Started) => (S::Started, OpCompleted),
        (S::Installed, E::Stopped) => (S::Installed, OpCompleted),

        (S::Starting, E::OpInProgress) => (S::Starting, OpInProgress),
        (S::Starting, E::Start) => (S::Starting, OpStarted),
        (S::Starting, E::Started | E::OpSucceeded) => (S::Started, OpCompleted),
        (S::Starting, E::OpFailed) => (S::Installed, OpCompleted),

        (S::Started, E::Started) => (S::Started, OpCompleted),
        (S::Started, E::Stop | E::OpRestart) => (S::Stopping, OpStarted),
        (S::Started, E::OpInProgress) => (S::Started, OpInProgress),
        (S::Started, E::Stopped) => (S::Installed, OpCompleted),

        (S::Stopping, E::OpInProgress) => (S::Stopping, OpInProgress),
        (S::Stopping, E::Stopped | E::OpSucceeded) => (S::Installed, OpCompleted),
        (S::Stopping, E::OpFailed) => (S::Started, OpCompleted),

        _ => return None,
    };
    Some(Transition::new(to, action))
}

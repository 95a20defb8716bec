//! Lifecycle states and the predicates that classify them
//!
//! The predicates here are the only place that decides whether a state is a
//! valid desired state, an in-progress state, removable, or reachable by a
//! client-only component. Everything else asks these functions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a service, component or host-component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Initial state, nothing on disk
    #[default]
    Init,
    /// Install command in flight
    Installing,
    /// Last install attempt failed
    InstallFailed,
    /// Bits on disk, process not running
    Installed,
    /// Start command in flight
    Starting,
    /// Process running
    Started,
    /// Stop command in flight
    Stopping,
    /// Uninstall command in flight
    Uninstalling,
    /// Bits removed
    Uninstalled,
    /// Wipeout command in flight
    WipingOut,
    /// Upgrade command in flight
    Upgrading,
    /// Administratively disabled
    Maintenance,
    /// Agent has not reported
    Unknown,
}

impl State {
    /// Every state, in declaration order
    pub const ALL: [State; 13] = [
        State::Init,
        State::Installing,
        State::InstallFailed,
        State::Installed,
        State::Starting,
        State::Started,
        State::Stopping,
        State::Uninstalling,
        State::Uninstalled,
        State::WipingOut,
        State::Upgrading,
        State::Maintenance,
        State::Unknown,
    ];

    /// States an operator may request as a target
    #[inline]
    #[must_use]
    pub const fn is_valid_desired_state(self) -> bool {
        matches!(
            self,
            State::Init | State::Installed | State::Started | State::Uninstalled | State::Maintenance
        )
    }

    /// States that mean a command is running against the entity
    #[inline]
    #[must_use]
    pub const fn is_in_progress_state(self) -> bool {
        matches!(
            self,
            State::Installing
                | State::Starting
                | State::Stopping
                | State::Uninstalling
                | State::WipingOut
                | State::Upgrading
        )
    }

    /// States in which a host-component may be deleted
    #[inline]
    #[must_use]
    pub const fn is_removable_state(self) -> bool {
        matches!(
            self,
            State::Init
                | State::Installing
                | State::Installed
                | State::InstallFailed
                | State::Uninstalled
                | State::Unknown
                | State::Maintenance
        )
    }

    /// States a client-only component can be in (clients never run)
    #[inline]
    #[must_use]
    pub const fn is_valid_client_component_state(self) -> bool {
        !matches!(self, State::Starting | State::Started | State::Stopping)
    }

    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            State::Init => "INIT",
            State::Installing => "INSTALLING",
            State::InstallFailed => "INSTALL_FAILED",
            State::Installed => "INSTALLED",
            State::Starting => "STARTING",
            State::Started => "STARTED",
            State::Stopping => "STOPPING",
            State::Uninstalling => "UNINSTALLING",
            State::Uninstalled => "UNINSTALLED",
            State::WipingOut => "WIPING_OUT",
            State::Upgrading => "UPGRADING",
            State::Maintenance => "MAINTENANCE",
            State::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maintenance flag of a service, host-component or host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceState {
    /// Normal operation
    #[default]
    Off,
    /// Explicitly placed in maintenance
    On,
    /// In maintenance because the owning service is
    ImpliedFromService,
    /// In maintenance because the host is
    ImpliedFromHost,
}

impl MaintenanceState {
    /// Whether any form of maintenance applies
    #[inline]
    #[must_use]
    pub const fn is_on(self) -> bool {
        !matches!(self, MaintenanceState::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_and_in_progress_are_disjoint() {
        for state in State::ALL {
            assert!(
                !(state.is_valid_desired_state() && state.is_in_progress_state()),
                "{state} is both desired and in progress"
            );
        }
    }

    #[test]
    fn client_states_exclude_running_states() {
        assert!(!State::Started.is_valid_client_component_state());
        assert!(!State::Starting.is_valid_client_component_state());
        assert!(!State::Stopping.is_valid_client_component_state());
        assert!(State::Installed.is_valid_client_component_state());
        assert!(State::Upgrading.is_valid_client_component_state());
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&State::InstallFailed).unwrap();
        assert_eq!(json, "\"INSTALL_FAILED\"");
        assert_eq!(State::WipingOut.to_string(), "WIPING_OUT");
    }
}

//! Events that drive the host-component state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event applied to a [`ServiceComponentHost`](crate::ServiceComponentHost)
///
/// The first group are operator commands, the `Op*` group are command
/// progress reports, and `Started`/`Stopped` are agent status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchEvent {
    /// Install the component
    Install,
    /// Start the component
    Start,
    /// Stop the component
    Stop,
    /// Uninstall the component
    Uninstall,
    /// Remove all traces of the component
    Wipeout,
    /// Upgrade the component in place
    Upgrade,
    /// Running command reported progress
    OpInProgress,
    /// Running command finished successfully
    OpSucceeded,
    /// Running command failed
    OpFailed,
    /// Running command restarted
    OpRestart,
    /// Agent reported the process running
    Started,
    /// Agent reported the process stopped
    Stopped,
    /// Put the component in maintenance
    Disable,
    /// Take the component out of maintenance
    Restore,
}

impl SchEvent {
    /// Every event, in declaration order
    pub const ALL: [SchEvent; 14] = [
        SchEvent::Install,
        SchEvent::Start,
        SchEvent::Stop,
        SchEvent::Uninstall,
        SchEvent::Wipeout,
        SchEvent::Upgrade,
        SchEvent::OpInProgress,
        SchEvent::OpSucceeded,
        SchEvent::OpFailed,
        SchEvent::OpRestart,
        SchEvent::Started,
        SchEvent::Stopped,
        SchEvent::Disable,
        SchEvent::Restore,
    ];

    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SchEvent::Install => "HOST_SVCCOMP_INSTALL",
            SchEvent::Start => "HOST_SVCCOMP_START",
            SchEvent::Stop => "HOST_SVCCOMP_STOP",
            SchEvent::Uninstall => "HOST_SVCCOMP_UNINSTALL",
            SchEvent::Wipeout => "HOST_SVCCOMP_WIPEOUT",
            SchEvent::Upgrade => "HOST_SVCCOMP_UPGRADE",
            SchEvent::OpInProgress => "HOST_SVCCOMP_OP_IN_PROGRESS",
            SchEvent::OpSucceeded => "HOST_SVCCOMP_OP_SUCCEEDED",
            SchEvent::OpFailed => "HOST_SVCCOMP_OP_FAILED",
            SchEvent::OpRestart => "HOST_SVCCOMP_OP_RESTART",
            SchEvent::Started => "HOST_SVCCOMP_STARTED",
            SchEvent::Stopped => "HOST_SVCCOMP_STOPPED",
            SchEvent::Disable => "HOST_SVCCOMP_DISABLE",
            SchEvent::Restore => "HOST_SVCCOMP_RESTORE",
        }
    }
}

impl fmt::Display for SchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Repository-version ledger
//!
//! Tracks the install/upgrade state of each repository version for a cluster
//! or a host. At most one version is `CURRENT`; promoting another version to
//! `CURRENT` demotes the previous one to `INSTALLED` in the same call.

use crate::error::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// State of one repository version on a cluster or host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryVersionState {
    /// Bits are being distributed
    Installing,
    /// Bits installed, not in use
    Installed,
    /// Distribution failed
    InstallFailed,
    /// Some hosts are missing the bits
    OutOfSync,
    /// Components are moving to this version
    Upgrading,
    /// All components run this version, not yet finalized
    Upgraded,
    /// Moving to this version failed
    UpgradeFailed,
    /// The version the cluster or host runs
    Current,
}

impl RepositoryVersionState {
    /// Whether `self → to` is a legal ledger move
    #[must_use]
    pub const fn can_transition_to(self, to: RepositoryVersionState) -> bool {
        use RepositoryVersionState as S;
        matches!(
            (self, to),
            (S::Installing, S::Installed | S::InstallFailed | S::OutOfSync)
                | (S::InstallFailed | S::OutOfSync, S::Installing)
                | (S::Installed, S::Installing | S::Upgrading | S::OutOfSync)
                | (S::Upgrading, S::Upgraded | S::UpgradeFailed)
                | (S::UpgradeFailed, S::Upgrading)
                | (S::Upgraded, S::Current)
        )
    }
}

impl fmt::Display for RepositoryVersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepositoryVersionState::Installing => "INSTALLING",
            RepositoryVersionState::Installed => "INSTALLED",
            RepositoryVersionState::InstallFailed => "INSTALL_FAILED",
            RepositoryVersionState::OutOfSync => "OUT_OF_SYNC",
            RepositoryVersionState::Upgrading => "UPGRADING",
            RepositoryVersionState::Upgraded => "UPGRADED",
            RepositoryVersionState::UpgradeFailed => "UPGRADE_FAILED",
            RepositoryVersionState::Current => "CURRENT",
        };
        f.write_str(name)
    }
}

/// Version string → state, with a single `CURRENT` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedger {
    entries: BTreeMap<String, RepositoryVersionState>,
}

impl VersionLedger {
    /// Create empty ledger
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version for the first time
    ///
    /// `CURRENT` is accepted only while no other version is current (bootstrap).
    ///
    /// # Errors
    /// `InvalidVersionTransition` if the version is already known or a second
    /// `CURRENT` would be created.
    pub fn register(&mut self, version: &str, state: RepositoryVersionState) -> StateResult<()> {
        if let Some(existing) = self.entries.get(version) {
            return Err(StateError::InvalidVersionTransition {
                version: version.to_string(),
                from: Some(*existing),
                to: state,
            });
        }
        if state == RepositoryVersionState::Current && self.current().is_some() {
            return Err(StateError::InvalidVersionTransition {
                version: version.to_string(),
                from: None,
                to: state,
            });
        }
        self.entries.insert(version.to_string(), state);
        Ok(())
    }

    /// Move a known version to `to`
    ///
    /// # Errors
    /// `VersionNotFound` for an unknown version, `InvalidVersionTransition`
    /// for a move the ledger does not allow.
    pub fn transition(&mut self, version: &str, to: RepositoryVersionState) -> StateResult<()> {
        let from = self
            .state(version)
            .ok_or_else(|| StateError::VersionNotFound(version.to_string()))?;
        if !from.can_transition_to(to) {
            return Err(StateError::InvalidVersionTransition {
                version: version.to_string(),
                from: Some(from),
                to,
            });
        }
        if to == RepositoryVersionState::Current {
            for state in self.entries.values_mut() {
                if *state == RepositoryVersionState::Current {
                    *state = RepositoryVersionState::Installed;
                }
            }
        }
        self.entries.insert(version.to_string(), to);
        Ok(())
    }

    /// State of a version
    #[inline]
    #[must_use]
    pub fn state(&self, version: &str) -> Option<RepositoryVersionState> {
        self.entries.get(version).copied()
    }

    /// The `CURRENT` version, if any
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, state)| **state == RepositoryVersionState::Current)
            .map(|(version, _)| version.as_str())
    }

    /// All versions with their state
    pub fn iter(&self) -> impl Iterator<Item = (&str, RepositoryVersionState)> {
        self.entries.iter().map(|(v, s)| (v.as_str(), *s))
    }

    /// Number of known versions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

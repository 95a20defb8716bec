//! Stack identifiers and repository versions

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stack, written `NAME-VERSION` (e.g. `HDP-2.2`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackId {
    name: String,
    version: String,
}

impl StackId {
    /// Create from parts
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Stack name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stack version
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl FromStr for StackId {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(StateError::InvalidStackId(s.to_string())),
        }
    }
}

impl TryFrom<String> for StackId {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StackId> for String {
    fn from(value: StackId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A concrete build of a stack that can be installed and upgraded to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryVersion {
    /// Repository id
    pub id: u64,
    /// Stack this build belongs to
    pub stack_id: StackId,
    /// Full build version (e.g. `2.2.0.0-2041`)
    pub version: String,
    /// Human readable name
    pub display_name: String,
}

impl RepositoryVersion {
    /// Create a repository version; display name defaults to `NAME-VERSION`
    #[must_use]
    pub fn new(id: u64, stack_id: StackId, version: impl Into<String>) -> Self {
        let version = version.into();
        let display_name = format!("{}-{}", stack_id.name(), version);
        Self {
            id,
            stack_id,
            version,
            display_name,
        }
    }

    /// Override the display name
    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stack_id() {
        let id: StackId = "HDP-2.2".parse().unwrap();
        assert_eq!(id.name(), "HDP");
        assert_eq!(id.version(), "2.2");
        assert_eq!(id.to_string(), "HDP-2.2");
    }

    #[test]
    fn parse_keeps_dashes_in_version() {
        let id: StackId = "HDP-2.2-beta".parse().unwrap();
        assert_eq!(id.version(), "2.2-beta");
    }

    #[test]
    fn reject_malformed_stack_id() {
        assert!("HDP".parse::<StackId>().is_err());
        assert!("-2.2".parse::<StackId>().is_err());
    }

    #[test]
    fn stack_id_serializes_as_string() {
        let id = StackId::new("HDP", "2.3");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"HDP-2.3\"");
        let back: StackId = serde_json::from_str("\"HDP-2.3\"").unwrap();
        assert_eq!(back, id);
    }
}

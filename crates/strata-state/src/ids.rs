//! Stable arena identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Process-wide cluster identifier
    ClusterId,
    "cluster"
);
entity_id!(
    /// Service identifier, unique within a cluster
    ServiceId,
    "service"
);
entity_id!(
    /// Component identifier, unique within a cluster
    ComponentId,
    "component"
);
entity_id!(
    /// Host-component identifier, unique within a cluster
    SchId,
    "sch"
);
entity_id!(
    /// Config group identifier, unique within a cluster
    ConfigGroupId,
    "group"
);

//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every persisted entity has a strongly-typed ID so a town id can never be
//! passed where a movement id is expected. IDs use UUID v7, which sorts by
//! creation time; the scheduler relies on the total order of the inner
//! [`Uuid`] to break ties between items completing at the same instant.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a town.
    TownId
}

define_id! {
    /// Unique identifier for the player owning a town.
    PlayerId
}

define_id! {
    /// Unique identifier for a building or unit queue row.
    QueueItemId
}

define_id! {
    /// Unique identifier for a troop movement.
    MovementId
}

define_id! {
    /// Unique identifier for a battle report.
    ReportId
}

//! Shared type definitions for the Stronghold world core.
//!
//! Every crate in the workspace speaks in these types: towns, the two
//! completion queues, troop movements, and battle reports. Types that leave
//! the core through notifications also derive `ts-rs` bindings so socket
//! clients can consume them.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Resources, combat buckets, movement types, outcomes
//! - [`structs`] -- Towns, queue rows, movements, reports

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BattleOutcome, CombatBucket, EventTag, MovementType, Resource};
pub use ids::{MovementId, PlayerId, QueueItemId, ReportId, TownId};
pub use structs::{
    BuildingQueueItem, BuildingState, Location, Movement, Report, ReportSide, ResourceAmounts,
    Town, UnitCounts, UnitQueueItem,
};

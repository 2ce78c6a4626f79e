//! The scheduler's view of a pending completion.
//!
//! Building rows, unit rows, and movements all collapse into one
//! [`ScheduledItem`] carrying just enough to order it and to find the town
//! that owns it.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use stronghold_types::{BuildingQueueItem, Movement, MovementType, TownId, UnitQueueItem};
use uuid::Uuid;

/// What kind of row a scheduled item stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A building level-up.
    Building {
        /// Town the building belongs to.
        town_id: TownId,
    },
    /// A unit recruitment batch.
    Unit {
        /// Town recruiting the units.
        town_id: TownId,
    },
    /// A troop movement.
    Movement {
        /// What happens on arrival.
        movement_type: MovementType,
        /// Departure town.
        origin_town_id: TownId,
        /// Arrival town.
        destination_town_id: TownId,
    },
}

/// One pending completion in the global schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledItem {
    /// Row id (queue item id or movement id).
    pub id: Uuid,
    /// Completion instant.
    pub ends_at: DateTime<Utc>,
    /// Row kind and owning towns.
    pub kind: ItemKind,
}

impl ScheduledItem {
    /// Town whose queues are processed when this item fires: the queue's
    /// town, or the movement's destination.
    pub const fn owning_town(&self) -> TownId {
        match self.kind {
            ItemKind::Building { town_id } | ItemKind::Unit { town_id } => town_id,
            ItemKind::Movement {
                destination_town_id,
                ..
            } => destination_town_id,
        }
    }

    /// Total order key: completion instant, then id.
    pub const fn key(&self) -> (DateTime<Utc>, Uuid) {
        (self.ends_at, self.id)
    }

    /// Compare by [`key`](Self::key).
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl From<&BuildingQueueItem> for ScheduledItem {
    fn from(row: &BuildingQueueItem) -> Self {
        Self {
            id: row.id.into_inner(),
            ends_at: row.ends_at,
            kind: ItemKind::Building {
                town_id: row.town_id,
            },
        }
    }
}

impl From<&UnitQueueItem> for ScheduledItem {
    fn from(row: &UnitQueueItem) -> Self {
        Self {
            id: row.id.into_inner(),
            ends_at: row.ends_at,
            kind: ItemKind::Unit {
                town_id: row.town_id,
            },
        }
    }
}

impl From<&Movement> for ScheduledItem {
    fn from(movement: &Movement) -> Self {
        Self {
            id: movement.id.into_inner(),
            ends_at: movement.ends_at,
            kind: ItemKind::Movement {
                movement_type: movement.movement_type,
                origin_town_id: movement.origin_town_id,
                destination_town_id: movement.destination_town_id,
            },
        }
    }
}

//! Core entity structs: towns, queue rows, movements, and reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{BattleOutcome, MovementType, Resource};
use crate::ids::{MovementId, PlayerId, QueueItemId, ReportId, TownId};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// An amount of each stockpiled resource.
///
/// Used for stored resources, cached hourly production, and haul.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceAmounts {
    /// Wood.
    #[ts(as = "String")]
    pub wood: Decimal,
    /// Clay.
    #[ts(as = "String")]
    pub clay: Decimal,
    /// Iron.
    #[ts(as = "String")]
    pub iron: Decimal,
}

impl ResourceAmounts {
    /// All three resources at zero.
    pub const ZERO: Self = Self {
        wood: Decimal::ZERO,
        clay: Decimal::ZERO,
        iron: Decimal::ZERO,
    };

    /// Build an amount from the three components.
    pub const fn new(wood: Decimal, clay: Decimal, iron: Decimal) -> Self {
        Self { wood, clay, iron }
    }

    /// Return the amount of a single resource.
    pub const fn get(&self, resource: Resource) -> Decimal {
        match resource {
            Resource::Wood => self.wood,
            Resource::Clay => self.clay,
            Resource::Iron => self.iron,
        }
    }

    /// Overwrite the amount of a single resource.
    pub const fn set(&mut self, resource: Resource, amount: Decimal) {
        match resource {
            Resource::Wood => self.wood = amount,
            Resource::Clay => self.clay = amount,
            Resource::Iron => self.iron = amount,
        }
    }

    /// Sum of all three resources, or `None` on overflow.
    pub fn checked_total(&self) -> Option<Decimal> {
        self.wood.checked_add(self.clay)?.checked_add(self.iron)
    }

    /// Whether every component is zero.
    pub fn is_zero(&self) -> bool {
        Resource::ALL.iter().all(|r| self.get(*r).is_zero())
    }
}

// ---------------------------------------------------------------------------
// Town
// ---------------------------------------------------------------------------

/// Map coordinates of a town. Unique per world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Location {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

/// Level of one building in a town.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BuildingState {
    /// Completed level.
    pub level: u32,
    /// Highest level currently queued, or 0 when nothing is queued.
    pub queued: u32,
}

/// Unit counts of one unit type in a town.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnitCounts {
    /// Units stationed at home, available for defense.
    pub inside: u32,
    /// Units away on a movement.
    pub outside: u32,
    /// Units queued for recruitment.
    pub queued: u32,
}

/// A player- or nobody-owned settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Town {
    /// Unique town identifier.
    pub id: TownId,
    /// Owning player, `None` for abandoned or barbarian towns.
    pub player_id: Option<PlayerId>,
    /// Display name.
    pub name: String,
    /// Map position.
    pub location: Location,
    /// Loyalty towards the current owner.
    pub loyalty: u32,
    /// Stored resources, each within `0..=storage capacity`.
    pub resources: ResourceAmounts,
    /// Cached hourly production, derived from building levels.
    pub production: ResourceAmounts,
    /// Building levels keyed by catalog name.
    pub buildings: BTreeMap<String, BuildingState>,
    /// Unit counts keyed by catalog name.
    pub units: BTreeMap<String, UnitCounts>,
    /// Instant up to which production has been accrued into `resources`.
    pub resources_updated_at: DateTime<Utc>,
}

impl Town {
    /// Completed level of a building, 0 when the town has none.
    pub fn building_level(&self, name: &str) -> u32 {
        self.buildings.get(name).map_or(0, |b| b.level)
    }

    /// Counts for a unit type, all zero when the town has none.
    pub fn unit_counts(&self, name: &str) -> UnitCounts {
        self.units.get(name).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// One pending building level-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BuildingQueueItem {
    /// Row identifier.
    pub id: QueueItemId,
    /// Town the building belongs to.
    pub town_id: TownId,
    /// Catalog name of the building.
    pub name: String,
    /// Level reached on completion.
    pub level: u32,
    /// Build duration in seconds.
    pub build_time_secs: u64,
    /// Completion instant.
    pub ends_at: DateTime<Utc>,
}

/// One pending unit recruitment batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnitQueueItem {
    /// Row identifier.
    pub id: QueueItemId,
    /// Town recruiting the units.
    pub town_id: TownId,
    /// Catalog name of the unit.
    pub name: String,
    /// Number of units in the batch.
    pub amount: u32,
    /// Recruitment duration in seconds.
    pub recruit_time_secs: u64,
    /// Completion instant.
    pub ends_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Movements and reports
// ---------------------------------------------------------------------------

/// A group of units travelling between two towns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Movement {
    /// Movement identifier.
    pub id: MovementId,
    /// What happens on arrival.
    pub movement_type: MovementType,
    /// Travelling units keyed by catalog name.
    pub units: BTreeMap<String, u32>,
    /// Resources carried.
    pub haul: ResourceAmounts,
    /// Town the movement left from.
    pub origin_town_id: TownId,
    /// Town the movement arrives at.
    pub destination_town_id: TownId,
    /// Departure instant.
    pub created_at: DateTime<Utc>,
    /// Arrival instant.
    pub ends_at: DateTime<Utc>,
}

impl Movement {
    /// Total number of travelling units.
    pub fn unit_total(&self) -> u64 {
        self.units.values().map(|c| u64::from(*c)).sum()
    }
}

/// One side of a battle report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReportSide {
    /// Units that took part, keyed by catalog name.
    pub units: BTreeMap<String, u32>,
    /// Units lost, keyed by catalog name.
    pub losses: BTreeMap<String, u32>,
}

/// Immutable record of one resolved attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Report {
    /// Report identifier.
    pub id: ReportId,
    /// Who won.
    pub outcome: BattleOutcome,
    /// Attacking town.
    pub origin_town_id: TownId,
    /// Defending town.
    pub destination_town_id: TownId,
    /// Owner of the attacking town at resolution time.
    pub origin_player_id: Option<PlayerId>,
    /// Owner of the defending town at resolution time.
    pub destination_player_id: Option<PlayerId>,
    /// Attacking side.
    pub origin: ReportSide,
    /// Defending side.
    pub destination: ReportSide,
    /// Resources taken from the defender.
    pub haul: ResourceAmounts,
    /// Resolution instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn resource_amounts_get_set() {
        let mut amounts = ResourceAmounts::ZERO;
        assert!(amounts.is_zero());
        amounts.set(Resource::Clay, Decimal::from(40));
        assert_eq!(amounts.get(Resource::Clay), Decimal::from(40));
        assert_eq!(amounts.get(Resource::Wood), Decimal::ZERO);
        assert_eq!(amounts.checked_total(), Some(Decimal::from(40)));
        assert!(!amounts.is_zero());
    }

    #[test]
    fn town_lookups_default_to_zero() {
        let town = Town {
            id: TownId::new(),
            player_id: None,
            name: String::from("Harbor"),
            location: Location { x: 3, y: -2 },
            loyalty: 100,
            resources: ResourceAmounts::ZERO,
            production: ResourceAmounts::ZERO,
            buildings: BTreeMap::new(),
            units: BTreeMap::new(),
            resources_updated_at: Utc::now(),
        };
        assert_eq!(town.building_level("wall"), 0);
        assert_eq!(town.unit_counts("spear"), UnitCounts::default());
    }
}

//! Fixtures shared by the unit tests of this crate.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use stronghold_types::{
    BuildingQueueItem, BuildingState, Location, Movement, MovementId, MovementType, QueueItemId,
    ResourceAmounts, Town, TownId, UnitCounts, UnitQueueItem,
};
use stronghold_world::{SharedCatalog, WorldCatalog};

pub(crate) const CATALOG: &str = r#"
base_production: 30
base_storage_capacity: 1000
buildings:
  timber_camp:
    levels:
      - { build_time_secs: 60, production: 10 }
      - { build_time_secs: 120, production: 20 }
      - { build_time_secs: 240, production: 40 }
  clay_pit:
    levels:
      - { build_time_secs: 60, production: 10 }
  iron_mine:
    levels:
      - { build_time_secs: 60, production: 10 }
  warehouse:
    levels:
      - { build_time_secs: 60, capacity: 1500 }
      - { build_time_secs: 120, capacity: 2000 }
  wall:
    levels:
      - { build_time_secs: 60, defense_bonus: "1.2" }
      - { build_time_secs: 120, defense_bonus: "1.5" }
units:
  spear:
    attack: 10
    attack_type: general
    defense: { general: 15, cavalry: 45, archer: 20 }
    haul: 25
  axe:
    attack: 40
    attack_type: general
    defense: { general: 10, cavalry: 5, archer: 10 }
    haul: 10
  light:
    attack: 130
    attack_type: cavalry
    defense: { general: 30, cavalry: 40, archer: 30 }
    haul: 80
"#;

pub(crate) fn catalog() -> Arc<SharedCatalog> {
    Arc::new(SharedCatalog::new(WorldCatalog::parse(CATALOG).unwrap()))
}

pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// An empty town with base production, last accrued at [`epoch`].
pub(crate) fn town(name: &str) -> Town {
    Town {
        id: TownId::new(),
        player_id: None,
        name: name.to_owned(),
        location: Location { x: 0, y: 0 },
        loyalty: 100,
        resources: ResourceAmounts::ZERO,
        production: ResourceAmounts::new(dec!(30), dec!(30), dec!(30)),
        buildings: BTreeMap::new(),
        units: BTreeMap::new(),
        resources_updated_at: epoch(),
    }
}

/// Add `(name, level, queued)` buildings.
pub(crate) fn with_buildings(mut town: Town, buildings: &[(&str, u32, u32)]) -> Town {
    for (name, level, queued) in buildings {
        town.buildings.insert(
            (*name).to_owned(),
            BuildingState {
                level: *level,
                queued: *queued,
            },
        );
    }
    town
}

/// Add `(name, inside, outside, queued)` units.
pub(crate) fn with_units(mut town: Town, units: &[(&str, u32, u32, u32)]) -> Town {
    for (name, inside, outside, queued) in units {
        town.units.insert(
            (*name).to_owned(),
            UnitCounts {
                inside: *inside,
                outside: *outside,
                queued: *queued,
            },
        );
    }
    town
}

pub(crate) fn building_row(
    town: &Town,
    name: &str,
    level: u32,
    ends_at: DateTime<Utc>,
) -> BuildingQueueItem {
    BuildingQueueItem {
        id: QueueItemId::new(),
        town_id: town.id,
        name: name.to_owned(),
        level,
        build_time_secs: 60,
        ends_at,
    }
}

pub(crate) fn unit_row(town: &Town, name: &str, amount: u32, ends_at: DateTime<Utc>) -> UnitQueueItem {
    UnitQueueItem {
        id: QueueItemId::new(),
        town_id: town.id,
        name: name.to_owned(),
        amount,
        recruit_time_secs: 30,
        ends_at,
    }
}

pub(crate) fn movement(
    movement_type: MovementType,
    units: &[(&str, u32)],
    origin: &Town,
    destination: &Town,
    created_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Movement {
    Movement {
        id: MovementId::new(),
        movement_type,
        units: units
            .iter()
            .map(|(name, count)| ((*name).to_owned(), *count))
            .collect(),
        haul: ResourceAmounts::ZERO,
        origin_town_id: origin.id,
        destination_town_id: destination.id,
        created_at,
        ends_at,
    }
}

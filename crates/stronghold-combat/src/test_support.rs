//! Fixtures shared by the unit tests of this crate.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use stronghold_types::{BuildingState, Location, ResourceAmounts, Town, TownId, UnitCounts};
use stronghold_world::WorldCatalog;

const CATALOG: &str = r#"
base_production: 30
base_storage_capacity: 1000
buildings:
  timber_camp:
    levels:
      - { build_time_secs: 10, production: 10 }
  clay_pit:
    levels:
      - { build_time_secs: 10, production: 10 }
  iron_mine:
    levels:
      - { build_time_secs: 10, production: 10 }
  warehouse:
    levels:
      - { build_time_secs: 10, capacity: 1500 }
  wall:
    levels:
      - { build_time_secs: 10, defense_bonus: "1.5" }
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
  guard:
    attack: 0
    attack_type: general
    defense: { general: 20 }
"#;

pub(crate) fn test_catalog() -> WorldCatalog {
    WorldCatalog::parse(CATALOG).unwrap()
}

/// Unit map from `(name, count)` pairs.
pub(crate) fn army(units: &[(&str, u32)]) -> BTreeMap<String, u32> {
    units
        .iter()
        .map(|(name, count)| ((*name).to_owned(), *count))
        .collect()
}

/// Town with `(name, inside, outside)` units and `(name, level)` buildings.
pub(crate) fn town_with(units: &[(&str, u32, u32)], buildings: &[(&str, u32)]) -> Town {
    Town {
        id: TownId::new(),
        player_id: None,
        name: String::from("Ashford"),
        location: Location { x: 3, y: 4 },
        loyalty: 100,
        resources: ResourceAmounts::ZERO,
        production: ResourceAmounts::ZERO,
        buildings: buildings
            .iter()
            .map(|(name, level)| {
                (
                    (*name).to_owned(),
                    BuildingState {
                        level: *level,
                        queued: 0,
                    },
                )
            })
            .collect(),
        units: units
            .iter()
            .map(|(name, inside, outside)| {
                (
                    (*name).to_owned(),
                    UnitCounts {
                        inside: *inside,
                        outside: *outside,
                        queued: 0,
                    },
                )
            })
            .collect(),
        resources_updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    }
}

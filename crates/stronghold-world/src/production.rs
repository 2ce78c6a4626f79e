//! Resource production and accrual for towns.
//!
//! A town produces `base_production + building bonus` of each resource per
//! hour. Production is never stepped per tick; it is accrued lazily whenever
//! the town is about to be mutated, from `resources_updated_at` up to the
//! current instant. Accrual clamps every stock to the storage building's
//! capacity, so a stock already above the cap is brought back down to it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stronghold_types::{Resource, ResourceAmounts, Town};

use crate::catalog::WorldCatalog;
use crate::error::WorldError;

/// Milliseconds in one hour.
const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Hourly production of a town computed from its building levels.
///
/// # Errors
///
/// Returns [`WorldError`] if a production building level is not in the
/// catalog, or on arithmetic overflow.
pub fn hourly_production(town: &Town, catalog: &WorldCatalog) -> Result<ResourceAmounts, WorldError> {
    let mut production = ResourceAmounts::ZERO;
    for resource in Resource::ALL {
        let building = catalog.production_buildings.get(resource);
        let bonus = catalog
            .building_level(building, town.building_level(building))?
            .map_or(Decimal::ZERO, |level| level.production);
        let total = catalog
            .base_production
            .checked_add(bonus)
            .ok_or(WorldError::ArithmeticOverflow)?;
        production.set(resource, total);
    }
    Ok(production)
}

/// Recompute and cache a town's hourly production.
///
/// # Errors
///
/// See [`hourly_production`].
pub fn refresh_production(town: &mut Town, catalog: &WorldCatalog) -> Result<(), WorldError> {
    town.production = hourly_production(town, catalog)?;
    Ok(())
}

/// Storage capacity per resource, from the storage building's level.
///
/// # Errors
///
/// Returns [`WorldError`] if the storage level is not in the catalog.
pub fn storage_capacity(town: &Town, catalog: &WorldCatalog) -> Result<Decimal, WorldError> {
    let building = catalog.storage_building.as_str();
    let capacity = catalog
        .building_level(building, town.building_level(building))?
        .and_then(|level| level.capacity)
        .unwrap_or(catalog.base_storage_capacity);
    Ok(capacity)
}

/// Defense multiplier from the wall's level. Always at least 1.
///
/// # Errors
///
/// Returns [`WorldError`] if the wall level is not in the catalog.
pub fn wall_bonus(town: &Town, catalog: &WorldCatalog) -> Result<Decimal, WorldError> {
    let building = catalog.wall_building.as_str();
    let bonus = catalog
        .building_level(building, town.building_level(building))?
        .and_then(|level| level.defense_bonus)
        .unwrap_or(Decimal::ONE);
    Ok(bonus.max(Decimal::ONE))
}

/// Accrue production earned between `previous` and `now` into `resources`.
///
/// Each resource becomes `min(capacity, resource + production * hours)`.
/// A `now` at or before `previous` changes nothing.
///
/// Returns the change per resource, negative where a stock above
/// `capacity` was clamped.
///
/// # Errors
///
/// Returns [`WorldError::ArithmeticOverflow`] if checked arithmetic fails.
pub fn accrue_between(
    resources: &mut ResourceAmounts,
    production: &ResourceAmounts,
    capacity: Decimal,
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<ResourceAmounts, WorldError> {
    let elapsed_ms = now
        .signed_duration_since(previous)
        .num_milliseconds()
        .max(0);
    if elapsed_ms == 0 {
        return Ok(ResourceAmounts::ZERO);
    }

    let hours = Decimal::from(elapsed_ms)
        .checked_div(Decimal::from(MILLIS_PER_HOUR))
        .ok_or(WorldError::ArithmeticOverflow)?;

    let mut gained = ResourceAmounts::ZERO;
    for resource in Resource::ALL {
        let earned = production
            .get(resource)
            .checked_mul(hours)
            .ok_or(WorldError::ArithmeticOverflow)?;
        let current = resources.get(resource);
        let target = current
            .checked_add(earned)
            .ok_or(WorldError::ArithmeticOverflow)?
            .min(capacity);
        resources.set(resource, target);
        gained.set(
            resource,
            target
                .checked_sub(current)
                .ok_or(WorldError::ArithmeticOverflow)?,
        );
    }
    Ok(gained)
}

/// Accrue a town's production up to `now` and advance its timestamp.
///
/// # Errors
///
/// Returns [`WorldError`] if the storage level is not in the catalog or on
/// arithmetic overflow.
pub fn accrue(
    town: &mut Town,
    catalog: &WorldCatalog,
    now: DateTime<Utc>,
) -> Result<ResourceAmounts, WorldError> {
    let capacity = storage_capacity(town, catalog)?;
    let production = town.production;
    let gained = accrue_between(
        &mut town.resources,
        &production,
        capacity,
        town.resources_updated_at,
        now,
    )?;
    if now > town.resources_updated_at {
        town.resources_updated_at = now;
    }
    Ok(gained)
}

/// Add resources (e.g. returning haul) to a town, capped by storage.
///
/// Returns the amount actually stored per resource. A stock already at or
/// above the cap takes nothing and is not lowered.
///
/// # Errors
///
/// Returns [`WorldError`] if the storage level is not in the catalog or on
/// arithmetic overflow.
pub fn deposit(
    town: &mut Town,
    amounts: &ResourceAmounts,
    catalog: &WorldCatalog,
) -> Result<ResourceAmounts, WorldError> {
    let capacity = storage_capacity(town, catalog)?;
    let mut stored = ResourceAmounts::ZERO;
    for resource in Resource::ALL {
        let added = add_capped(&mut town.resources, resource, amounts.get(resource), capacity)?;
        stored.set(resource, added);
    }
    Ok(stored)
}

/// Add `amount` of one resource without exceeding `capacity`.
fn add_capped(
    resources: &mut ResourceAmounts,
    resource: Resource,
    amount: Decimal,
    capacity: Decimal,
) -> Result<Decimal, WorldError> {
    let current = resources.get(resource);
    if current >= capacity || amount <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let target = current
        .checked_add(amount)
        .ok_or(WorldError::ArithmeticOverflow)?
        .min(capacity);
    resources.set(resource, target);
    target
        .checked_sub(current)
        .ok_or(WorldError::ArithmeticOverflow)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use stronghold_types::{BuildingState, Location, TownId};

    use super::*;
    use crate::catalog::tests::test_catalog;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_town(buildings: &[(&str, u32)]) -> Town {
        let buildings = buildings
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
            .collect();
        Town {
            id: TownId::new(),
            player_id: None,
            name: String::from("Millbrook"),
            location: Location { x: 0, y: 0 },
            loyalty: 100,
            resources: ResourceAmounts::ZERO,
            production: ResourceAmounts::ZERO,
            buildings,
            units: BTreeMap::new(),
            resources_updated_at: epoch(),
        }
    }

    #[test]
    fn production_adds_building_bonus_to_base() {
        let catalog = test_catalog();
        let town = make_town(&[("timber_camp", 2), ("clay_pit", 1)]);
        let production = hourly_production(&town, &catalog).unwrap();
        assert_eq!(production.wood, dec!(50));
        assert_eq!(production.clay, dec!(40));
        assert_eq!(production.iron, dec!(30));
    }

    #[test]
    fn production_rejects_level_outside_catalog() {
        let catalog = test_catalog();
        let town = make_town(&[("iron_mine", 7)]);
        assert!(matches!(
            hourly_production(&town, &catalog),
            Err(WorldError::LevelOutOfRange { .. })
        ));
    }

    #[test]
    fn storage_and_wall_fall_back_to_base_values() {
        let catalog = test_catalog();
        let town = make_town(&[]);
        assert_eq!(storage_capacity(&town, &catalog).unwrap(), dec!(1000));
        assert_eq!(wall_bonus(&town, &catalog).unwrap(), Decimal::ONE);

        let town = make_town(&[("warehouse", 2), ("wall", 1)]);
        assert_eq!(storage_capacity(&town, &catalog).unwrap(), dec!(2000));
        assert_eq!(wall_bonus(&town, &catalog).unwrap(), dec!(1.5));
    }

    #[test]
    fn accrue_adds_hourly_rate() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        refresh_production(&mut town, &catalog).unwrap();
        let now = epoch() + Duration::minutes(30);
        let gained = accrue(&mut town, &catalog, now).unwrap();
        assert_eq!(gained.wood, dec!(15));
        assert_eq!(town.resources.iron, dec!(15));
        assert_eq!(town.resources_updated_at, now);
    }

    #[test]
    fn accrue_is_idempotent_without_elapsed_time() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        refresh_production(&mut town, &catalog).unwrap();
        town.resources.wood = dec!(120);
        let before = town.clone();
        let gained = accrue(&mut town, &catalog, epoch()).unwrap();
        assert!(gained.is_zero());
        assert_eq!(town, before);
    }

    #[test]
    fn accrue_ignores_time_going_backwards() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        refresh_production(&mut town, &catalog).unwrap();
        let gained = accrue(&mut town, &catalog, epoch() - Duration::hours(3)).unwrap();
        assert!(gained.is_zero());
        assert_eq!(town.resources_updated_at, epoch());
    }

    #[test]
    fn accrue_is_monotonic_in_now() {
        let catalog = test_catalog();
        let mut base = make_town(&[("timber_camp", 1)]);
        refresh_production(&mut base, &catalog).unwrap();
        let mut previous = Decimal::ZERO;
        for minutes in [0_i64, 1, 10, 90, 600, 6000] {
            let mut town = base.clone();
            let _ = accrue(&mut town, &catalog, epoch() + Duration::minutes(minutes)).unwrap();
            assert!(town.resources.wood >= previous);
            previous = town.resources.wood;
        }
    }

    #[test]
    fn accrue_clamps_to_storage_capacity() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        refresh_production(&mut town, &catalog).unwrap();
        town.resources.clay = dec!(990);
        let _ = accrue(&mut town, &catalog, epoch() + Duration::hours(10)).unwrap();
        assert_eq!(town.resources.clay, dec!(1000));
        assert_eq!(town.resources.wood, dec!(300));
    }

    #[test]
    fn accrue_pulls_stock_above_capacity_down_to_it() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        refresh_production(&mut town, &catalog).unwrap();
        town.resources.iron = dec!(1200);
        town.resources.wood = dec!(400);
        let gained = accrue(&mut town, &catalog, epoch() + Duration::hours(1)).unwrap();
        assert_eq!(town.resources.iron, dec!(1000));
        assert_eq!(gained.iron, dec!(-200));
        assert!(gained.wood > Decimal::ZERO);
        assert_eq!(town.resources_updated_at, epoch() + Duration::hours(1));
    }

    #[test]
    fn deposit_leaves_stock_above_capacity_alone() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        town.resources.clay = dec!(1200);
        let stored = deposit(&mut town, &ResourceAmounts::new(dec!(0), dec!(50), dec!(0)), &catalog)
            .unwrap();
        assert!(stored.is_zero());
        assert_eq!(town.resources.clay, dec!(1200));
    }

    #[test]
    fn deposit_reports_what_fit() {
        let catalog = test_catalog();
        let mut town = make_town(&[]);
        town.resources = ResourceAmounts::new(dec!(900), dec!(0), dec!(1000));
        let stored = deposit(
            &mut town,
            &ResourceAmounts::new(dec!(200), dec!(50), dec!(10)),
            &catalog,
        )
        .unwrap();
        assert_eq!(stored, ResourceAmounts::new(dec!(100), dec!(50), dec!(0)));
        assert_eq!(town.resources, ResourceAmounts::new(dec!(1000), dec!(50), dec!(1000)));
    }
}

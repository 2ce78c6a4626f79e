//! Haul capacity and loot split.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use stronghold_types::{Resource, ResourceAmounts};
use stronghold_world::WorldCatalog;

use crate::error::CombatError;

/// Total resources a group of units can carry.
///
/// # Errors
///
/// Returns [`CombatError`] for unknown unit names or overflow.
pub fn haul_capacity(
    units: &BTreeMap<String, u32>,
    catalog: &WorldCatalog,
) -> Result<Decimal, CombatError> {
    let mut capacity = Decimal::ZERO;
    for (name, count) in units {
        let unit = catalog.unit(name)?;
        capacity = Decimal::from(*count)
            .checked_mul(Decimal::from(unit.haul))
            .and_then(|carry| capacity.checked_add(carry))
            .ok_or_else(|| CombatError::overflow("haul capacity"))?;
    }
    Ok(capacity)
}

/// Resources taken from `stock` by raiders able to carry `capacity`.
///
/// When the raiders can carry everything, everything is taken. Otherwise
/// each resource is taken in proportion to its share of the stock, rounded
/// down to whole units so the total never exceeds `capacity`.
///
/// # Errors
///
/// Returns [`CombatError::ArithmeticOverflow`] on overflow.
pub fn plan_haul(capacity: Decimal, stock: &ResourceAmounts) -> Result<ResourceAmounts, CombatError> {
    let total = stock
        .checked_total()
        .ok_or_else(|| CombatError::overflow("stock total"))?;
    if total <= Decimal::ZERO || capacity <= Decimal::ZERO {
        return Ok(ResourceAmounts::ZERO);
    }
    if capacity >= total {
        return Ok(*stock);
    }

    let mut haul = ResourceAmounts::ZERO;
    for resource in Resource::ALL {
        let available = stock.get(resource);
        let share = available
            .checked_mul(capacity)
            .and_then(|v| v.checked_div(total))
            .ok_or_else(|| CombatError::overflow("haul share"))?
            .floor()
            .min(available)
            .max(Decimal::ZERO);
        haul.set(resource, share);
    }
    Ok(haul)
}

/// Remove a planned haul from a stock.
///
/// # Errors
///
/// Returns [`CombatError::ArithmeticOverflow`] on overflow.
pub fn take(stock: &mut ResourceAmounts, haul: &ResourceAmounts) -> Result<(), CombatError> {
    for resource in Resource::ALL {
        let left = stock
            .get(resource)
            .checked_sub(haul.get(resource))
            .ok_or_else(|| CombatError::overflow("stock after haul"))?
            .max(Decimal::ZERO);
        stock.set(resource, left);
    }
    Ok(())
}

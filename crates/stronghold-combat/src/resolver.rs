//! Movement resolution: turns an arriving movement into town mutations,
//! an optional follow-up movement, and an optional report.
//!
//! Resolution is a pure function of its inputs. The caller supplies the
//! resolution instant and the ids of anything created through
//! [`ResolutionContext`], so resolving the same inputs twice yields
//! identical output.
//!
//! | Movement | Effect |
//! |----------|--------|
//! | attack   | battle, casualties, loot, return movement, report |
//! | return   | units back inside, haul deposited up to storage capacity |
//! | support  | [`CombatError::Unimplemented`] |

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use stronghold_types::{
    BattleOutcome, Movement, MovementId, MovementType, Report, ReportId, ReportSide,
    ResourceAmounts, Town,
};
use stronghold_world::WorldCatalog;

use crate::error::CombatError;
use crate::loot;
use crate::strength::{self, Battle};

/// Inputs a resolution needs from outside the game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Instant the movement is resolved at.
    pub now: DateTime<Utc>,
    /// Id for the return movement an attack may create.
    pub return_movement_id: MovementId,
    /// Id for the report an attack creates.
    pub report_id: ReportId,
}

/// Everything a resolved movement changes.
///
/// The coordinator applies all of it in one commit together with the
/// deletion of the resolved movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved movement.
    pub movement_id: MovementId,
    /// Origin town after resolution.
    pub origin: Town,
    /// Destination town after resolution.
    pub destination: Town,
    /// Follow-up movement (the return trip of a successful attack).
    pub spawned: Option<Movement>,
    /// Battle report.
    pub report: Option<Report>,
    /// Battle details, for logging.
    pub battle: Option<Battle>,
}

/// Resolve an arriving movement against its two towns.
///
/// `origin` and `destination` must be the current snapshots of the
/// movement's origin and destination towns, with production already
/// accrued up to `ctx.now`.
///
/// # Errors
///
/// Returns [`CombatError::Unimplemented`] for support movements,
/// [`CombatError::InvalidMovement`] if the towns do not match the movement,
/// and other [`CombatError`] variants for catalog or count violations.
pub fn resolve(
    movement: &Movement,
    origin: &Town,
    destination: &Town,
    catalog: &WorldCatalog,
    ctx: &ResolutionContext,
) -> Result<Resolution, CombatError> {
    if movement.origin_town_id != origin.id || movement.destination_town_id != destination.id {
        return Err(CombatError::InvalidMovement {
            movement_id: movement.id,
            reason: String::from("towns do not match the movement's origin and destination"),
        });
    }

    match movement.movement_type {
        MovementType::Attack => resolve_attack(movement, origin, destination, catalog, ctx),
        MovementType::Return => resolve_return(movement, origin, destination, catalog),
        MovementType::Support => Err(CombatError::Unimplemented {
            movement_id: movement.id,
            movement_type: movement.movement_type,
        }),
    }
}

fn resolve_attack(
    movement: &Movement,
    origin: &Town,
    destination: &Town,
    catalog: &WorldCatalog,
    ctx: &ResolutionContext,
) -> Result<Resolution, CombatError> {
    if origin.id == destination.id {
        return Err(CombatError::InvalidMovement {
            movement_id: movement.id,
            reason: String::from("a town cannot attack itself"),
        });
    }

    let sent: BTreeMap<String, u32> = movement
        .units
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(name, count)| (name.clone(), *count))
        .collect();
    let defenders: BTreeMap<String, u32> = destination
        .units
        .iter()
        .filter(|(_, counts)| counts.inside > 0)
        .map(|(name, counts)| (name.clone(), counts.inside))
        .collect();

    let battle = strength::evaluate(&sent, destination, catalog)?;

    let mut origin_after = origin.clone();
    let mut destination_after = destination.clone();
    let mut haul = ResourceAmounts::ZERO;
    let mut spawned = None;

    let (attacker_losses, defender_losses) = match battle.outcome {
        BattleOutcome::AttackerWon => {
            let alive = strength::survivors(&sent, battle.loss_ratio)?;
            let attacker_losses = strength::losses(&sent, &alive);

            for counts in destination_after.units.values_mut() {
                counts.inside = 0;
            }

            let capacity = loot::haul_capacity(&alive, catalog)?;
            haul = loot::plan_haul(capacity, &destination_after.resources)?;
            loot::take(&mut destination_after.resources, &haul)?;

            remove_outside(&mut origin_after, &attacker_losses)?;

            let alive: BTreeMap<String, u32> =
                alive.into_iter().filter(|(_, count)| *count > 0).collect();
            if !alive.is_empty() {
                spawned = Some(return_movement(movement, alive, haul, ctx));
            }

            (attacker_losses, defenders.clone())
        }
        BattleOutcome::DefenderWon => {
            let alive = strength::survivors(&defenders, battle.loss_ratio)?;
            let defender_losses = strength::losses(&defenders, &alive);

            for (name, count) in &alive {
                if let Some(counts) = destination_after.units.get_mut(name) {
                    counts.inside = *count;
                }
            }

            remove_outside(&mut origin_after, &sent)?;

            (sent.clone(), defender_losses)
        }
    };

    tracing::debug!(
        movement_id = %movement.id,
        outcome = ?battle.outcome,
        attacker_effective = %battle.attacker_effective,
        defender_effective = %battle.defender_effective,
        loss_ratio = %battle.loss_ratio,
        "Attack resolved"
    );

    let report = Report {
        id: ctx.report_id,
        outcome: battle.outcome,
        origin_town_id: origin.id,
        destination_town_id: destination.id,
        origin_player_id: origin.player_id,
        destination_player_id: destination.player_id,
        origin: ReportSide {
            units: sent,
            losses: attacker_losses,
        },
        destination: ReportSide {
            units: defenders,
            losses: defender_losses,
        },
        haul,
        created_at: ctx.now,
    };

    Ok(Resolution {
        movement_id: movement.id,
        origin: origin_after,
        destination: destination_after,
        spawned,
        report: Some(report),
        battle: Some(battle),
    })
}

fn resolve_return(
    movement: &Movement,
    origin: &Town,
    destination: &Town,
    catalog: &WorldCatalog,
) -> Result<Resolution, CombatError> {
    let mut home = destination.clone();

    for (name, amount) in &movement.units {
        if *amount == 0 {
            continue;
        }
        catalog.unit(name)?;
        let counts = home.units.entry(name.clone()).or_default();
        counts.outside = counts
            .outside
            .checked_sub(*amount)
            .ok_or_else(|| CombatError::UnitUnderflow {
                town_id: destination.id,
                unit: name.clone(),
                available: counts.outside,
                requested: *amount,
            })?;
        counts.inside = counts
            .inside
            .checked_add(*amount)
            .ok_or_else(|| CombatError::overflow("units inside"))?;
    }

    let stored = stronghold_world::deposit(&mut home, &movement.haul, catalog)?;
    tracing::debug!(
        movement_id = %movement.id,
        town_id = %home.id,
        units = movement.unit_total(),
        stored_wood = %stored.wood,
        stored_clay = %stored.clay,
        stored_iron = %stored.iron,
        "Return resolved"
    );

    Ok(Resolution {
        movement_id: movement.id,
        origin: origin.clone(),
        destination: home,
        spawned: None,
        report: None,
        battle: None,
    })
}

/// Subtract units from a town's `outside` counts.
fn remove_outside(town: &mut Town, units: &BTreeMap<String, u32>) -> Result<(), CombatError> {
    for (name, amount) in units {
        if *amount == 0 {
            continue;
        }
        let counts = town.units.entry(name.clone()).or_default();
        counts.outside = counts
            .outside
            .checked_sub(*amount)
            .ok_or_else(|| CombatError::UnitUnderflow {
                town_id: town.id,
                unit: name.clone(),
                available: counts.outside,
                requested: *amount,
            })?;
    }
    Ok(())
}

/// The mirrored trip home: same travel time as the way out.
fn return_movement(
    attack: &Movement,
    units: BTreeMap<String, u32>,
    haul: ResourceAmounts,
    ctx: &ResolutionContext,
) -> Movement {
    let travel = attack
        .ends_at
        .signed_duration_since(attack.created_at)
        .max(TimeDelta::zero());
    Movement {
        id: ctx.return_movement_id,
        movement_type: MovementType::Return,
        units,
        haul,
        origin_town_id: attack.destination_town_id,
        destination_town_id: attack.origin_town_id,
        created_at: ctx.now,
        ends_at: ctx.now.checked_add_signed(travel).unwrap_or(ctx.now),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stronghold_types::UnitCounts;

    use super::*;
    use crate::test_support::{army, test_catalog, town_with};

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            now: epoch(),
            return_movement_id: MovementId::new(),
            report_id: ReportId::new(),
        }
    }

    fn movement(kind: MovementType, units: &[(&str, u32)], origin: &Town, destination: &Town) -> Movement {
        Movement {
            id: MovementId::new(),
            movement_type: kind,
            units: army(units),
            haul: ResourceAmounts::ZERO,
            origin_town_id: origin.id,
            destination_town_id: destination.id,
            created_at: epoch() - Duration::minutes(20),
            ends_at: epoch(),
        }
    }

    #[test]
    fn attack_on_undefended_town_returns_everyone() {
        let catalog = test_catalog();
        let origin = town_with(&[("axe", 0, 10)], &[]);
        let destination = town_with(&[], &[]);
        let attack = movement(MovementType::Attack, &[("axe", 10)], &origin, &destination);
        let ctx = ctx();

        let resolution = resolve(&attack, &origin, &destination, &catalog, &ctx).unwrap();

        let battle = resolution.battle.unwrap();
        assert_eq!(battle.outcome, BattleOutcome::AttackerWon);
        assert_eq!(battle.loss_ratio, Decimal::ZERO);
        let back = resolution.spawned.unwrap();
        assert_eq!(back.movement_type, MovementType::Return);
        assert_eq!(back.units.get("axe"), Some(&10));
        assert_eq!(back.id, ctx.return_movement_id);
        assert_eq!(back.origin_town_id, destination.id);
        assert_eq!(back.destination_town_id, origin.id);
        assert_eq!(back.ends_at, epoch() + Duration::minutes(20));
        assert_eq!(resolution.origin.unit_counts("axe").outside, 10);
    }

    #[test]
    fn haul_larger_than_stock_empties_destination() {
        let catalog = test_catalog();
        let origin = town_with(&[("spear", 0, 20)], &[]);
        let mut destination = town_with(&[], &[]);
        destination.resources = ResourceAmounts::new(dec!(100), dec!(150), dec!(50));
        let attack = movement(MovementType::Attack, &[("spear", 20)], &origin, &destination);

        let resolution = resolve(&attack, &origin, &destination, &catalog, &ctx()).unwrap();

        assert!(resolution.destination.resources.is_zero());
        let expected = ResourceAmounts::new(dec!(100), dec!(150), dec!(50));
        assert_eq!(resolution.spawned.unwrap().haul, expected);
        assert_eq!(resolution.report.unwrap().haul, expected);
    }

    #[test]
    fn attacker_victory_wipes_defenders_inside_only() {
        let catalog = test_catalog();
        let origin = town_with(&[("light", 0, 50)], &[]);
        let destination = town_with(&[("spear", 5, 7)], &[]);
        let attack = movement(MovementType::Attack, &[("light", 50)], &origin, &destination);

        let resolution = resolve(&attack, &origin, &destination, &catalog, &ctx()).unwrap();
        let report = resolution.report.unwrap();

        assert_eq!(report.outcome, BattleOutcome::AttackerWon);
        assert_eq!(
            resolution.destination.unit_counts("spear"),
            UnitCounts {
                inside: 0,
                outside: 7,
                queued: 0
            }
        );
        assert_eq!(report.destination.losses.get("spear"), Some(&5));

        let lost = report.origin.losses["light"];
        let back = resolution.spawned.map_or(0, |m| m.units["light"]);
        assert_eq!(lost + back, 50);
        assert_eq!(resolution.origin.unit_counts("light").outside, 50 - lost);
    }

    #[test]
    fn defender_victory_destroys_attack_force() {
        let catalog = test_catalog();
        let origin = town_with(&[("axe", 3, 5)], &[]);
        let destination = town_with(&[("spear", 100, 0)], &[("wall", 1)]);
        let attack = movement(MovementType::Attack, &[("axe", 5)], &origin, &destination);

        let resolution = resolve(&attack, &origin, &destination, &catalog, &ctx()).unwrap();
        let report = resolution.report.unwrap();

        assert_eq!(report.outcome, BattleOutcome::DefenderWon);
        assert!(resolution.spawned.is_none());
        assert_eq!(report.origin.losses.get("axe"), Some(&5));
        assert_eq!(
            resolution.origin.unit_counts("axe"),
            UnitCounts {
                inside: 3,
                outside: 0,
                queued: 0
            }
        );
        let spears = resolution.destination.unit_counts("spear").inside;
        assert!(spears <= 100);
        assert_eq!(report.destination.losses["spear"], 100 - spears);
    }

    #[test]
    fn tie_keeps_defenders_whole() {
        let catalog = test_catalog();
        let origin = town_with(&[("axe", 0, 10)], &[]);
        let destination = town_with(&[("guard", 20, 0)], &[]);
        let attack = movement(MovementType::Attack, &[("axe", 10)], &origin, &destination);

        let resolution = resolve(&attack, &origin, &destination, &catalog, &ctx()).unwrap();

        assert_eq!(resolution.report.unwrap().outcome, BattleOutcome::DefenderWon);
        assert_eq!(resolution.destination.unit_counts("guard").inside, 20);
        assert_eq!(resolution.origin.unit_counts("axe").outside, 0);
    }

    #[test]
    fn resolution_is_deterministic() {
        let catalog = test_catalog();
        let origin = town_with(&[("axe", 0, 40), ("light", 0, 10)], &[]);
        let mut destination = town_with(&[("spear", 30, 0)], &[("wall", 1)]);
        destination.resources = ResourceAmounts::new(dec!(700), dec!(420), dec!(95));
        let attack = movement(
            MovementType::Attack,
            &[("axe", 40), ("light", 10)],
            &origin,
            &destination,
        );
        let ctx = ctx();

        let first = resolve(&attack, &origin, &destination, &catalog, &ctx).unwrap();
        let second = resolve(&attack, &origin, &destination, &catalog, &ctx).unwrap();

        assert_eq!(first, second);
        let first_json = serde_json::to_string(&(&first.origin, &first.destination, &first.spawned, &first.report)).unwrap();
        let second_json = serde_json::to_string(&(&second.origin, &second.destination, &second.spawned, &second.report)).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn return_merges_units_and_caps_haul() {
        let catalog = test_catalog();
        let mut home = town_with(&[("axe", 2, 8)], &[]);
        home.resources = ResourceAmounts::new(dec!(950), dec!(100), dec!(0));
        let raided = town_with(&[], &[]);
        let mut back = movement(MovementType::Return, &[("axe", 8)], &raided, &home);
        back.haul = ResourceAmounts::new(dec!(200), dec!(200), dec!(10));

        let resolution = resolve(&back, &raided, &home, &catalog, &ctx()).unwrap();

        assert_eq!(
            resolution.destination.unit_counts("axe"),
            UnitCounts {
                inside: 10,
                outside: 0,
                queued: 0
            }
        );
        assert_eq!(
            resolution.destination.resources,
            ResourceAmounts::new(dec!(1000), dec!(300), dec!(10))
        );
        assert!(resolution.report.is_none());
        assert!(resolution.spawned.is_none());
        assert_eq!(resolution.origin, raided);
    }

    #[test]
    fn return_with_more_units_than_outside_is_rejected() {
        let catalog = test_catalog();
        let home = town_with(&[("axe", 0, 3)], &[]);
        let raided = town_with(&[], &[]);
        let back = movement(MovementType::Return, &[("axe", 4)], &raided, &home);

        let result = resolve(&back, &raided, &home, &catalog, &ctx());
        assert!(matches!(result, Err(CombatError::UnitUnderflow { requested: 4, available: 3, .. })));
    }

    #[test]
    fn support_is_unimplemented() {
        let catalog = test_catalog();
        let origin = town_with(&[("spear", 0, 5)], &[]);
        let destination = town_with(&[], &[]);
        let support = movement(MovementType::Support, &[("spear", 5)], &origin, &destination);

        let result = resolve(&support, &origin, &destination, &catalog, &ctx());
        assert!(matches!(
            result,
            Err(CombatError::Unimplemented {
                movement_type: MovementType::Support,
                ..
            })
        ));
    }

    #[test]
    fn mismatched_towns_are_rejected() {
        let catalog = test_catalog();
        let origin = town_with(&[("axe", 0, 5)], &[]);
        let destination = town_with(&[], &[]);
        let stranger = town_with(&[], &[]);
        let attack = movement(MovementType::Attack, &[("axe", 5)], &origin, &destination);

        let result = resolve(&attack, &origin, &stranger, &catalog, &ctx());
        assert!(matches!(result, Err(CombatError::InvalidMovement { .. })));
    }
}

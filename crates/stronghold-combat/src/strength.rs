//! Strength calculation, winner determination, and casualty ratios.
//!
//! ## Battle flow
//!
//! 1. Attacker strength per bucket: `count * attack`, in the unit's
//!    attack bucket.
//! 2. Defender strength per bucket: `inside * defense[bucket]`, for every
//!    bucket.
//! 3. No defense at all: the attacker wins without losses.
//! 4. Otherwise the defense is weighted by the attacker's own bucket mix and
//!    multiplied by the wall bonus.
//! 5. The attacker must be strictly stronger to win; ties hold the town.
//! 6. The winner loses [`winner_loss_ratio`] of its participants, the loser
//!    loses everyone who took part.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use stronghold_types::{BattleOutcome, CombatBucket, Town};
use stronghold_world::WorldCatalog;

use crate::error::CombatError;

/// Strength of one side split by combat bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStrength {
    /// Infantry component.
    pub general: Decimal,
    /// Cavalry component.
    pub cavalry: Decimal,
    /// Archer component.
    pub archer: Decimal,
}

impl BucketStrength {
    /// Strength in one bucket.
    pub const fn get(&self, bucket: CombatBucket) -> Decimal {
        match bucket {
            CombatBucket::General => self.general,
            CombatBucket::Cavalry => self.cavalry,
            CombatBucket::Archer => self.archer,
        }
    }

    /// Add to one bucket.
    fn add(&mut self, bucket: CombatBucket, amount: Decimal) -> Result<(), CombatError> {
        let slot = match bucket {
            CombatBucket::General => &mut self.general,
            CombatBucket::Cavalry => &mut self.cavalry,
            CombatBucket::Archer => &mut self.archer,
        };
        *slot = slot
            .checked_add(amount)
            .ok_or_else(|| CombatError::overflow("bucket strength"))?;
        Ok(())
    }

    /// Sum over all buckets.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::ArithmeticOverflow`] if the sum overflows.
    pub fn total(&self) -> Result<Decimal, CombatError> {
        self.general
            .checked_add(self.cavalry)
            .and_then(|s| s.checked_add(self.archer))
            .ok_or_else(|| CombatError::overflow("total strength"))
    }
}

/// Everything decided about a battle before any state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Battle {
    /// Raw attacker strength per bucket.
    pub attacker: BucketStrength,
    /// Raw defender strength per bucket.
    pub defender: BucketStrength,
    /// Attacker strength used to pick the winner.
    pub attacker_effective: Decimal,
    /// Mix- and wall-weighted defender strength used to pick the winner.
    pub defender_effective: Decimal,
    /// Who won.
    pub outcome: BattleOutcome,
    /// Share of the winner's participants lost, in `0..=1`.
    pub loss_ratio: Decimal,
}

/// Attacking strength of a group of travelling units.
///
/// # Errors
///
/// Returns [`CombatError`] for unknown unit names or overflow.
pub fn attacker_strength(
    units: &BTreeMap<String, u32>,
    catalog: &WorldCatalog,
) -> Result<BucketStrength, CombatError> {
    let mut strength = BucketStrength::default();
    for (name, count) in units {
        let unit = catalog.unit(name)?;
        let value = Decimal::from(*count)
            .checked_mul(Decimal::from(unit.attack))
            .ok_or_else(|| CombatError::overflow("attack value"))?;
        strength.add(unit.attack_type, value)?;
    }
    Ok(strength)
}

/// Defending strength of the units stationed inside a town.
///
/// # Errors
///
/// Returns [`CombatError`] for unknown unit names or overflow.
pub fn defender_strength(town: &Town, catalog: &WorldCatalog) -> Result<BucketStrength, CombatError> {
    let mut strength = BucketStrength::default();
    for (name, counts) in &town.units {
        if counts.inside == 0 {
            continue;
        }
        let unit = catalog.unit(name)?;
        for bucket in CombatBucket::ALL {
            let value = Decimal::from(counts.inside)
                .checked_mul(Decimal::from(unit.defense.against(bucket)))
                .ok_or_else(|| CombatError::overflow("defense value"))?;
            strength.add(bucket, value)?;
        }
    }
    Ok(strength)
}

/// Defense weighted by the attacker's bucket mix and the wall bonus.
///
/// An attacker with no strength at all faces the plain wall-boosted total.
///
/// # Errors
///
/// Returns [`CombatError::ArithmeticOverflow`] on overflow.
pub fn effective_defense(
    defender: &BucketStrength,
    attacker: &BucketStrength,
    wall_bonus: Decimal,
) -> Result<Decimal, CombatError> {
    let attacker_total = attacker.total()?;
    if attacker_total.is_zero() {
        return defender
            .total()?
            .checked_mul(wall_bonus)
            .ok_or_else(|| CombatError::overflow("effective defense"));
    }

    let mut effective = Decimal::ZERO;
    for bucket in CombatBucket::ALL {
        let share = attacker
            .get(bucket)
            .checked_div(attacker_total)
            .ok_or_else(|| CombatError::overflow("attacker share"))?;
        let weighted = defender
            .get(bucket)
            .checked_mul(share)
            .and_then(|v| v.checked_mul(wall_bonus))
            .ok_or_else(|| CombatError::overflow("effective defense"))?;
        effective = effective
            .checked_add(weighted)
            .ok_or_else(|| CombatError::overflow("effective defense"))?;
    }
    Ok(effective)
}

/// Share of the winning side's participants lost in a battle.
///
/// `1 - sqrt(loser / winner) / (winner / loser)`, clamped to `0..=1`.
/// Equal strengths lose nothing; the ratio climbs towards 1 as the
/// battle gets more lopsided. A side facing no opposition loses nothing.
///
/// # Errors
///
/// Returns [`CombatError::ArithmeticOverflow`] if the strengths are too far
/// apart to divide.
pub fn winner_loss_ratio(winner: Decimal, loser: Decimal) -> Result<Decimal, CombatError> {
    if winner <= Decimal::ZERO || loser <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let root = loser
        .checked_div(winner)
        .and_then(|r| r.sqrt())
        .ok_or_else(|| CombatError::overflow("loss ratio root"))?;
    let ratio = winner
        .checked_div(loser)
        .and_then(|inverse| root.checked_div(inverse))
        .and_then(|r| Decimal::ONE.checked_sub(r))
        .ok_or_else(|| CombatError::overflow("loss ratio"))?;
    Ok(ratio.clamp(Decimal::ZERO, Decimal::ONE))
}

/// Decide a battle between travelling units and a town's defenders.
///
/// # Errors
///
/// Returns [`CombatError`] for unknown unit names or overflow.
pub fn evaluate(
    units: &BTreeMap<String, u32>,
    defender_town: &Town,
    catalog: &WorldCatalog,
) -> Result<Battle, CombatError> {
    let attacker = attacker_strength(units, catalog)?;
    let defender = defender_strength(defender_town, catalog)?;
    let attacker_effective = attacker.total()?;

    if defender.total()?.is_zero() {
        return Ok(Battle {
            attacker,
            defender,
            attacker_effective,
            defender_effective: Decimal::ZERO,
            outcome: BattleOutcome::AttackerWon,
            loss_ratio: Decimal::ZERO,
        });
    }

    let wall = stronghold_world::wall_bonus(defender_town, catalog)?;
    let defender_effective = effective_defense(&defender, &attacker, wall)?;

    let (outcome, loss_ratio) = if attacker_effective > defender_effective {
        (
            BattleOutcome::AttackerWon,
            winner_loss_ratio(attacker_effective, defender_effective)?,
        )
    } else {
        (
            BattleOutcome::DefenderWon,
            winner_loss_ratio(defender_effective, attacker_effective)?,
        )
    };

    Ok(Battle {
        attacker,
        defender,
        attacker_effective,
        defender_effective,
        outcome,
        loss_ratio,
    })
}

/// Survivors per unit type after losing `loss_ratio` of each.
///
/// Counts are rounded half-up and never exceed what took part.
///
/// # Errors
///
/// Returns [`CombatError::ArithmeticOverflow`] on overflow.
pub fn survivors(
    units: &BTreeMap<String, u32>,
    loss_ratio: Decimal,
) -> Result<BTreeMap<String, u32>, CombatError> {
    let keep = (Decimal::ONE - loss_ratio).clamp(Decimal::ZERO, Decimal::ONE);
    units
        .iter()
        .map(|(name, count)| {
            let alive = Decimal::from(*count)
                .checked_mul(keep)
                .ok_or_else(|| CombatError::overflow("survivors"))?
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_u32()
                .ok_or_else(|| CombatError::overflow("survivors"))?;
            Ok((name.clone(), alive.min(*count)))
        })
        .collect()
}

/// Per-type difference `before - after`.
pub fn losses(before: &BTreeMap<String, u32>, after: &BTreeMap<String, u32>) -> BTreeMap<String, u32> {
    before
        .iter()
        .map(|(name, count)| {
            let left = after.get(name).copied().unwrap_or(0);
            (name.clone(), count.saturating_sub(left))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::test_support::{army, test_catalog, town_with};

    #[test]
    fn equal_strength_costs_the_winner_nothing() {
        assert_eq!(winner_loss_ratio(Decimal::ONE, Decimal::ONE).unwrap(), Decimal::ZERO);
        assert_eq!(winner_loss_ratio(dec!(250), dec!(250)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn lopsided_battles_approach_full_loss() {
        let close = winner_loss_ratio(dec!(110), dec!(100)).unwrap();
        let wide = winner_loss_ratio(dec!(10000), dec!(1)).unwrap();
        assert!(close > Decimal::ZERO && close < dec!(0.5));
        assert!(wide > dec!(0.99));
        assert!(wide <= Decimal::ONE);
    }

    #[test]
    fn unopposed_side_loses_nothing() {
        assert_eq!(winner_loss_ratio(dec!(500), Decimal::ZERO).unwrap(), Decimal::ZERO);
        assert_eq!(winner_loss_ratio(Decimal::ZERO, Decimal::ZERO).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn unrepresentable_strength_gap_is_an_error() {
        let result = winner_loss_ratio(Decimal::MAX, Decimal::new(1, 28));
        assert!(matches!(result, Err(CombatError::ArithmeticOverflow { .. })));
    }

    #[test]
    fn attack_strength_goes_to_attack_bucket() {
        let catalog = test_catalog();
        let strength = attacker_strength(&army(&[("axe", 10), ("light", 2)]), &catalog).unwrap();
        assert_eq!(strength.general, dec!(400));
        assert_eq!(strength.cavalry, dec!(260));
        assert_eq!(strength.archer, Decimal::ZERO);
    }

    #[test]
    fn defense_counts_only_units_inside() {
        let catalog = test_catalog();
        let town = town_with(&[("spear", 10, 50)], &[]);
        let strength = defender_strength(&town, &catalog).unwrap();
        assert_eq!(strength.general, dec!(150));
        assert_eq!(strength.cavalry, dec!(450));
        assert_eq!(strength.archer, dec!(200));
    }

    #[test]
    fn defense_is_weighted_by_attacker_mix_and_wall() {
        let defender = BucketStrength {
            general: dec!(100),
            cavalry: dec!(300),
            archer: dec!(0),
        };
        let attacker = BucketStrength {
            general: dec!(50),
            cavalry: dec!(50),
            archer: dec!(0),
        };
        let plain = effective_defense(&defender, &attacker, Decimal::ONE).unwrap();
        assert_eq!(plain, dec!(200));
        let walled = effective_defense(&defender, &attacker, dec!(1.5)).unwrap();
        assert_eq!(walled, dec!(300));
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let catalog = test_catalog();
        let result = attacker_strength(&army(&[("ram", 1)]), &catalog);
        assert!(matches!(result, Err(CombatError::World { .. })));
    }

    #[test]
    fn exact_tie_goes_to_defender() {
        let catalog = test_catalog();
        // 10 axes attack for 400 general; 20 guards defend for 400 general.
        let town = town_with(&[("guard", 20, 0)], &[]);
        let battle = evaluate(&army(&[("axe", 10)]), &town, &catalog).unwrap();
        assert_eq!(battle.attacker_effective, battle.defender_effective);
        assert_eq!(battle.outcome, BattleOutcome::DefenderWon);
        assert_eq!(battle.loss_ratio, Decimal::ZERO);
    }

    #[test]
    fn empty_town_falls_without_losses() {
        let catalog = test_catalog();
        let town = town_with(&[("spear", 0, 30)], &[]);
        let battle = evaluate(&army(&[("axe", 10)]), &town, &catalog).unwrap();
        assert_eq!(battle.outcome, BattleOutcome::AttackerWon);
        assert_eq!(battle.loss_ratio, Decimal::ZERO);
    }

    #[test]
    fn survivors_round_half_up() {
        let alive = survivors(&army(&[("axe", 3), ("spear", 10)]), dec!(0.5)).unwrap();
        assert_eq!(alive.get("axe"), Some(&2));
        assert_eq!(alive.get("spear"), Some(&5));
        let lost = losses(&army(&[("axe", 3), ("spear", 10)]), &alive);
        assert_eq!(lost.get("axe"), Some(&1));
        assert_eq!(lost.get("spear"), Some(&5));
    }
}

//! Enumeration types for the Stronghold world core.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A stockpiled resource produced by towns and carried as haul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Resource {
    /// Lumber.
    Wood,
    /// Clay.
    Clay,
    /// Iron.
    Iron,
}

impl Resource {
    /// Every resource, in storage order.
    pub const ALL: [Self; 3] = [Self::Wood, Self::Clay, Self::Iron];

    /// Stable lowercase name, used for database columns and catalog keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wood => "wood",
            Self::Clay => "clay",
            Self::Iron => "iron",
        }
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// Combat bucket a unit attacks in, and against which defense is rated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CombatBucket {
    /// Infantry.
    General,
    /// Mounted units.
    Cavalry,
    /// Ranged units.
    Archer,
}

impl CombatBucket {
    /// Every bucket, in evaluation order.
    pub const ALL: [Self; 3] = [Self::General, Self::Cavalry, Self::Archer];
}

/// Outcome of a resolved attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BattleOutcome {
    /// The attacking force had strictly greater effective strength.
    AttackerWon,
    /// The defenders held (including exact ties).
    DefenderWon,
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

/// What a troop movement does when it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MovementType {
    /// Fight the destination's defenders and loot on victory.
    Attack,
    /// Survivors and haul travelling home.
    Return,
    /// Troops stationed at an allied town. Resolution is not implemented.
    Support,
}

impl MovementType {
    /// Stable lowercase name, used for database columns.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Return => "return",
            Self::Support => "support",
        }
    }

    /// Parse the database representation produced by [`Self::as_str`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "attack" => Some(Self::Attack),
            "return" => Some(Self::Return),
            "support" => Some(Self::Support),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Tag attached to a town-update notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum EventTag {
    /// Emitted after the coordinator committed a town's due completions.
    #[serde(rename = "queueProcessed")]
    QueueProcessed,
}

impl EventTag {
    /// Wire name of the tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueProcessed => "queueProcessed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_roundtrips_through_db_name() {
        for kind in [MovementType::Attack, MovementType::Return, MovementType::Support] {
            assert_eq!(MovementType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementType::parse("raid"), None);
    }

    #[test]
    fn event_tag_serializes_to_wire_name() {
        let json = serde_json::to_string(&EventTag::QueueProcessed).ok();
        assert_eq!(json.as_deref(), Some("\"queueProcessed\""));
    }
}

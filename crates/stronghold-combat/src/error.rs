//! Error types for the `stronghold-combat` crate.

use stronghold_types::{MovementId, MovementType, TownId};
use stronghold_world::WorldError;

/// Errors that can occur while resolving a movement.
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    /// A catalog lookup or production computation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// Applying the movement would drive a unit count below zero.
    #[error("town {town_id} has {available} {unit} outside, cannot remove {requested}")]
    UnitUnderflow {
        /// The town whose counts would underflow.
        town_id: TownId,
        /// Catalog name of the unit.
        unit: String,
        /// Units currently recorded as outside.
        available: u32,
        /// Units the resolution tried to remove.
        requested: u32,
    },

    /// The movement does not fit the towns it was resolved against.
    #[error("movement {movement_id} is invalid: {reason}")]
    InvalidMovement {
        /// The offending movement.
        movement_id: MovementId,
        /// Explanation of the mismatch.
        reason: String,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in combat calculation: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },

    /// The movement type has no resolution rules.
    #[error("resolution of {movement_type:?} movement {movement_id} is not implemented")]
    Unimplemented {
        /// The movement that could not be resolved.
        movement_id: MovementId,
        /// Its type.
        movement_type: MovementType,
    },
}

impl CombatError {
    /// Build an [`CombatError::ArithmeticOverflow`] with context.
    pub(crate) fn overflow(context: &str) -> Self {
        Self::ArithmeticOverflow {
            context: context.to_owned(),
        }
    }
}

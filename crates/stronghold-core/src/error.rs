//! Error types for the `stronghold-core` crate.
//!
//! [`CoreError`] has exactly the four kinds the scheduler branches on.
//! Lower-level errors are folded into them at the crate seam:
//!
//! | Source | Kind |
//! |--------|------|
//! | [`StoreError::Missing`] | [`CoreError::NotFound`] |
//! | other [`StoreError`] | [`CoreError::Storage`] |
//! | [`CombatError::Unimplemented`] | [`CoreError::Unimplemented`] |
//! | other [`CombatError`], [`WorldError`] | [`CoreError::Validation`] |

use stronghold_combat::CombatError;
use stronghold_types::{MovementId, MovementType};
use stronghold_world::WorldError;

/// Errors raised by a [`WorldStore`](crate::store::WorldStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed; the operation may succeed if retried.
    #[error("storage backend error: {source}")]
    Backend {
        /// The underlying backend error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A row the commit expected to delete no longer exists.
    #[error("{entity} {id} no longer exists")]
    Missing {
        /// Kind of row (`building_queue`, `unit_queue`, `movement`).
        entity: &'static str,
        /// Row identifier.
        id: String,
    },
}

impl StoreError {
    /// Wrap any backend error.
    pub fn backend(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend {
            source: source.into(),
        }
    }
}

/// Errors that can occur while processing a scheduled item.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced town or queue row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of the missing entity.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// Applying the item would violate a game rule or invariant.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was violated.
        reason: String,
    },

    /// Transient persistence failure.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        source: StoreError,
    },

    /// The item is a movement type without resolution rules.
    #[error("{movement_type:?} movement {movement_id} cannot be resolved yet")]
    Unimplemented {
        /// The unresolvable movement.
        movement_id: MovementId,
        /// Its type.
        movement_type: MovementType,
    },
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`CoreError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same item can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

impl From<StoreError> for CoreError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::Missing { entity, id } => Self::NotFound { entity, id },
            other @ StoreError::Backend { .. } => Self::Storage { source: other },
        }
    }
}

impl From<CombatError> for CoreError {
    fn from(source: CombatError) -> Self {
        match source {
            CombatError::Unimplemented {
                movement_id,
                movement_type,
            } => Self::Unimplemented {
                movement_id,
                movement_type,
            },
            other => Self::validation(other.to_string()),
        }
    }
}

impl From<WorldError> for CoreError {
    fn from(source: WorldError) -> Self {
        Self::validation(source.to_string())
    }
}

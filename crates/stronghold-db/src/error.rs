//! Error types for the data layer.
//!
//! Everything here surfaces as [`DbError`]. At the [`WorldStore`] seam it is
//! folded into [`StoreError`]: [`DbError::MissingRow`] becomes
//! [`StoreError::Missing`], everything else a retryable backend error.
//!
//! [`WorldStore`]: stronghold_core::WorldStore

use stronghold_core::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSONB column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value does not fit the column or the domain type it maps to.
    #[error("Cannot convert {column}: {reason}")]
    Conversion {
        /// Offending column.
        column: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A row marked for deletion was already gone; the transaction was
    /// rolled back.
    #[error("{entity} {id} no longer exists")]
    MissingRow {
        /// Table the row lived in.
        entity: &'static str,
        /// Row identifier.
        id: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    pub(crate) fn conversion(column: &'static str, reason: impl ToString) -> Self {
        Self::Conversion {
            column,
            reason: reason.to_string(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::MissingRow { entity, id } => Self::Missing { entity, id },
            other => Self::backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rows_keep_their_identity() {
        let err = StoreError::from(DbError::MissingRow {
            entity: "movement",
            id: String::from("42"),
        });
        assert!(matches!(err, StoreError::Missing { entity: "movement", ref id } if id == "42"));
    }

    #[test]
    fn other_errors_become_backend_failures() {
        let err = StoreError::from(DbError::Config(String::from("bad url")));
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(err.to_string().contains("bad url"));
    }
}

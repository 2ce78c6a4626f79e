//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop the engine during
//! startup. Once the scheduler loop is running, item failures are handled
//! by the scheduler's retry policy and never reach this type.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: stronghold_core::ConfigError,
    },

    /// The world catalog could not be loaded.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: stronghold_world::WorldError,
    },

    /// Connecting to or migrating `PostgreSQL` failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: stronghold_db::DbError,
    },

    /// Loading the pending schedule failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying core error.
        #[from]
        source: stronghold_core::CoreError,
    },

    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },
}

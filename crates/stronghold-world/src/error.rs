//! Error types for the `stronghold-world` crate.
//!
//! All fallible catalog lookups and production arithmetic return
//! [`WorldError`].

/// Errors that can occur while reading the catalog or computing production.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A building name is not present in the catalog.
    #[error("unknown building: {0}")]
    UnknownBuilding(String),

    /// A unit name is not present in the catalog.
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    /// A town holds a building level the catalog does not describe.
    #[error("building {building} has no level {level} (catalog defines {max})")]
    LevelOutOfRange {
        /// Catalog name of the building.
        building: String,
        /// The requested level.
        level: u32,
        /// Highest level in the catalog.
        max: usize,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in production calculation")]
    ArithmeticOverflow,

    /// The catalog is structurally invalid.
    #[error("invalid catalog: {reason}")]
    InvalidCatalog {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Failed to read the catalog file from disk.
    #[error("failed to read catalog file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse catalog YAML.
    #[error("failed to parse catalog YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },
}

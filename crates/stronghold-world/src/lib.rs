//! World catalog and production model for the Stronghold world core.
//!
//! # Modules
//!
//! - [`catalog`] -- Read-only building and unit tables loaded from YAML,
//!   plus [`SharedCatalog`] for runtime reloads.
//! - [`error`] -- Error types for catalog lookups and production arithmetic.
//! - [`production`] -- Hourly production, storage capacity, wall bonus, and
//!   lazy accrual of elapsed production into a town's stock.

pub mod catalog;
pub mod error;
pub mod production;

// Re-export primary types at crate root.
pub use catalog::{
    BuildingDef, BuildingLevel, DefenseStats, ProductionBuildings, SharedCatalog, UnitDef,
    WorldCatalog,
};
pub use error::WorldError;
pub use production::{
    accrue, accrue_between, deposit, hourly_production, refresh_production, storage_capacity,
    wall_bonus,
};

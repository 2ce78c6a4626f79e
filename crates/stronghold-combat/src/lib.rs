//! Movement resolution for the Stronghold world core.
//!
//! Everything here is a pure function of its inputs: no clock, no random
//! numbers, no I/O. The coordinator in `stronghold-core` loads the towns,
//! calls [`resolve`], and persists the returned [`Resolution`].
//!
//! # Modules
//!
//! - [`error`] -- Error types for resolution failures.
//! - [`loot`] -- Haul capacity and proportional loot split.
//! - [`resolver`] -- Attack, return, and support resolution.
//! - [`strength`] -- Bucketed strength, wall bonus, winner and casualty
//!   ratios.

pub mod error;
pub mod loot;
pub mod resolver;
pub mod strength;

#[cfg(test)]
mod test_support;

pub use error::CombatError;
pub use resolver::{Resolution, ResolutionContext, resolve};
pub use strength::{Battle, BucketStrength};

//! Completion scheduling and per-town queue processing for the Stronghold
//! world core.
//!
//! Nothing in a Stronghold world advances on a tick. Building levels,
//! recruitment batches, and troop movements each complete at an instant,
//! and this crate makes sure every one of them fires exactly once, in time
//! order, against up-to-date town state.
//!
//! # Modules
//!
//! - [`clock`] -- Injected wall clock ([`SystemClock`], [`ManualClock`])
//! - [`config`] -- YAML configuration with environment overrides
//! - [`coordinator`] -- [`TownQueueCoordinator`]: one atomic pass per town
//! - [`error`] -- [`CoreError`] kinds and the [`StoreError`] seam
//! - [`item`] -- [`ScheduledItem`], the scheduler's view of a pending row
//! - [`memory_store`] -- [`InMemoryStore`], a [`WorldStore`] in process memory
//! - [`notify`] -- [`Notifier`] sinks for post-commit notifications
//! - [`scheduler`] -- [`EventScheduler`], the global ordered dispatcher
//! - [`store`] -- [`WorldStore`] trait, snapshots, and change sets

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod item;
pub mod memory_store;
pub mod notify;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, StrongholdConfig};
pub use coordinator::{ProcessOutcome, TownQueueCoordinator};
pub use error::{CoreError, StoreError};
pub use item::{ItemKind, ScheduledItem};
pub use memory_store::InMemoryStore;
pub use notify::{BroadcastNotifier, NoopNotifier, Notification, Notifier};
pub use scheduler::{EventScheduler, QueuedItem, ScheduleQueue};
pub use store::{ChangeSet, TownSnapshot, WorldStore};

//! Persistence seam.
//!
//! The core never talks to a database directly. It reads pending rows and
//! town snapshots through [`WorldStore`] and writes back one [`ChangeSet`]
//! per processed item, which the store must apply atomically.

use std::future::Future;

use stronghold_types::{
    BuildingQueueItem, Movement, MovementId, QueueItemId, Report, Town, TownId, UnitQueueItem,
};

use crate::error::StoreError;

/// A town together with every pending row that concerns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownSnapshot {
    /// The town itself.
    pub town: Town,
    /// Pending building rows of the town.
    pub building_queue: Vec<BuildingQueueItem>,
    /// Pending recruitment rows of the town.
    pub unit_queue: Vec<UnitQueueItem>,
    /// Movements arriving at the town.
    pub incoming: Vec<Movement>,
    /// Movements that left from the town.
    pub outgoing: Vec<Movement>,
}

/// Everything one processed item writes, applied in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Towns to overwrite.
    pub towns: Vec<Town>,
    /// Building rows to delete.
    pub completed_buildings: Vec<QueueItemId>,
    /// Recruitment rows to delete.
    pub completed_units: Vec<QueueItemId>,
    /// Movements to delete.
    pub resolved_movements: Vec<MovementId>,
    /// Movements to insert.
    pub created_movements: Vec<Movement>,
    /// Reports to insert.
    pub reports: Vec<Report>,
}

impl ChangeSet {
    /// Whether the change set writes nothing.
    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
            && self.completed_buildings.is_empty()
            && self.completed_units.is_empty()
            && self.resolved_movements.is_empty()
            && self.created_movements.is_empty()
            && self.reports.is_empty()
    }
}

/// Storage backend consumed by the scheduler and coordinator.
///
/// Pending lists are sorted ascending by `(ends_at, id)`.
pub trait WorldStore: Send + Sync {
    /// Every pending building row.
    fn pending_buildings(
        &self,
    ) -> impl Future<Output = Result<Vec<BuildingQueueItem>, StoreError>> + Send;

    /// Every pending recruitment row.
    fn pending_units(&self) -> impl Future<Output = Result<Vec<UnitQueueItem>, StoreError>> + Send;

    /// Every movement still travelling.
    fn pending_movements(&self) -> impl Future<Output = Result<Vec<Movement>, StoreError>> + Send;

    /// A town and its pending rows, `None` if the town does not exist.
    fn load_town_snapshot(
        &self,
        town_id: TownId,
    ) -> impl Future<Output = Result<Option<TownSnapshot>, StoreError>> + Send;

    /// A town on its own, `None` if it does not exist.
    fn load_town(
        &self,
        town_id: TownId,
    ) -> impl Future<Output = Result<Option<Town>, StoreError>> + Send;

    /// Apply a change set atomically.
    ///
    /// Fails with [`StoreError::Missing`] without writing anything if a row
    /// marked for deletion is already gone.
    fn commit(&self, changes: ChangeSet) -> impl Future<Output = Result<(), StoreError>> + Send;
}

//! In-memory [`WorldStore`] for tests, demos, and embedding.
//!
//! All state sits behind one [`tokio::sync::Mutex`], so a commit is
//! trivially atomic: it validates every deletion first and only then
//! writes. Commit failures can be injected to exercise the scheduler's
//! retry path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use stronghold_types::{
    BuildingQueueItem, Movement, MovementId, QueueItemId, Report, Town, TownId, UnitQueueItem,
};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{ChangeSet, TownSnapshot, WorldStore};

#[derive(Debug, Default)]
struct MemoryState {
    towns: BTreeMap<TownId, Town>,
    buildings: BTreeMap<QueueItemId, BuildingQueueItem>,
    units: BTreeMap<QueueItemId, UnitQueueItem>,
    movements: BTreeMap<MovementId, Movement>,
    reports: Vec<Report>,
}

/// A [`WorldStore`] held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    failing_commits: AtomicU32,
    commits: AtomicU32,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a town.
    pub async fn put_town(&self, town: Town) {
        self.state.lock().await.towns.insert(town.id, town);
    }

    /// Insert a pending building row.
    pub async fn put_building(&self, row: BuildingQueueItem) {
        self.state.lock().await.buildings.insert(row.id, row);
    }

    /// Insert a pending recruitment row.
    pub async fn put_unit(&self, row: UnitQueueItem) {
        self.state.lock().await.units.insert(row.id, row);
    }

    /// Insert a travelling movement.
    pub async fn put_movement(&self, movement: Movement) {
        self.state.lock().await.movements.insert(movement.id, movement);
    }

    /// Delete a pending building row, as a cancellation would.
    pub async fn cancel_building(&self, id: QueueItemId) -> Option<BuildingQueueItem> {
        self.state.lock().await.buildings.remove(&id)
    }

    /// Current copy of a town.
    pub async fn town(&self, id: TownId) -> Option<Town> {
        self.state.lock().await.towns.get(&id).cloned()
    }

    /// Current copy of a movement.
    pub async fn movement(&self, id: MovementId) -> Option<Movement> {
        self.state.lock().await.movements.get(&id).cloned()
    }

    /// Every movement currently stored, in id order.
    pub async fn movements(&self) -> Vec<Movement> {
        self.state.lock().await.movements.values().cloned().collect()
    }

    /// Every report written so far, oldest first.
    pub async fn reports(&self) -> Vec<Report> {
        self.state.lock().await.reports.clone()
    }

    /// Make the next `count` commits fail with a backend error.
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::Release);
    }

    /// Number of commits that were applied.
    pub fn commit_count(&self) -> u32 {
        self.commits.load(Ordering::Acquire)
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

fn sorted_by_key<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

impl WorldStore for InMemoryStore {
    async fn pending_buildings(&self) -> Result<Vec<BuildingQueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_key(
            state.buildings.values().cloned().collect(),
            |row| (row.ends_at, row.id),
        ))
    }

    async fn pending_units(&self) -> Result<Vec<UnitQueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_key(
            state.units.values().cloned().collect(),
            |row| (row.ends_at, row.id),
        ))
    }

    async fn pending_movements(&self) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_key(
            state.movements.values().cloned().collect(),
            |m| (m.ends_at, m.id),
        ))
    }

    async fn load_town_snapshot(&self, town_id: TownId) -> Result<Option<TownSnapshot>, StoreError> {
        let state = self.state.lock().await;
        let Some(town) = state.towns.get(&town_id).cloned() else {
            return Ok(None);
        };
        let building_queue = sorted_by_key(
            state
                .buildings
                .values()
                .filter(|row| row.town_id == town_id)
                .cloned()
                .collect(),
            |row| (row.ends_at, row.id),
        );
        let unit_queue = sorted_by_key(
            state
                .units
                .values()
                .filter(|row| row.town_id == town_id)
                .cloned()
                .collect(),
            |row| (row.ends_at, row.id),
        );
        let incoming = sorted_by_key(
            state
                .movements
                .values()
                .filter(|m| m.destination_town_id == town_id)
                .cloned()
                .collect(),
            |m| (m.ends_at, m.id),
        );
        let outgoing = sorted_by_key(
            state
                .movements
                .values()
                .filter(|m| m.origin_town_id == town_id)
                .cloned()
                .collect(),
            |m| (m.ends_at, m.id),
        );
        Ok(Some(TownSnapshot {
            town,
            building_queue,
            unit_queue,
            incoming,
            outgoing,
        }))
    }

    async fn load_town(&self, town_id: TownId) -> Result<Option<Town>, StoreError> {
        Ok(self.state.lock().await.towns.get(&town_id).cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        if self.take_injected_failure() {
            return Err(StoreError::backend("injected commit failure"));
        }

        if let Some(id) = changes
            .completed_buildings
            .iter()
            .find(|id| !state.buildings.contains_key(*id))
        {
            return Err(StoreError::Missing {
                entity: "building_queue",
                id: id.to_string(),
            });
        }
        if let Some(id) = changes
            .completed_units
            .iter()
            .find(|id| !state.units.contains_key(*id))
        {
            return Err(StoreError::Missing {
                entity: "unit_queue",
                id: id.to_string(),
            });
        }
        if let Some(id) = changes
            .resolved_movements
            .iter()
            .find(|id| !state.movements.contains_key(*id))
        {
            return Err(StoreError::Missing {
                entity: "movement",
                id: id.to_string(),
            });
        }

        for id in &changes.completed_buildings {
            state.buildings.remove(id);
        }
        for id in &changes.completed_units {
            state.units.remove(id);
        }
        for id in &changes.resolved_movements {
            state.movements.remove(id);
        }
        for town in changes.towns {
            state.towns.insert(town.id, town);
        }
        for movement in changes.created_movements {
            state.movements.insert(movement.id, movement);
        }
        state.reports.extend(changes.reports);

        self.commits.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support::{building_row, town};

    #[tokio::test]
    async fn pending_rows_come_back_sorted() {
        let store = InMemoryStore::new();
        let home = town("Hollow");
        let now = Utc::now();
        store.put_town(home.clone()).await;
        store
            .put_building(building_row(&home, "timber_camp", 2, now + Duration::seconds(20)))
            .await;
        store
            .put_building(building_row(&home, "timber_camp", 1, now + Duration::seconds(10)))
            .await;

        let rows = store.pending_buildings().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.first().unwrap().ends_at < rows.last().unwrap().ends_at);
    }

    #[tokio::test]
    async fn commit_with_missing_row_writes_nothing() {
        let store = InMemoryStore::new();
        let mut home = town("Hollow");
        store.put_town(home.clone()).await;
        home.loyalty = 5;

        let result = store
            .commit(ChangeSet {
                towns: vec![home.clone()],
                completed_buildings: vec![QueueItemId::new()],
                ..ChangeSet::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Missing { .. })));
        assert_eq!(store.town(home.id).await.unwrap().loyalty, 100);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next_commits(1);
        assert!(store.commit(ChangeSet::default()).await.is_err());
        assert!(store.commit(ChangeSet::default()).await.is_ok());
        assert_eq!(store.commit_count(), 1);
    }
}

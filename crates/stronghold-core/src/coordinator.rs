//! Per-town processing of everything that is due.
//!
//! When the scheduler fires an item, [`TownQueueCoordinator::process_item`]
//! takes the item's owning town and, in one pass:
//!
//! 1. accrues its production up to now,
//! 2. applies every due building row in `(ends_at, id)` order,
//! 3. applies every due recruitment row in `(ends_at, id)` order,
//! 4. drains due movements arriving at the town (and due return trips
//!    leaving it) one at a time, re-checking after each resolution because
//!    a resolution can spawn another due movement,
//! 5. commits the whole pass as one [`ChangeSet`],
//! 6. notifies collaborators about every written town and report.
//!
//! Any validation failure aborts the pass before the commit, so storage is
//! never left half-applied. A due movement whose other town has been
//! deleted is dropped with a warning instead of failing the pass.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stronghold_combat::ResolutionContext;
use stronghold_types::{
    BuildingQueueItem, EventTag, Movement, MovementId, MovementType, ReportId, Town, TownId,
    UnitQueueItem,
};
use stronghold_world::{SharedCatalog, WorldCatalog};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::item::{ItemKind, ScheduledItem};
use crate::notify::Notifier;
use crate::store::{ChangeSet, TownSnapshot, WorldStore};

/// What one processing pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Rows applied and deleted from storage, in application order. Always
    /// contains the dispatched item.
    pub processed: Vec<Uuid>,
    /// Movements created and stored by the pass.
    pub created: Vec<ScheduledItem>,
    /// Due support movements left untouched.
    pub unsupported: Vec<MovementId>,
    /// Due movements dropped because one of their towns no longer exists.
    /// They are deleted with the pass and also listed in `processed`.
    pub orphaned: Vec<MovementId>,
    /// Number of reports written.
    pub reports: usize,
}

/// Applies due queue rows and movements for one town at a time.
pub struct TownQueueCoordinator<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    catalog: Arc<SharedCatalog>,
    clock: Arc<dyn Clock>,
}

impl<S, N> TownQueueCoordinator<S, N>
where
    S: WorldStore,
    N: Notifier,
{
    /// Create a coordinator over the given collaborators.
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        catalog: Arc<SharedCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
            clock,
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Process the dispatched item and everything else due for its town.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Unimplemented`] if the item is a support movement.
    /// - [`CoreError::NotFound`] if the owning town or the item's own row
    ///   no longer exists.
    /// - [`CoreError::Validation`] if applying a row would break a game
    ///   rule; nothing is written.
    /// - [`CoreError::Storage`] if reading or committing fails.
    pub async fn process_item(&self, item: &ScheduledItem) -> Result<ProcessOutcome, CoreError> {
        if let ItemKind::Movement {
            movement_type: MovementType::Support,
            ..
        } = item.kind
        {
            return Err(CoreError::Unimplemented {
                movement_id: MovementId::from(item.id),
                movement_type: MovementType::Support,
            });
        }

        let catalog = self.catalog.current();
        let now = self.clock.now().max(item.ends_at);
        let town_id = item.owning_town();

        debug!(item_id = %item.id, town_id = %town_id, ends_at = %item.ends_at, "Processing item");

        let snapshot = self
            .store
            .load_town_snapshot(town_id)
            .await?
            .ok_or_else(|| CoreError::not_found("town", town_id))?;
        ensure_present(item, &snapshot)?;

        let TownSnapshot {
            town,
            mut building_queue,
            mut unit_queue,
            incoming,
            outgoing,
        } = snapshot;

        let mut pass = Pass::new(town, &catalog, now)?;

        building_queue.retain(|row| row.ends_at <= now);
        building_queue.sort_by_key(|row| (row.ends_at, row.id));
        for row in &building_queue {
            pass.complete_building(row)?;
        }

        unit_queue.retain(|row| row.ends_at <= now);
        unit_queue.sort_by_key(|row| (row.ends_at, row.id));
        for row in &unit_queue {
            pass.complete_units(row)?;
        }

        let mut worklist: BTreeMap<(DateTime<Utc>, MovementId), Movement> = incoming
            .into_iter()
            .chain(outgoing)
            .filter(|m| pass.drains(m))
            .map(|m| ((m.ends_at, m.id), m))
            .collect();

        while let Some((_, movement)) = worklist.pop_first() {
            if movement.movement_type == MovementType::Support {
                pass.unsupported.push(movement.id);
                continue;
            }
            let mut missing = None;
            for id in [movement.origin_town_id, movement.destination_town_id] {
                if pass.towns.contains_key(&id) {
                    continue;
                }
                match self.store.load_town(id).await? {
                    Some(town) => pass.admit(town)?,
                    None => {
                        missing = Some(id);
                        break;
                    }
                }
            }
            if let Some(missing) = missing {
                pass.drop_orphan(&movement, missing);
                continue;
            }
            let spawned = pass.resolve(&movement)?;
            if let Some(next) = spawned.filter(|next| pass.drains(next)) {
                worklist.insert((next.ends_at, next.id), next);
            }
        }

        let (changes, outcome) = pass.finish();
        let towns = changes.towns.clone();
        let reports = changes.reports.clone();

        self.store.commit(changes).await?;

        for town in &towns {
            self.notifier.town_updated(town, EventTag::QueueProcessed);
        }
        for report in &reports {
            self.notifier.report_created(report);
        }

        debug!(
            town_id = %town_id,
            processed = outcome.processed.len(),
            created = outcome.created.len(),
            unsupported = outcome.unsupported.len(),
            orphaned = outcome.orphaned.len(),
            towns_written = towns.len(),
            "Town queues processed"
        );

        Ok(outcome)
    }
}

/// Fail with `NotFound` if the dispatched row is not among the town's
/// pending rows (cancelled, or already processed by another pass).
fn ensure_present(item: &ScheduledItem, snapshot: &TownSnapshot) -> Result<(), CoreError> {
    let present = match item.kind {
        ItemKind::Building { .. } => snapshot
            .building_queue
            .iter()
            .any(|row| row.id.into_inner() == item.id),
        ItemKind::Unit { .. } => snapshot
            .unit_queue
            .iter()
            .any(|row| row.id.into_inner() == item.id),
        ItemKind::Movement { .. } => snapshot
            .incoming
            .iter()
            .any(|m| m.id.into_inner() == item.id),
    };
    if present {
        Ok(())
    } else {
        let entity = match item.kind {
            ItemKind::Building { .. } => "building_queue",
            ItemKind::Unit { .. } => "unit_queue",
            ItemKind::Movement { .. } => "movement",
        };
        Err(CoreError::not_found(entity, item.id))
    }
}

/// Working state of one processing pass.
struct Pass<'a> {
    catalog: &'a WorldCatalog,
    now: DateTime<Utc>,
    owner: TownId,
    /// Accrued working copies of every town the pass has looked at.
    towns: BTreeMap<TownId, Town>,
    /// Towns whose working copy differs from storage.
    touched: BTreeSet<TownId>,
    changes: ChangeSet,
    processed: Vec<Uuid>,
    unsupported: Vec<MovementId>,
    orphaned: Vec<MovementId>,
    /// Movements spawned during the pass and not resolved by it.
    spawned: BTreeMap<MovementId, Movement>,
}

impl<'a> Pass<'a> {
    fn new(owner: Town, catalog: &'a WorldCatalog, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let owner_id = owner.id;
        let mut pass = Self {
            catalog,
            now,
            owner: owner_id,
            towns: BTreeMap::new(),
            touched: BTreeSet::new(),
            changes: ChangeSet::default(),
            processed: Vec::new(),
            unsupported: Vec::new(),
            orphaned: Vec::new(),
            spawned: BTreeMap::new(),
        };
        pass.admit(owner)?;
        pass.touched.insert(owner_id);
        Ok(pass)
    }

    /// Bring a town into the pass, accrued up to `now`. The town is only
    /// written back if something else changes it.
    fn admit(&mut self, mut town: Town) -> Result<(), CoreError> {
        stronghold_world::accrue(&mut town, self.catalog, self.now)?;
        self.towns.insert(town.id, town);
        Ok(())
    }

    fn owner_mut(&mut self) -> Result<&mut Town, CoreError> {
        self.towns
            .get_mut(&self.owner)
            .ok_or_else(|| CoreError::not_found("town", self.owner))
    }

    fn complete_building(&mut self, row: &BuildingQueueItem) -> Result<(), CoreError> {
        let catalog = self.catalog;
        let town = self.owner_mut()?;
        let next = town
            .building_level(&row.name)
            .checked_add(1)
            .ok_or_else(|| CoreError::validation(format!("{} level overflow", row.name)))?;
        catalog.building_level(&row.name, next)?;

        let state = town.buildings.entry(row.name.clone()).or_default();
        state.level = next;
        if state.queued == state.level {
            state.queued = 0;
        }
        if catalog.is_production_building(&row.name) {
            stronghold_world::refresh_production(town, catalog)?;
        }

        debug!(town_id = %row.town_id, building = %row.name, level = next, "Building completed");
        self.changes.completed_buildings.push(row.id);
        self.processed.push(row.id.into_inner());
        Ok(())
    }

    fn complete_units(&mut self, row: &UnitQueueItem) -> Result<(), CoreError> {
        let catalog = self.catalog;
        catalog.unit(&row.name)?;
        let town = self.owner_mut()?;

        let counts = town.units.entry(row.name.clone()).or_default();
        counts.queued = counts.queued.checked_sub(row.amount).ok_or_else(|| {
            CoreError::validation(format!(
                "town {} has {} {} queued, cannot complete {}",
                row.town_id, counts.queued, row.name, row.amount
            ))
        })?;
        counts.inside = counts
            .inside
            .checked_add(row.amount)
            .ok_or_else(|| CoreError::validation(format!("{} count overflow", row.name)))?;

        debug!(town_id = %row.town_id, unit = %row.name, amount = row.amount, "Recruitment completed");
        self.changes.completed_units.push(row.id);
        self.processed.push(row.id.into_inner());
        Ok(())
    }

    /// Whether this pass is responsible for resolving `movement` now.
    fn drains(&self, movement: &Movement) -> bool {
        movement.ends_at <= self.now
            && (movement.destination_town_id == self.owner
                || (movement.movement_type == MovementType::Return
                    && movement.origin_town_id == self.owner))
    }

    /// Resolve one movement against the working copies of its towns.
    ///
    /// Returns the movement it spawned, if any.
    fn resolve(&mut self, movement: &Movement) -> Result<Option<Movement>, CoreError> {
        let origin = self.working_copy(movement.origin_town_id)?;
        let destination = self.working_copy(movement.destination_town_id)?;
        let ctx = ResolutionContext {
            now: self.now,
            return_movement_id: MovementId::new(),
            report_id: ReportId::new(),
        };

        let resolution =
            stronghold_combat::resolve(movement, &origin, &destination, self.catalog, &ctx)?;

        self.write_back(resolution.origin);
        self.write_back(resolution.destination);

        if self.spawned.remove(&movement.id).is_none() {
            self.changes.resolved_movements.push(movement.id);
            self.processed.push(movement.id.into_inner());
        }

        if let Some(report) = resolution.report {
            info!(
                report_id = %report.id,
                movement_id = %movement.id,
                origin_town_id = %report.origin_town_id,
                destination_town_id = %report.destination_town_id,
                outcome = ?report.outcome,
                "Battle resolved"
            );
            self.changes.reports.push(report);
        }

        if let Some(next) = &resolution.spawned {
            self.spawned.insert(next.id, next.clone());
        }
        Ok(resolution.spawned)
    }

    /// Delete a movement that can never resolve because `missing` is gone.
    fn drop_orphan(&mut self, movement: &Movement, missing: TownId) {
        warn!(
            movement_id = %movement.id,
            movement_type = ?movement.movement_type,
            missing_town_id = %missing,
            "Movement references a missing town, dropped"
        );
        self.changes.resolved_movements.push(movement.id);
        self.processed.push(movement.id.into_inner());
        self.orphaned.push(movement.id);
    }

    fn working_copy(&self, id: TownId) -> Result<Town, CoreError> {
        self.towns
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("town", id))
    }

    fn write_back(&mut self, town: Town) {
        if self.towns.get(&town.id) != Some(&town) {
            self.touched.insert(town.id);
            self.towns.insert(town.id, town);
        }
    }

    fn finish(self) -> (ChangeSet, ProcessOutcome) {
        let Self {
            towns,
            touched,
            mut changes,
            processed,
            unsupported,
            orphaned,
            spawned,
            ..
        } = self;

        changes.towns = towns
            .into_iter()
            .filter(|(id, _)| touched.contains(id))
            .map(|(_, town)| town)
            .collect();

        let mut created: Vec<Movement> = spawned.into_values().collect();
        created.sort_by_key(|m| (m.ends_at, m.id));
        let outcome = ProcessOutcome {
            processed,
            created: created.iter().map(ScheduledItem::from).collect(),
            unsupported,
            orphaned,
            reports: changes.reports.len(),
        };
        changes.created_movements = created;

        (changes, outcome)
    }
}

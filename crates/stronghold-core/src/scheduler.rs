//! Global event scheduler.
//!
//! [`EventScheduler`] keeps every pending completion in the world in one
//! ordered [`ScheduleQueue`] and hands the earliest due item to the
//! [`TownQueueCoordinator`], one item at a time. After each pass it drops
//! whatever the pass processed and inserts whatever the pass created, so
//! a return trip spawned by a battle is dispatched before any later item.
//!
//! # Failure policy
//!
//! | Error | Action |
//! |-------|--------|
//! | `Storage` | deferred by exponential backoff, dropped after `max_attempts` |
//! | `NotFound` | dropped, warning |
//! | `Unimplemented` | dropped, warning |
//! | `Validation` | dropped, error; the row stays in storage for inspection |
//!
//! A dropped item is only forgotten in memory. It is loaded again on the
//! next start if its row still exists.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::coordinator::{ProcessOutcome, TownQueueCoordinator};
use crate::error::CoreError;
use crate::item::ScheduledItem;
use crate::notify::Notifier;
use crate::store::WorldStore;

/// An item waiting in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedItem {
    /// The pending completion.
    pub item: ScheduledItem,
    /// When to dispatch: `ends_at`, or later after a failed attempt.
    pub due_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: u32,
}

impl QueuedItem {
    /// Wrap a fresh item, due at its completion instant.
    pub const fn new(item: ScheduledItem) -> Self {
        Self {
            item,
            due_at: item.ends_at,
            attempts: 0,
        }
    }

    /// Order key: dispatch instant, then id.
    pub const fn key(&self) -> (DateTime<Utc>, Uuid) {
        (self.due_at, self.item.id)
    }
}

/// Items ordered ascending by `(due_at, id)`.
#[derive(Debug, Clone, Default)]
pub struct ScheduleQueue {
    entries: VecDeque<QueuedItem>,
}

impl ScheduleQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in order, scanning from whichever end is nearer in time.
    /// An entry with the same id is replaced.
    pub fn insert(&mut self, entry: QueuedItem) {
        self.remove(&[entry.item.id]);
        let key = entry.key();

        let (Some(front), Some(back)) = (self.entries.front(), self.entries.back()) else {
            self.entries.push_back(entry);
            return;
        };

        let from_front = key.0.signed_duration_since(front.due_at);
        let from_back = back.due_at.signed_duration_since(key.0);
        let index = if from_front <= from_back {
            self.entries
                .iter()
                .position(|e| e.key() > key)
                .unwrap_or(self.entries.len())
        } else {
            let after = self
                .entries
                .iter()
                .rev()
                .position(|e| e.key() <= key)
                .unwrap_or(self.entries.len());
            self.entries.len().saturating_sub(after)
        };
        self.entries.insert(index, entry);
    }

    /// Drop entries by id; unknown ids are ignored. Returns how many were
    /// removed.
    pub fn remove(&mut self, ids: &[Uuid]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.item.id));
        before.saturating_sub(self.entries.len())
    }

    /// The earliest entry.
    pub fn peek(&self) -> Option<&QueuedItem> {
        self.entries.front()
    }

    /// Take the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<QueuedItem> {
        if self.entries.front().is_some_and(|e| e.due_at <= now) {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in dispatch order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.item.id).collect()
    }
}

/// The process-wide dispatcher of pending completions.
pub struct EventScheduler<S, N> {
    coordinator: TownQueueCoordinator<S, N>,
    clock: Arc<dyn Clock>,
    policy: SchedulerConfig,
    queue: Mutex<ScheduleQueue>,
    wake: Notify,
}

impl<S, N> EventScheduler<S, N>
where
    S: WorldStore,
    N: Notifier,
{
    /// Create a scheduler with an empty queue.
    pub fn new(
        coordinator: TownQueueCoordinator<S, N>,
        clock: Arc<dyn Clock>,
        policy: SchedulerConfig,
    ) -> Self {
        Self {
            coordinator,
            clock,
            policy,
            queue: Mutex::new(ScheduleQueue::new()),
            wake: Notify::new(),
        }
    }

    /// Fill the queue with every pending row in storage.
    ///
    /// Returns the number of items loaded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if any of the three fetches fails.
    pub async fn load(&self) -> Result<usize, CoreError> {
        let store = self.coordinator.store();
        let buildings = store.pending_buildings().await?;
        let units = store.pending_units().await?;
        let movements = store.pending_movements().await?;

        let merged = merge_sorted(
            buildings.iter().map(ScheduledItem::from).collect(),
            units.iter().map(ScheduledItem::from).collect(),
            movements.iter().map(ScheduledItem::from).collect(),
        );
        let count = merged.len();

        let mut queue = self.queue.lock().await;
        for item in merged {
            queue.insert(QueuedItem::new(item));
        }
        drop(queue);
        self.wake.notify_one();

        info!(
            buildings = buildings.len(),
            units = units.len(),
            movements = movements.len(),
            "Schedule loaded"
        );
        Ok(count)
    }

    /// Schedule a new item.
    pub async fn insert(&self, item: ScheduledItem) {
        self.queue.lock().await.insert(QueuedItem::new(item));
        self.wake.notify_one();
    }

    /// Forget items by id. Items already being processed are not affected.
    pub async fn remove(&self, ids: &[Uuid]) -> usize {
        let removed = self.queue.lock().await.remove(ids);
        if removed > 0 {
            self.wake.notify_one();
        }
        removed
    }

    /// Number of scheduled items.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether nothing is scheduled.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// The next item to be dispatched.
    pub async fn peek(&self) -> Option<QueuedItem> {
        self.queue.lock().await.peek().copied()
    }

    /// Scheduled ids in dispatch order.
    pub async fn ids(&self) -> Vec<Uuid> {
        self.queue.lock().await.ids()
    }

    /// Dispatch every item due at the current instant, earliest first.
    ///
    /// Items created by a pass are dispatched in the same call if they are
    /// already due. Returns the number of dispatches.
    pub async fn dispatch_due(&self) -> usize {
        let mut dispatched: usize = 0;
        loop {
            let now = self.clock.now();
            let Some(entry) = self.queue.lock().await.pop_due(now) else {
                break;
            };
            self.dispatch(entry).await;
            dispatched = dispatched.saturating_add(1);
        }
        dispatched
    }

    /// Run the timer loop until `shutdown` turns `true` or its sender is
    /// dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let scheduled = self.len().await;
        info!(scheduled, "Scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.dispatch_due().await;

            let delay = self.next_delay().await;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = self.wake.notified() => {}
                () = sleep_for(delay) => {}
            }
        }

        let scheduled = self.len().await;
        info!(scheduled, "Scheduler stopped");
    }

    /// Time until the earliest item is due; `None` when the queue is empty.
    async fn next_delay(&self) -> Option<Duration> {
        let due_at = self.queue.lock().await.peek().map(|e| e.due_at)?;
        let delta = due_at.signed_duration_since(self.clock.now());
        Some(delta.to_std().unwrap_or(Duration::ZERO))
    }

    async fn dispatch(&self, entry: QueuedItem) {
        let item = entry.item;
        match self.coordinator.process_item(&item).await {
            Ok(outcome) => self.apply_outcome(&item, &outcome).await,
            Err(err) if err.is_retryable() => self.defer(entry, &err).await,
            Err(err @ CoreError::Validation { .. }) => {
                error!(
                    item_id = %item.id,
                    town_id = %item.owning_town(),
                    error = %err,
                    "Item failed validation, dropped from schedule"
                );
            }
            Err(err) => {
                warn!(
                    item_id = %item.id,
                    town_id = %item.owning_town(),
                    error = %err,
                    "Item dropped from schedule"
                );
            }
        }
    }

    async fn apply_outcome(&self, item: &ScheduledItem, outcome: &ProcessOutcome) {
        let mut queue = self.queue.lock().await;
        queue.remove(&outcome.processed);
        for created in &outcome.created {
            queue.insert(QueuedItem::new(*created));
        }
        drop(queue);

        if !outcome.unsupported.is_empty() {
            warn!(
                town_id = %item.owning_town(),
                count = outcome.unsupported.len(),
                "Support movements are not resolved yet"
            );
        }
        debug!(
            item_id = %item.id,
            processed = outcome.processed.len(),
            created = outcome.created.len(),
            "Item dispatched"
        );
    }

    async fn defer(&self, entry: QueuedItem, err: &CoreError) {
        let attempts = entry.attempts.saturating_add(1);
        if attempts >= self.policy.max_attempts {
            error!(
                item_id = %entry.item.id,
                attempts,
                error = %err,
                "Retries exhausted, item dropped from schedule"
            );
            return;
        }

        let backoff_ms = self.policy.backoff_ms(attempts);
        let delay = TimeDelta::try_milliseconds(i64::try_from(backoff_ms).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX);
        let now = self.clock.now();
        let due_at = now.checked_add_signed(delay).unwrap_or(now);

        warn!(
            item_id = %entry.item.id,
            attempt = attempts,
            backoff_ms,
            error = %err,
            "Storage failure, item deferred"
        );
        self.queue.lock().await.insert(QueuedItem {
            item: entry.item,
            due_at,
            attempts,
        });
    }
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Merge three lists sorted by `(ends_at, id)` into one.
fn merge_sorted(
    a: Vec<ScheduledItem>,
    b: Vec<ScheduledItem>,
    c: Vec<ScheduledItem>,
) -> Vec<ScheduledItem> {
    let mut sources = [
        a.into_iter().peekable(),
        b.into_iter().peekable(),
        c.into_iter().peekable(),
    ];
    let mut merged = Vec::new();
    loop {
        let next = sources
            .iter_mut()
            .filter_map(|source| source.peek().map(ScheduledItem::key))
            .min();
        let Some(key) = next else {
            break;
        };
        for source in &mut sources {
            if source.peek().is_some_and(|item| item.key() == key) {
                if let Some(item) = source.next() {
                    merged.push(item);
                }
                break;
            }
        }
    }
    merged
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal::Decimal;
    use stronghold_types::{MovementType, ResourceAmounts, Town, TownId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::item::ItemKind;
    use crate::memory_store::InMemoryStore;
    use crate::notify::{BroadcastNotifier, Notification, NoopNotifier};
    use crate::test_support::{
        building_row, catalog, epoch, movement, town, unit_row, with_buildings, with_units,
    };

    fn at(ms: i64) -> DateTime<Utc> {
        epoch() + ChronoDuration::milliseconds(ms)
    }

    fn item(ms: i64) -> ScheduledItem {
        ScheduledItem {
            id: Uuid::now_v7(),
            ends_at: at(ms),
            kind: ItemKind::Building {
                town_id: TownId::new(),
            },
        }
    }

    fn policy() -> SchedulerConfig {
        SchedulerConfig {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 4_000,
        }
    }

    struct Harness<N> {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        scheduler: EventScheduler<InMemoryStore, N>,
    }

    fn harness<N: Notifier>(notifier: Arc<N>) -> Harness<N> {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let dyn_clock: Arc<dyn Clock> = Arc::clone(&clock) as Arc<dyn Clock>;
        let coordinator =
            TownQueueCoordinator::new(Arc::clone(&store), notifier, catalog(), Arc::clone(&dyn_clock));
        Harness {
            store,
            clock,
            scheduler: EventScheduler::new(coordinator, dyn_clock, policy()),
        }
    }

    #[test]
    fn queue_orders_by_time_then_id() {
        let mut queue = ScheduleQueue::new();
        let late = item(500);
        let early = item(100);
        let middle = item(300);
        let mut tie = item(300);
        tie.id = Uuid::nil();

        for entry in [late, early, middle, tie] {
            queue.insert(QueuedItem::new(entry));
        }

        assert_eq!(queue.ids(), vec![early.id, tie.id, middle.id, late.id]);
    }

    #[test]
    fn inserts_near_either_end_keep_order() {
        let mut queue = ScheduleQueue::new();
        let mut expected = Vec::new();
        for ms in [0, 1_000_000] {
            let entry = item(ms);
            expected.push((entry.key(), entry.id));
            queue.insert(QueuedItem::new(entry));
        }
        // Near the back, then near the front.
        for ms in [999_999, 999_998, 1, 2, 500_000] {
            let entry = item(ms);
            expected.push((entry.key(), entry.id));
            queue.insert(QueuedItem::new(entry));
        }
        expected.sort();
        let expected: Vec<Uuid> = expected.into_iter().map(|(_, id)| id).collect();
        assert_eq!(queue.ids(), expected);
    }

    #[test]
    fn remove_ignores_unknown_ids() {
        let mut queue = ScheduleQueue::new();
        let a = item(10);
        let b = item(20);
        queue.insert(QueuedItem::new(a));
        queue.insert(QueuedItem::new(b));

        assert_eq!(queue.remove(&[a.id, Uuid::nil()]), 1);
        assert_eq!(queue.ids(), vec![b.id]);
        assert_eq!(queue.remove(&[a.id]), 0);
    }

    #[test]
    fn reinserting_an_id_replaces_it() {
        let mut queue = ScheduleQueue::new();
        let mut a = item(10);
        queue.insert(QueuedItem::new(a));
        a.ends_at = at(50);
        queue.insert(QueuedItem::new(a));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().due_at, at(50));
    }

    #[test]
    fn pop_due_respects_now() {
        let mut queue = ScheduleQueue::new();
        queue.insert(QueuedItem::new(item(100)));
        assert!(queue.pop_due(at(99)).is_none());
        assert!(queue.pop_due(at(100)).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn three_way_merge_is_globally_sorted() {
        let merged = merge_sorted(
            vec![item(1), item(7), item(9)],
            vec![item(2), item(3)],
            vec![item(0), item(8)],
        );
        let times: Vec<_> = merged.iter().map(|i| i.ends_at).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(merged.len(), 7);
    }

    #[test]
    fn merge_drains_uneven_sources() {
        let early = item(5);
        let merged = merge_sorted(vec![], vec![item(4), item(6), item(10), item(12)], vec![early]);
        let times: Vec<_> = merged.iter().map(|i| i.ends_at).collect();
        assert_eq!(times, vec![at(4), at(5), at(6), at(10), at(12)]);
        assert_eq!(merged[1].id, early.id);
        assert!(merge_sorted(vec![], vec![], vec![]).is_empty());
    }

    #[test]
    fn run_future_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}
        let h = harness(Arc::new(NoopNotifier));
        let (_tx, rx) = watch::channel(false);
        let running = h.scheduler.run(rx);
        assert_send(&running);
    }

    #[tokio::test]
    async fn load_merges_all_three_sources() {
        let h = harness(Arc::new(NoopNotifier));
        let home = with_units(town("Home"), &[("spear", 0, 0, 5)]);
        let other = town("Other");
        let b = building_row(&home, "timber_camp", 1, at(300));
        let u = unit_row(&home, "spear", 5, at(100));
        let m = movement(MovementType::Attack, &[("axe", 1)], &other, &home, at(0), at(200));
        h.store.put_town(home).await;
        h.store.put_building(b.clone()).await;
        h.store.put_unit(u.clone()).await;
        h.store.put_movement(m.clone()).await;

        assert_eq!(h.scheduler.load().await.unwrap(), 3);
        assert_eq!(
            h.scheduler.ids().await,
            vec![u.id.into_inner(), m.id.into_inner(), b.id.into_inner()]
        );
    }

    #[tokio::test]
    async fn movement_from_missing_town_leaves_the_queue() {
        let h = harness(Arc::new(NoopNotifier));
        let home = with_units(town("Home"), &[("spear", 0, 0, 5)]);
        let gone = town("Gone");
        let u = unit_row(&home, "spear", 5, at(100));
        let m = movement(MovementType::Attack, &[("axe", 1)], &gone, &home, at(0), at(200));
        let b = building_row(&home, "timber_camp", 1, at(300));
        h.store.put_town(home.clone()).await;
        h.store.put_unit(u).await;
        h.store.put_movement(m.clone()).await;
        h.store.put_building(b).await;
        h.scheduler.load().await.unwrap();

        h.clock.set(at(300));
        assert_eq!(h.scheduler.dispatch_due().await, 1);

        assert!(h.scheduler.ids().await.is_empty());
        assert!(h.store.movement(m.id).await.is_none());
        let stored = h.store.town(home.id).await.unwrap();
        assert_eq!(stored.unit_counts("spear").inside, 5);
        assert_eq!(stored.building_level("timber_camp"), 1);
    }

    #[tokio::test]
    async fn cancelled_item_is_never_dispatched() {
        let h = harness(Arc::new(NoopNotifier));
        let home = with_buildings(town("Home"), &[("timber_camp", 0, 1)]);
        let row = building_row(&home, "timber_camp", 1, at(1_000));
        h.store.put_town(home.clone()).await;
        h.store.put_building(row.clone()).await;
        h.scheduler.load().await.unwrap();

        h.store.cancel_building(row.id).await;
        assert_eq!(h.scheduler.remove(&[row.id.into_inner()]).await, 1);

        h.clock.set(at(2_000));
        assert_eq!(h.scheduler.dispatch_due().await, 0);
        assert_eq!(h.store.town(home.id).await.unwrap().building_level("timber_camp"), 0);
    }

    #[tokio::test]
    async fn nothing_fires_before_it_is_due() {
        let h = harness(Arc::new(NoopNotifier));
        let home = town("Home");
        let row = building_row(&home, "timber_camp", 1, at(1_000));
        h.store.put_town(home.clone()).await;
        h.store.put_building(row).await;
        h.scheduler.load().await.unwrap();

        h.clock.set(at(999));
        assert_eq!(h.scheduler.dispatch_due().await, 0);
        h.clock.set(at(1_000));
        assert_eq!(h.scheduler.dispatch_due().await, 1);
        assert!(h.scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn battle_return_is_dispatched_before_later_items() {
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let mut rx = notifier.subscribe();
        let h = harness(Arc::clone(&notifier));

        let attacker = with_units(town("Attacker"), &[("axe", 0, 10, 0)]);
        let target = town("Target");
        let bystander = town("Bystander");
        // Outbound trip of five minutes, arriving one minute in.
        let attack = movement(
            MovementType::Attack,
            &[("axe", 10)],
            &attacker,
            &target,
            at(-240_000),
            at(60_000),
        );
        let later = building_row(&bystander, "timber_camp", 1, at(20 * 60_000));
        h.store.put_town(attacker.clone()).await;
        h.store.put_town(target.clone()).await;
        h.store.put_town(bystander.clone()).await;
        h.store.put_movement(attack.clone()).await;
        h.store.put_building(later.clone()).await;
        h.scheduler.load().await.unwrap();

        h.clock.set(at(60_000));
        assert_eq!(h.scheduler.dispatch_due().await, 1);

        let next = h.scheduler.peek().await.unwrap();
        assert!(matches!(
            next.item.kind,
            ItemKind::Movement {
                movement_type: MovementType::Return,
                ..
            }
        ));
        assert_eq!(next.due_at, at(360_000));

        h.clock.set(at(30 * 60_000));
        assert_eq!(h.scheduler.dispatch_due().await, 2);

        let mut updated = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            if let Notification::TownUpdated { town, .. } = notification {
                updated.push(town.id);
            }
        }
        assert_eq!(updated, vec![target.id, attacker.id, bystander.id]);
        assert_eq!(
            h.store.town(attacker.id).await.unwrap().unit_counts("axe").inside,
            10
        );
    }

    #[tokio::test]
    async fn storage_failures_are_deferred_then_succeed() {
        let h = harness(Arc::new(NoopNotifier));
        let home = town("Home");
        let row = building_row(&home, "timber_camp", 1, at(0));
        let other = town("Other");
        let other_row = building_row(&other, "timber_camp", 1, at(500));
        h.store.put_town(home.clone()).await;
        h.store.put_town(other.clone()).await;
        h.store.put_building(row.clone()).await;
        h.store.put_building(other_row.clone()).await;
        h.scheduler.load().await.unwrap();

        h.store.fail_next_commits(1);
        assert_eq!(h.scheduler.dispatch_due().await, 1);
        assert_eq!(
            h.scheduler.ids().await,
            vec![other_row.id.into_inner(), row.id.into_inner()]
        );

        // The other town's item keeps flowing while the first one waits.
        h.clock.set(at(500));
        assert_eq!(h.scheduler.dispatch_due().await, 1);
        assert_eq!(h.store.town(other.id).await.unwrap().building_level("timber_camp"), 1);

        let deferred = h.scheduler.peek().await.unwrap();
        assert_eq!(deferred.item.id, row.id.into_inner());
        assert_eq!(deferred.attempts, 1);
        assert_eq!(deferred.due_at, at(1_000));

        h.clock.set(at(1_000));
        assert_eq!(h.scheduler.dispatch_due().await, 1);
        assert_eq!(h.store.town(home.id).await.unwrap().building_level("timber_camp"), 1);
        assert!(h.scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_item() {
        let h = harness(Arc::new(NoopNotifier));
        let home = town("Home");
        let row = building_row(&home, "timber_camp", 1, at(0));
        h.store.put_town(home.clone()).await;
        h.store.put_building(row.clone()).await;
        h.scheduler.load().await.unwrap();
        h.store.fail_next_commits(10);

        // Attempts 1 and 2 defer; attempt 3 gives up.
        for ms in [0, 1_000, 3_000] {
            h.clock.set(at(ms));
            assert_eq!(h.scheduler.dispatch_due().await, 1);
        }
        assert!(h.scheduler.is_empty().await);
        // Still in storage, so a restart would pick it up again.
        assert_eq!(h.store.pending_buildings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_errors_drop_without_retry() {
        let h = harness(Arc::new(NoopNotifier));
        let home = town("Home");
        let ally = town("Ally");
        let support = movement(MovementType::Support, &[("spear", 1)], &ally, &home, at(0), at(0));
        let bad = unit_row(&home, "spear", 3, at(0));
        h.store.put_town(home.clone()).await;
        h.store.put_town(ally).await;
        h.store.put_movement(support).await;
        h.store.put_unit(bad).await;
        h.scheduler.load().await.unwrap();

        assert_eq!(h.scheduler.dispatch_due().await, 2);
        assert!(h.scheduler.is_empty().await);
        assert_eq!(h.store.commit_count(), 0);
    }

    #[tokio::test]
    async fn run_loop_dispatches_and_stops_on_shutdown() {
        let h = Arc::new(harness(Arc::new(NoopNotifier)));
        let home = town("Home");
        let row = building_row(&home, "timber_camp", 1, at(0));
        h.store.put_town(home.clone()).await;
        h.store.put_building(row.clone()).await;
        h.scheduler.load().await.unwrap();

        let (tx, rx) = watch::channel(false);
        let runner = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.scheduler.run(rx).await })
        };

        // Inserted while the loop waits on an empty queue.
        let late = building_row(&home, "timber_camp", 2, at(0));
        h.store.put_building(late.clone()).await;
        h.scheduler.insert(ScheduledItem::from(&late)).await;

        let mut level = 0;
        for _ in 0..200 {
            level = h.store.town(home.id).await.unwrap().building_level("timber_camp");
            if level == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(level, 2);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }

    /// Random valid pre-states never produce negative or over-capacity
    /// results.
    #[tokio::test]
    #[allow(clippy::arithmetic_side_effects)]
    async fn random_pre_states_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let shared = catalog();
        let catalog = shared.current();

        for _ in 0..40 {
            let h = harness(Arc::new(NoopNotifier));
            let mut towns: Vec<Town> = Vec::new();
            for index in 0..3 {
                let mut t = with_units(
                    town(&format!("Town {index}")),
                    &[
                        ("spear", rng.random_range(0..50), rng.random_range(0..30), 0),
                        ("axe", rng.random_range(0..50), rng.random_range(0..30), 0),
                        ("light", rng.random_range(0..20), rng.random_range(0..10), 0),
                    ],
                );
                t = with_buildings(t, &[("wall", rng.random_range(0..=2), 0)]);
                t.resources = ResourceAmounts::new(
                    Decimal::from(rng.random_range(0..=1000)),
                    Decimal::from(rng.random_range(0..=1000)),
                    Decimal::from(rng.random_range(0..=1000)),
                );
                towns.push(t);
            }
            for t in &towns {
                h.store.put_town(t.clone()).await;
            }

            // Units still free to start a movement, per town.
            let mut free: Vec<Town> = towns.clone();
            for _ in 0..6 {
                let from = rng.random_range(0..towns.len());
                let to = (from + rng.random_range(1..towns.len())) % towns.len();
                let mut units = Vec::new();
                for name in ["spear", "axe", "light"] {
                    if let Some(counts) = free[from].units.get_mut(name) {
                        let count = rng.random_range(0..=counts.outside);
                        counts.outside -= count;
                        if count > 0 {
                            units.push((name, count));
                        }
                    }
                }
                if units.is_empty() {
                    continue;
                }

                let travel = rng.random_range(1_000..600_000);
                let arrive = rng.random_range(0..600_000);
                let m = if rng.random_bool(0.7) {
                    movement(
                        MovementType::Attack,
                        &units,
                        &towns[from],
                        &towns[to],
                        at(arrive - travel),
                        at(arrive),
                    )
                } else {
                    // Troops of `from` coming home from `to`.
                    let mut m = movement(
                        MovementType::Return,
                        &units,
                        &towns[to],
                        &towns[from],
                        at(arrive - travel),
                        at(arrive),
                    );
                    m.haul = ResourceAmounts::new(
                        Decimal::from(rng.random_range(0..400)),
                        Decimal::from(rng.random_range(0..400)),
                        Decimal::from(rng.random_range(0..400)),
                    );
                    m
                };
                h.store.put_movement(m).await;
            }

            h.scheduler.load().await.unwrap();
            h.clock.set(at(3_600_000));
            h.scheduler.dispatch_due().await;

            for t in &towns {
                let after = h.store.town(t.id).await.unwrap();
                let capacity = stronghold_world::storage_capacity(&after, &catalog).unwrap();
                for resource in stronghold_types::Resource::ALL {
                    let amount = after.resources.get(resource);
                    assert!(amount >= Decimal::ZERO, "{resource:?} negative in {}", after.name);
                    assert!(amount <= capacity, "{resource:?} over capacity in {}", after.name);
                }
            }
        }
    }
}

//! Schedule intake over NATS.
//!
//! The game servers that create queue rows and dispatch movements write
//! them to `PostgreSQL` and then announce them here so the running
//! scheduler picks them up without a reload.
//!
//! # Subject Convention
//!
//! - **Insert:** `stronghold.schedule.insert`, payload [`IntakeRow`]
//! - **Remove:** `stronghold.schedule.remove`, payload a JSON array of row ids

use std::sync::Arc;

use futures::StreamExt as _;
use serde::Deserialize;
use stronghold_core::{EventScheduler, Notifier, ScheduledItem, WorldStore};
use stronghold_types::{BuildingQueueItem, Movement, UnitQueueItem};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;

/// Subject carrying new rows.
pub const INSERT_SUBJECT: &str = "stronghold.schedule.insert";

/// Subject carrying cancelled row ids.
pub const REMOVE_SUBJECT: &str = "stronghold.schedule.remove";

/// A freshly stored row announced for scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeRow {
    /// A building level-up was queued.
    Building(BuildingQueueItem),
    /// A recruitment batch was queued.
    Unit(UnitQueueItem),
    /// A movement was dispatched.
    Movement(Movement),
}

impl From<&IntakeRow> for ScheduledItem {
    fn from(row: &IntakeRow) -> Self {
        match row {
            IntakeRow::Building(item) => Self::from(item),
            IntakeRow::Unit(item) => Self::from(item),
            IntakeRow::Movement(movement) => Self::from(movement),
        }
    }
}

/// Subscribe to both intake subjects and feed the scheduler until the
/// subscriptions end.
///
/// # Errors
///
/// Returns [`EngineError::Nats`] if either subscription cannot be created.
pub async fn spawn_intake<S, N>(
    client: &async_nats::Client,
    scheduler: Arc<EventScheduler<S, N>>,
) -> Result<(), EngineError>
where
    S: WorldStore + 'static,
    N: Notifier + 'static,
{
    let mut inserts = client
        .subscribe(INSERT_SUBJECT.to_owned())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to subscribe to {INSERT_SUBJECT}: {e}"),
        })?;
    let mut removals = client
        .subscribe(REMOVE_SUBJECT.to_owned())
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("failed to subscribe to {REMOVE_SUBJECT}: {e}"),
        })?;

    let insert_target = Arc::clone(&scheduler);
    tokio::spawn(async move {
        while let Some(msg) = inserts.next().await {
            match serde_json::from_slice::<IntakeRow>(&msg.payload) {
                Ok(row) => {
                    let item = ScheduledItem::from(&row);
                    debug!(item_id = %item.id, ends_at = %item.ends_at, "Row scheduled");
                    insert_target.insert(item).await;
                }
                Err(e) => warn!(error = %e, "failed to deserialize intake row"),
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = removals.next().await {
            match serde_json::from_slice::<Vec<Uuid>>(&msg.payload) {
                Ok(ids) => {
                    let removed = scheduler.remove(&ids).await;
                    debug!(requested = ids.len(), removed, "Rows unscheduled");
                }
                Err(e) => warn!(error = %e, "failed to deserialize removal ids"),
            }
        }
    });

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stronghold_core::ItemKind;
    use stronghold_types::{MovementType, TownId};

    use super::*;

    #[test]
    fn building_row_becomes_building_item() {
        let town_id = TownId::new();
        let json = serde_json::json!({
            "kind": "building",
            "id": Uuid::new_v4(),
            "town_id": town_id,
            "name": "wall",
            "level": 2,
            "build_time_secs": 120,
            "ends_at": "2026-06-01T09:02:00Z",
        });
        let row: IntakeRow = serde_json::from_value(json).unwrap();
        let item = ScheduledItem::from(&row);
        assert_eq!(item.kind, ItemKind::Building { town_id });
        assert_eq!(item.ends_at.to_rfc3339(), "2026-06-01T09:02:00+00:00");
    }

    #[test]
    fn movement_row_is_owned_by_destination() {
        let origin = TownId::new();
        let destination = TownId::new();
        let json = serde_json::json!({
            "kind": "movement",
            "id": Uuid::new_v4(),
            "movement_type": "attack",
            "units": { "axe": 50 },
            "haul": { "wood": "0", "clay": "0", "iron": "0" },
            "origin_town_id": origin,
            "destination_town_id": destination,
            "created_at": "2026-06-01T09:00:00Z",
            "ends_at": "2026-06-01T09:30:00Z",
        });
        let row: IntakeRow = serde_json::from_value(json).unwrap();
        let item = ScheduledItem::from(&row);
        assert_eq!(item.owning_town(), destination);
        assert!(matches!(
            item.kind,
            ItemKind::Movement {
                movement_type: MovementType::Attack,
                ..
            }
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = serde_json::json!({ "kind": "trade" });
        assert!(serde_json::from_value::<IntakeRow>(json).is_err());
    }
}

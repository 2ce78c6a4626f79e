//! [`WorldStore`] over `PostgreSQL`.
//!
//! Pending lists come back ordered by `(ends_at, id)`, the same order the
//! scheduler keeps in memory. A town snapshot is read inside one
//! `REPEATABLE READ` transaction so the town and its queues agree with each
//! other. A [`ChangeSet`] is applied inside one transaction: deletions run
//! first and any row that is already gone aborts the whole commit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use stronghold_core::{ChangeSet, StoreError, TownSnapshot, WorldStore};
use stronghold_types::{
    BattleOutcome, BuildingQueueItem, Location, Movement, MovementType, QueueItemId, Report,
    ResourceAmounts, Town, TownId, UnitQueueItem,
};
use uuid::Uuid;

use crate::error::DbError;

const TOWN_COLUMNS: &str = "id, player_id, name, x, y, loyalty, wood, clay, iron, \
     wood_production, clay_production, iron_production, buildings, units, resources_updated_at";

const MOVEMENT_COLUMNS: &str = "id, movement_type, units, haul_wood, haul_clay, haul_iron, \
     origin_town_id, destination_town_id, created_at, ends_at";

/// A [`WorldStore`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgWorldStore {
    pool: PgPool,
}

impl PgWorldStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a town, or overwrite it if the id already exists.
    pub async fn save_town(&self, town: &Town) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        upsert_town(&mut conn, town).await
    }

    /// Add a row to a town's building queue.
    pub async fn enqueue_building(&self, item: &BuildingQueueItem) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO building_queue (id, town_id, name, level, build_time_secs, ends_at)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id.into_inner())
        .bind(item.town_id.into_inner())
        .bind(&item.name)
        .bind(i64::from(item.level))
        .bind(to_i64("build_time_secs", item.build_time_secs)?)
        .bind(item.ends_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Add a row to a town's recruitment queue.
    pub async fn enqueue_units(&self, item: &UnitQueueItem) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO unit_queue (id, town_id, name, amount, recruit_time_secs, ends_at)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id.into_inner())
        .bind(item.town_id.into_inner())
        .bind(&item.name)
        .bind(i64::from(item.amount))
        .bind(to_i64("recruit_time_secs", item.recruit_time_secs)?)
        .bind(item.ends_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dispatch a movement.
    pub async fn insert_movement(&self, movement: &Movement) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        insert_movement(&mut conn, movement).await
    }

    /// Reports in which the town took part, newest first.
    pub async fn reports_for_town(&self, town_id: TownId) -> Result<Vec<Report>, DbError> {
        let rows = sqlx::query_as::<_, ReportRow>(
            r"SELECT id, outcome, origin_town_id, destination_town_id, origin_player_id,
                     destination_player_id, origin, destination, haul, created_at
              FROM reports
              WHERE origin_town_id = $1 OR destination_town_id = $1
              ORDER BY created_at DESC, id",
        )
        .bind(town_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }

    async fn fetch_pending_buildings(&self) -> Result<Vec<BuildingQueueItem>, DbError> {
        let rows = sqlx::query_as::<_, BuildingRow>(
            r"SELECT id, town_id, name, level, build_time_secs, ends_at
              FROM building_queue
              ORDER BY ends_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BuildingRow::into_item).collect()
    }

    async fn fetch_pending_units(&self) -> Result<Vec<UnitQueueItem>, DbError> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r"SELECT id, town_id, name, amount, recruit_time_secs, ends_at
              FROM unit_queue
              ORDER BY ends_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UnitRow::into_item).collect()
    }

    async fn fetch_pending_movements(&self) -> Result<Vec<Movement>, DbError> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements ORDER BY ends_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    async fn fetch_town(&self, town_id: TownId) -> Result<Option<Town>, DbError> {
        let mut conn = self.pool.acquire().await?;
        select_town(&mut conn, town_id.into_inner()).await
    }

    async fn fetch_snapshot(&self, town_id: TownId) -> Result<Option<TownSnapshot>, DbError> {
        let id = town_id.into_inner();
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(town) = select_town(&mut tx, id).await? else {
            return Ok(None);
        };

        let building_queue = sqlx::query_as::<_, BuildingRow>(
            r"SELECT id, town_id, name, level, build_time_secs, ends_at
              FROM building_queue
              WHERE town_id = $1
              ORDER BY ends_at, id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(BuildingRow::into_item)
        .collect::<Result<Vec<_>, _>>()?;

        let unit_queue = sqlx::query_as::<_, UnitRow>(
            r"SELECT id, town_id, name, amount, recruit_time_secs, ends_at
              FROM unit_queue
              WHERE town_id = $1
              ORDER BY ends_at, id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(UnitRow::into_item)
        .collect::<Result<Vec<_>, _>>()?;

        let incoming = movements_where(&mut tx, "destination_town_id", id).await?;
        let outgoing = movements_where(&mut tx, "origin_town_id", id).await?;

        tx.commit().await?;

        Ok(Some(TownSnapshot {
            town,
            building_queue,
            unit_queue,
            incoming,
            outgoing,
        }))
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        for id in &changes.completed_buildings {
            delete_row(&mut tx, "building_queue", id.into_inner()).await?;
        }
        for id in &changes.completed_units {
            delete_row(&mut tx, "unit_queue", id.into_inner()).await?;
        }
        for id in &changes.resolved_movements {
            delete_row(&mut tx, "movements", id.into_inner()).await?;
        }
        for town in &changes.towns {
            upsert_town(&mut tx, town).await?;
        }
        for movement in &changes.created_movements {
            insert_movement(&mut tx, movement).await?;
        }
        for report in &changes.reports {
            insert_report(&mut tx, report).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            towns = changes.towns.len(),
            buildings = changes.completed_buildings.len(),
            units = changes.completed_units.len(),
            resolved = changes.resolved_movements.len(),
            created = changes.created_movements.len(),
            reports = changes.reports.len(),
            "Committed change set"
        );
        Ok(())
    }
}

impl WorldStore for PgWorldStore {
    async fn pending_buildings(&self) -> Result<Vec<BuildingQueueItem>, StoreError> {
        Ok(self.fetch_pending_buildings().await?)
    }

    async fn pending_units(&self) -> Result<Vec<UnitQueueItem>, StoreError> {
        Ok(self.fetch_pending_units().await?)
    }

    async fn pending_movements(&self) -> Result<Vec<Movement>, StoreError> {
        Ok(self.fetch_pending_movements().await?)
    }

    async fn load_town_snapshot(&self, town_id: TownId) -> Result<Option<TownSnapshot>, StoreError> {
        Ok(self.fetch_snapshot(town_id).await?)
    }

    async fn load_town(&self, town_id: TownId) -> Result<Option<Town>, StoreError> {
        Ok(self.fetch_town(town_id).await?)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        Ok(self.apply(&changes).await?)
    }
}

// ---------------------------------------------------------------------------
// Statements shared by pool and transaction paths
// ---------------------------------------------------------------------------

async fn select_town(conn: &mut PgConnection, id: Uuid) -> Result<Option<Town>, DbError> {
    sqlx::query_as::<_, TownRow>(&format!("SELECT {TOWN_COLUMNS} FROM towns WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(TownRow::into_town)
        .transpose()
}

async fn movements_where(
    conn: &mut PgConnection,
    column: &'static str,
    id: Uuid,
) -> Result<Vec<Movement>, DbError> {
    sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE {column} = $1 ORDER BY ends_at, id"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(MovementRow::into_movement)
    .collect()
}

async fn delete_row(conn: &mut PgConnection, table: &'static str, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::MissingRow {
            entity: table,
            id: id.to_string(),
        });
    }
    Ok(())
}

async fn upsert_town(conn: &mut PgConnection, town: &Town) -> Result<(), DbError> {
    sqlx::query(&format!(
        r"INSERT INTO towns ({TOWN_COLUMNS})
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
          ON CONFLICT (id) DO UPDATE SET
              player_id = EXCLUDED.player_id,
              name = EXCLUDED.name,
              x = EXCLUDED.x,
              y = EXCLUDED.y,
              loyalty = EXCLUDED.loyalty,
              wood = EXCLUDED.wood,
              clay = EXCLUDED.clay,
              iron = EXCLUDED.iron,
              wood_production = EXCLUDED.wood_production,
              clay_production = EXCLUDED.clay_production,
              iron_production = EXCLUDED.iron_production,
              buildings = EXCLUDED.buildings,
              units = EXCLUDED.units,
              resources_updated_at = EXCLUDED.resources_updated_at"
    ))
    .bind(town.id.into_inner())
    .bind(town.player_id.map(stronghold_types::PlayerId::into_inner))
    .bind(&town.name)
    .bind(town.location.x)
    .bind(town.location.y)
    .bind(i64::from(town.loyalty))
    .bind(town.resources.wood)
    .bind(town.resources.clay)
    .bind(town.resources.iron)
    .bind(town.production.wood)
    .bind(town.production.clay)
    .bind(town.production.iron)
    .bind(serde_json::to_value(&town.buildings)?)
    .bind(serde_json::to_value(&town.units)?)
    .bind(town.resources_updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_movement(conn: &mut PgConnection, movement: &Movement) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO movements ({MOVEMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(movement.id.into_inner())
    .bind(movement.movement_type.as_str())
    .bind(serde_json::to_value(&movement.units)?)
    .bind(movement.haul.wood)
    .bind(movement.haul.clay)
    .bind(movement.haul.iron)
    .bind(movement.origin_town_id.into_inner())
    .bind(movement.destination_town_id.into_inner())
    .bind(movement.created_at)
    .bind(movement.ends_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_report(conn: &mut PgConnection, report: &Report) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO reports (id, outcome, origin_town_id, destination_town_id, origin_player_id,
                               destination_player_id, origin, destination, haul, created_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(report.id.into_inner())
    .bind(outcome_to_db(report.outcome))
    .bind(report.origin_town_id.into_inner())
    .bind(report.destination_town_id.into_inner())
    .bind(report.origin_player_id.map(stronghold_types::PlayerId::into_inner))
    .bind(report.destination_player_id.map(stronghold_types::PlayerId::into_inner))
    .bind(serde_json::to_value(&report.origin)?)
    .bind(serde_json::to_value(&report.destination)?)
    .bind(serde_json::to_value(report.haul)?)
    .bind(report.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct TownRow {
    id: Uuid,
    player_id: Option<Uuid>,
    name: String,
    x: i32,
    y: i32,
    loyalty: i64,
    wood: Decimal,
    clay: Decimal,
    iron: Decimal,
    wood_production: Decimal,
    clay_production: Decimal,
    iron_production: Decimal,
    buildings: serde_json::Value,
    units: serde_json::Value,
    resources_updated_at: DateTime<Utc>,
}

impl TownRow {
    fn into_town(self) -> Result<Town, DbError> {
        Ok(Town {
            id: TownId::from(self.id),
            player_id: self.player_id.map(Into::into),
            name: self.name,
            location: Location {
                x: self.x,
                y: self.y,
            },
            loyalty: to_u32("loyalty", self.loyalty)?,
            resources: ResourceAmounts::new(self.wood, self.clay, self.iron),
            production: ResourceAmounts::new(
                self.wood_production,
                self.clay_production,
                self.iron_production,
            ),
            buildings: serde_json::from_value(self.buildings)?,
            units: serde_json::from_value(self.units)?,
            resources_updated_at: self.resources_updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BuildingRow {
    id: Uuid,
    town_id: Uuid,
    name: String,
    level: i64,
    build_time_secs: i64,
    ends_at: DateTime<Utc>,
}

impl BuildingRow {
    fn into_item(self) -> Result<BuildingQueueItem, DbError> {
        Ok(BuildingQueueItem {
            id: QueueItemId::from(self.id),
            town_id: TownId::from(self.town_id),
            name: self.name,
            level: to_u32("level", self.level)?,
            build_time_secs: to_u64("build_time_secs", self.build_time_secs)?,
            ends_at: self.ends_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UnitRow {
    id: Uuid,
    town_id: Uuid,
    name: String,
    amount: i64,
    recruit_time_secs: i64,
    ends_at: DateTime<Utc>,
}

impl UnitRow {
    fn into_item(self) -> Result<UnitQueueItem, DbError> {
        Ok(UnitQueueItem {
            id: QueueItemId::from(self.id),
            town_id: TownId::from(self.town_id),
            name: self.name,
            amount: to_u32("amount", self.amount)?,
            recruit_time_secs: to_u64("recruit_time_secs", self.recruit_time_secs)?,
            ends_at: self.ends_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    movement_type: String,
    units: serde_json::Value,
    haul_wood: Decimal,
    haul_clay: Decimal,
    haul_iron: Decimal,
    origin_town_id: Uuid,
    destination_town_id: Uuid,
    created_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl MovementRow {
    fn into_movement(self) -> Result<Movement, DbError> {
        let movement_type = MovementType::parse(&self.movement_type).ok_or_else(|| {
            DbError::conversion("movement_type", format!("unknown type {}", self.movement_type))
        })?;
        Ok(Movement {
            id: self.id.into(),
            movement_type,
            units: serde_json::from_value(self.units)?,
            haul: ResourceAmounts::new(self.haul_wood, self.haul_clay, self.haul_iron),
            origin_town_id: TownId::from(self.origin_town_id),
            destination_town_id: TownId::from(self.destination_town_id),
            created_at: self.created_at,
            ends_at: self.ends_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    outcome: String,
    origin_town_id: Uuid,
    destination_town_id: Uuid,
    origin_player_id: Option<Uuid>,
    destination_player_id: Option<Uuid>,
    origin: serde_json::Value,
    destination: serde_json::Value,
    haul: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_report(self) -> Result<Report, DbError> {
        Ok(Report {
            id: self.id.into(),
            outcome: outcome_from_db(&self.outcome)?,
            origin_town_id: TownId::from(self.origin_town_id),
            destination_town_id: TownId::from(self.destination_town_id),
            origin_player_id: self.origin_player_id.map(Into::into),
            destination_player_id: self.destination_player_id.map(Into::into),
            origin: serde_json::from_value(self.origin)?,
            destination: serde_json::from_value(self.destination)?,
            haul: serde_json::from_value(self.haul)?,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

const fn outcome_to_db(outcome: BattleOutcome) -> &'static str {
    match outcome {
        BattleOutcome::AttackerWon => "attacker_won",
        BattleOutcome::DefenderWon => "defender_won",
    }
}

fn outcome_from_db(raw: &str) -> Result<BattleOutcome, DbError> {
    match raw {
        "attacker_won" => Ok(BattleOutcome::AttackerWon),
        "defender_won" => Ok(BattleOutcome::DefenderWon),
        other => Err(DbError::conversion("outcome", format!("unknown outcome {other}"))),
    }
}

fn to_u32(column: &'static str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|e| DbError::conversion(column, e))
}

fn to_u64(column: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::conversion(column, e))
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|e| DbError::conversion(column, e))
}

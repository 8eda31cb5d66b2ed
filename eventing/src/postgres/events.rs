use super::{PgEventStore, to_u32};
use crate::error::{EventingError, EventingResult};
use crate::store::{
    DomainEventRecord, DomainEventStore, IntegrationEventRecord, IntegrationEventStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct DomainEventRow {
    id: Uuid,
    aggregate_id: String,
    event_type: String,
    data: Value,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<DomainEventRow> for DomainEventRecord {
    type Error = EventingError;

    fn try_from(row: DomainEventRow) -> EventingResult<Self> {
        Ok(Self {
            id: row.id,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            data: row.data,
            version: u64::try_from(row.version).map_err(|_| EventingError::Database {
                reason: format!("negative value in column version: {}", row.version),
            })?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IntegrationEventRow {
    id: Uuid,
    event_type: String,
    data: Value,
    version: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<IntegrationEventRow> for IntegrationEventRecord {
    type Error = EventingError;

    fn try_from(row: IntegrationEventRow) -> EventingResult<Self> {
        Ok(Self {
            id: row.id,
            event_type: row.event_type,
            data: row.data,
            version: to_u32(row.version, "version")?,
            created_at: row.created_at,
        })
    }
}

fn into_records<R, T>(rows: Vec<R>) -> EventingResult<Vec<T>>
where
    T: TryFrom<R, Error = EventingError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl DomainEventStore for PgEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> EventingResult<DomainEventRecord> {
        // 版本号在同一条语句内计算；并发写入同一聚合时由唯一约束拒绝后写者
        let inserted = sqlx::query_as::<_, DomainEventRow>(
            "INSERT INTO domain_events (id, aggregate_id, event_type, data, version, created_at) \
             SELECT $1, $2, $3, $4, COALESCE(MAX(version), 0) + 1, $5 \
             FROM domain_events WHERE aggregate_id = $2 \
             RETURNING id, aggregate_id, event_type, data, version, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(aggregate_id)
        .bind(event_type)
        .bind(&data)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let (current,): (Option<i64>,) = sqlx::query_as(
                    "SELECT MAX(version) FROM domain_events WHERE aggregate_id = $1",
                )
                .bind(aggregate_id)
                .fetch_one(&self.pool)
                .await?;
                Err(EventingError::VersionConflict {
                    aggregate_id: aggregate_id.to_string(),
                    version: current.unwrap_or_default().max(0) as u64,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load(
        &self,
        aggregate_id: &str,
        from_version: Option<u64>,
    ) -> EventingResult<Vec<DomainEventRecord>> {
        let from = i64::try_from(from_version.unwrap_or(0)).unwrap_or(i64::MAX);
        let rows: Vec<DomainEventRow> = sqlx::query_as(
            "SELECT id, aggregate_id, event_type, data, version, created_at \
             FROM domain_events WHERE aggregate_id = $1 AND version >= $2 \
             ORDER BY version ASC",
        )
        .bind(aggregate_id)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }
}

#[async_trait]
impl IntegrationEventStore for PgEventStore {
    async fn append(&self, record: IntegrationEventRecord) -> EventingResult<()> {
        sqlx::query(
            "INSERT INTO integration_events (id, event_type, data, version, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(&record.event_type)
        .bind(&record.data)
        .bind(record.version as i32)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn by_type(&self, event_type: &str) -> EventingResult<Vec<IntegrationEventRecord>> {
        let rows: Vec<IntegrationEventRow> = sqlx::query_as(
            "SELECT id, event_type, data, version, created_at FROM integration_events \
             WHERE event_type = $1 ORDER BY created_at ASC",
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn by_type_between(
        &self,
        event_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        let rows: Vec<IntegrationEventRow> = sqlx::query_as(
            "SELECT id, event_type, data, version, created_at FROM integration_events \
             WHERE event_type = $1 AND created_at >= $2 AND created_at <= $3 \
             ORDER BY created_at ASC",
        )
        .bind(event_type)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        let rows: Vec<IntegrationEventRow> = sqlx::query_as(
            "SELECT id, event_type, data, version, created_at FROM integration_events \
             WHERE created_at >= $1 AND created_at <= $2 \
             ORDER BY created_at ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }
}

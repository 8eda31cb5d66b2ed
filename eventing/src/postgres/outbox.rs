use super::{PgEventStore, to_u32};
use crate::config::DeadLetterPolicy;
use crate::error::{EventingError, EventingResult};
use crate::outbox::{OutboxMessage, OutboxStatus, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

const COLUMNS: &str = "id, event_type, event_version, event_data, source, created_at, \
                       processed_at, retry_count, error, status";

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    event_type: String,
    event_version: i32,
    event_data: Value,
    source: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    error: Option<String>,
    status: String,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = EventingError;

    fn try_from(row: OutboxRow) -> EventingResult<Self> {
        Ok(Self {
            id: row.id,
            event_type: row.event_type,
            event_version: to_u32(row.event_version, "event_version")?,
            event_data: row.event_data,
            source: row.source,
            created_at: row.created_at,
            processed_at: row.processed_at,
            retry_count: to_u32(row.retry_count, "retry_count")?,
            error: row.error,
            status: row.status.parse().map_err(EventingError::outbox_store)?,
        })
    }
}

fn into_messages(rows: Vec<OutboxRow>) -> EventingResult<Vec<OutboxMessage>> {
    rows.into_iter().map(OutboxMessage::try_from).collect()
}

impl PgEventStore {
    async fn exists(&self, id: Uuid) -> EventingResult<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM outbox_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn ensure_exists(&self, id: Uuid) -> EventingResult<()> {
        if self.exists(id).await? {
            Ok(())
        } else {
            Err(EventingError::NotFound { id })
        }
    }
}

#[async_trait]
impl OutboxStore for PgEventStore {
    async fn append(&self, message: OutboxMessage) -> EventingResult<()> {
        sqlx::query(
            "INSERT INTO outbox_messages (id, event_type, event_version, event_data, source, \
             created_at, processed_at, retry_count, error, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(message.id)
        .bind(&message.event_type)
        .bind(message.event_version as i32)
        .bind(&message.event_data)
        .bind(&message.source)
        .bind(message.created_at)
        .bind(message.processed_at)
        .bind(message.retry_count as i32)
        .bind(&message.error)
        .bind(message.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EventingResult<Option<OutboxMessage>> {
        let row: Option<OutboxRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM outbox_messages WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(OutboxMessage::try_from).transpose()
    }

    async fn fetch_pending(&self, limit: usize) -> EventingResult<Vec<OutboxMessage>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM outbox_messages \
             WHERE status = 'pending' AND processed_at IS NULL \
             ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        into_messages(rows)
    }

    async fn mark_processed(&self, id: Uuid, processed_at: DateTime<Utc>) -> EventingResult<()> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET processed_at = $2, status = 'processed' \
             WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_exists(id).await?;
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_retries: u32,
        dead_letter: DeadLetterPolicy,
    ) -> EventingResult<OutboxMessage> {
        let row: Option<OutboxRow> = sqlx::query_as(&format!(
            "UPDATE outbox_messages SET \
                 retry_count = retry_count + 1, \
                 error = $2, \
                 status = CASE WHEN $4 AND retry_count + 1 >= $3 THEN 'failed' ELSE status END \
             WHERE id = $1 AND processed_at IS NULL \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(reason)
        .bind(i32::try_from(max_retries).unwrap_or(i32::MAX))
        .bind(dead_letter == DeadLetterPolicy::Quarantine)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            // 已处理的消息不再变更，返回当前状态
            None => self.get(id).await?.ok_or(EventingError::NotFound { id }),
        }
    }

    async fn fetch_exceeded(&self, max_retries: u32) -> EventingResult<Vec<OutboxMessage>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM outbox_messages \
             WHERE processed_at IS NULL AND retry_count >= $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(i32::try_from(max_retries).unwrap_or(i32::MAX))
        .fetch_all(&self.pool)
        .await?;
        into_messages(rows)
    }

    async fn requeue(&self, id: Uuid) -> EventingResult<()> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET status = 'pending' WHERE id = $1 AND status = 'failed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_exists(id).await?;
        }
        Ok(())
    }
}

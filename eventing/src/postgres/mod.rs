//! 基于 sqlx 的 Postgres 存储实现（feature = "infra-sqlx"）
//!
//! `PgEventStore` 同时实现 `OutboxStore`、`DomainEventStore` 与 `IntegrationEventStore`，
//! 表结构见 `migrations/0001_eventing.sql`。每次操作从连接池获取连接，用完即还。
//!
mod events;
mod outbox;

use crate::error::EventingResult;
use sqlx::PgPool;

const SCHEMA: &str = include_str!("../../migrations/0001_eventing.sql");

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> EventingResult<Self> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 建表（幂等）
    pub async fn migrate(&self) -> EventingResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn to_u32(value: i32, column: &str) -> EventingResult<u32> {
    u32::try_from(value).map_err(|_| crate::error::EventingError::Database {
        reason: format!("negative value in column {column}: {value}"),
    })
}

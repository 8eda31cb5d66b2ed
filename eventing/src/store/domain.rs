use super::{EventRecord, StoredEvent};
use crate::error::EventingResult;
use crate::event::DomainEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 领域事件存储行；`(aggregate_id, version)` 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEventRecord {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub data: Value,
    /// 聚合内版本号，从 1 开始
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl EventRecord for DomainEventRecord {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_type(&self) -> &str {
        &self.event_type
    }
}

#[async_trait]
pub trait DomainEventStore: Send + Sync {
    /// 追加一条记录，版本号为该聚合现有最大版本 + 1
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> EventingResult<DomainEventRecord>;

    /// 按版本升序读取；`from_version` 为包含下界
    async fn load(
        &self,
        aggregate_id: &str,
        from_version: Option<u64>,
    ) -> EventingResult<Vec<DomainEventRecord>>;
}

#[async_trait]
impl<T> DomainEventStore for Arc<T>
where
    T: DomainEventStore + ?Sized,
{
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> EventingResult<DomainEventRecord> {
        (**self)
            .append(aggregate_id, event_type, data, created_at)
            .await
    }

    async fn load(
        &self,
        aggregate_id: &str,
        from_version: Option<u64>,
    ) -> EventingResult<Vec<DomainEventRecord>> {
        (**self).load(aggregate_id, from_version).await
    }
}

#[async_trait]
pub trait DomainEventStoreExt: DomainEventStore {
    /// 序列化并持久化领域事件
    async fn save<E: DomainEvent>(&self, event: &E) -> EventingResult<DomainEventRecord> {
        let data = serde_json::to_value(event)?;
        self.append(event.aggregate_id(), event.event_type(), data, event.occurred_on())
            .await
    }

    async fn get_events<E: DomainEvent>(
        &self,
        aggregate_id: &str,
    ) -> EventingResult<Vec<StoredEvent<E, DomainEventRecord>>> {
        let records = self.load(aggregate_id, None).await?;
        Ok(records.into_iter().map(decode).collect())
    }

    async fn get_events_from<E: DomainEvent>(
        &self,
        aggregate_id: &str,
        from_version: u64,
    ) -> EventingResult<Vec<StoredEvent<E, DomainEventRecord>>> {
        let records = self.load(aggregate_id, Some(from_version)).await?;
        Ok(records.into_iter().map(decode).collect())
    }

    /// 快照暂未实现，始终返回 `None`
    async fn get_latest_snapshot<T>(&self, _aggregate_id: &str) -> EventingResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        Ok(None)
    }
}

#[async_trait]
impl<T> DomainEventStoreExt for T where T: DomainEventStore + ?Sized {}

fn decode<E: DomainEvent>(record: DomainEventRecord) -> StoredEvent<E, DomainEventRecord> {
    match serde_json::from_value::<E>(record.data.clone()) {
        Ok(event) => StoredEvent::Decoded { record, event },
        Err(err) => StoredEvent::Corrupt {
            record,
            reason: err.to_string(),
        },
    }
}

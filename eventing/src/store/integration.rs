use super::{EventRecord, StoredEvent};
use crate::error::EventingResult;
use crate::event::{IntegrationEvent, SerializedEvent};
use crate::versioning::EventVersionManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 集成事件存储行（发布时写入，此后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEventRecord {
    pub id: Uuid,
    pub event_type: String,
    pub data: Value,
    /// 事件结构版本
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl IntegrationEventRecord {
    pub fn from_event<E: IntegrationEvent>(event: &E) -> EventingResult<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            event_type: E::EVENT_TYPE.to_string(),
            data: serde_json::to_value(event)?,
            version: E::VERSION,
            created_at: Utc::now(),
        })
    }

    pub fn to_serialized(&self) -> SerializedEvent {
        SerializedEvent::new(self.event_type.clone(), self.version, self.data.clone())
    }
}

impl EventRecord for IntegrationEventRecord {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_type(&self) -> &str {
        &self.event_type
    }
}

/// 集成事件存储；时间范围为闭区间，结果按 `created_at` 升序
#[async_trait]
pub trait IntegrationEventStore: Send + Sync {
    async fn append(&self, record: IntegrationEventRecord) -> EventingResult<()>;

    async fn by_type(&self, event_type: &str) -> EventingResult<Vec<IntegrationEventRecord>>;

    async fn by_type_between(
        &self,
        event_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>>;

    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>>;
}

#[async_trait]
impl<T> IntegrationEventStore for Arc<T>
where
    T: IntegrationEventStore + ?Sized,
{
    async fn append(&self, record: IntegrationEventRecord) -> EventingResult<()> {
        (**self).append(record).await
    }

    async fn by_type(&self, event_type: &str) -> EventingResult<Vec<IntegrationEventRecord>> {
        (**self).by_type(event_type).await
    }

    async fn by_type_between(
        &self,
        event_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        (**self).by_type_between(event_type, from, to).await
    }

    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        (**self).between(from, to).await
    }
}

#[async_trait]
pub trait IntegrationEventStoreExt: IntegrationEventStore {
    async fn save<E: IntegrationEvent>(&self, event: &E) -> EventingResult<IntegrationEventRecord> {
        let record = IntegrationEventRecord::from_event(event)?;
        self.append(record.clone()).await?;
        Ok(record)
    }

    /// 读取并解码某类型的全部事件；提供 `versions` 时先迁移到 `E::VERSION`
    async fn get_by_type<E: IntegrationEvent>(
        &self,
        versions: Option<&EventVersionManager>,
    ) -> EventingResult<Vec<StoredEvent<E, IntegrationEventRecord>>> {
        let records = self.by_type(E::EVENT_TYPE).await?;
        Ok(records.into_iter().map(|r| decode(r, versions)).collect())
    }

    async fn get_by_type_between<E: IntegrationEvent>(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        versions: Option<&EventVersionManager>,
    ) -> EventingResult<Vec<StoredEvent<E, IntegrationEventRecord>>> {
        let records = self.by_type_between(E::EVENT_TYPE, from, to).await?;
        Ok(records.into_iter().map(|r| decode(r, versions)).collect())
    }
}

#[async_trait]
impl<T> IntegrationEventStoreExt for T where T: IntegrationEventStore + ?Sized {}

fn decode<E: IntegrationEvent>(
    record: IntegrationEventRecord,
    versions: Option<&EventVersionManager>,
) -> StoredEvent<E, IntegrationEventRecord> {
    let payload = match versions {
        Some(versions) => versions
            .migrate(record.to_serialized(), E::VERSION)
            .map(SerializedEvent::into_payload),
        None => Ok(record.data.clone()),
    };

    match payload.and_then(|p| serde_json::from_value::<E>(p).map_err(Into::into)) {
        Ok(event) => StoredEvent::Decoded { record, event },
        Err(err) => StoredEvent::Corrupt {
            record,
            reason: err.to_string(),
        },
    }
}

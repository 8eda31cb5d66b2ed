//! 事件存储（Event Store）
//!
//! 两类只追加日志：
//! - 领域事件：按聚合 ID 分组，聚合内版本号单调递增，用于有序回放；
//! - 集成事件：按类型与创建时间查询，作为跨模块投递的审计记录。
//!
//! 读取时逐条解码为 `StoredEvent`：解码失败的记录以 `Corrupt` 形式保留，
//! 由调用方决定上报、隔离还是忽略。
//!
mod domain;
mod integration;
mod memory;

pub use domain::{DomainEventRecord, DomainEventStore, DomainEventStoreExt};
pub use integration::{IntegrationEventRecord, IntegrationEventStore, IntegrationEventStoreExt};
pub use memory::{InMemoryDomainEventStore, InMemoryIntegrationEventStore};

use tracing::warn;
use uuid::Uuid;

/// 事件存储记录的公共元信息
pub trait EventRecord {
    fn record_id(&self) -> Uuid;

    fn record_type(&self) -> &str;
}

/// 类型化读取结果
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEvent<E, R> {
    Decoded { record: R, event: E },
    Corrupt { record: R, reason: String },
}

impl<E, R> StoredEvent<E, R> {
    pub fn record(&self) -> &R {
        match self {
            StoredEvent::Decoded { record, .. } | StoredEvent::Corrupt { record, .. } => record,
        }
    }

    pub fn event(&self) -> Option<&E> {
        match self {
            StoredEvent::Decoded { event, .. } => Some(event),
            StoredEvent::Corrupt { .. } => None,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoredEvent::Corrupt { .. })
    }
}

impl<E, R: EventRecord> StoredEvent<E, R> {
    /// 只保留成功解码的事件；损坏记录记 warn 日志后跳过
    pub fn into_decoded(items: Vec<Self>) -> Vec<E> {
        items
            .into_iter()
            .filter_map(|item| match item {
                StoredEvent::Decoded { event, .. } => Some(event),
                StoredEvent::Corrupt { record, reason } => {
                    warn!(
                        record_id = %record.record_id(),
                        event_type = record.record_type(),
                        reason = %reason,
                        "skipping corrupt event record"
                    );
                    None
                }
            })
            .collect()
    }
}

//! 集成事件总线（IntegrationEventBus）
//!
//! 跨模块事件的持久化写入路径：先写 Outbox，再写集成事件存储，
//! 实际投递交由 Outbox 处理循环完成。两次写入不在同一事务中，
//! Outbox 行是投递的唯一依据。
//!
use crate::error::EventingResult;
use crate::event::IntegrationEvent;
use crate::outbox::{OutboxMessage, OutboxStore};
use crate::store::{IntegrationEventRecord, IntegrationEventStore};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 集成事件存储写入失败时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuditWritePolicy {
    /// 错误返回给调用方（此时 Outbox 行可能已提交）
    #[default]
    Required,
    /// 记录 warn 日志后视为发布成功
    BestEffort,
}

#[derive(Clone)]
pub struct IntegrationEventBus {
    outbox: Arc<dyn OutboxStore>,
    store: Arc<dyn IntegrationEventStore>,
    source: String,
    audit: AuditWritePolicy,
}

impl IntegrationEventBus {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        store: Arc<dyn IntegrationEventStore>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            outbox,
            store,
            source: source.into(),
            audit: AuditWritePolicy::default(),
        }
    }

    pub fn with_audit_policy(mut self, audit: AuditWritePolicy) -> Self {
        self.audit = audit;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 持久化一条集成事件，返回 Outbox 消息 ID。
    /// 返回错误只表示“不保证投递”，不代表一定未投递。
    pub async fn publish<E: IntegrationEvent>(&self, event: &E) -> EventingResult<Uuid> {
        let message = OutboxMessage::from_event(event, self.source.as_str())?;
        let record = IntegrationEventRecord {
            id: Uuid::now_v7(),
            event_type: message.event_type.clone(),
            data: message.event_data.clone(),
            version: message.event_version,
            created_at: message.created_at,
        };
        let id = message.id;

        self.outbox.append(message).await?;

        if let Err(err) = self.store.append(record).await {
            match self.audit {
                AuditWritePolicy::Required => return Err(err),
                AuditWritePolicy::BestEffort => warn!(
                    message_id = %id,
                    event_type = E::EVENT_TYPE,
                    error = %err,
                    "integration event audit write failed, outbox row kept"
                ),
            }
        }

        debug!(
            message_id = %id,
            event_type = E::EVENT_TYPE,
            source = %self.source,
            "integration event published"
        );
        Ok(id)
    }

    /// 逐条发布，遇到第一个错误即停止（非原子：之前的事件已持久化）
    pub async fn publish_batch<E: IntegrationEvent>(&self, events: &[E]) -> EventingResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(self.publish(event).await?);
        }
        Ok(ids)
    }
}

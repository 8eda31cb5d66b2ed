//! Outbox 存储协议（OutboxStore）
//!
//! Outbox 表是集成事件的持久化交付账本：消息只追加、只做状态推进，永不删除。
//!
use super::OutboxMessage;
use crate::config::DeadLetterPolicy;
use crate::error::EventingResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 持久写入一条新消息
    async fn append(&self, message: OutboxMessage) -> EventingResult<()>;

    async fn get(&self, id: Uuid) -> EventingResult<Option<OutboxMessage>>;

    /// 状态为 `Pending` 的消息，按 `created_at` 升序，最多 `limit` 条
    async fn fetch_pending(&self, limit: usize) -> EventingResult<Vec<OutboxMessage>>;

    /// 标记投递成功；重复标记保留首次时间戳
    async fn mark_processed(&self, id: Uuid, processed_at: DateTime<Utc>) -> EventingResult<()>;

    /// 记录一次失败：`retry_count + 1`、写入 `error`；
    /// `Quarantine` 策略下达到 `max_retries` 时转入 `Failed`。返回更新后的消息。
    async fn record_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_retries: u32,
        dead_letter: DeadLetterPolicy,
    ) -> EventingResult<OutboxMessage>;

    /// 尚未投递且 `retry_count >= max_retries` 的消息（死信）
    async fn fetch_exceeded(&self, max_retries: u32) -> EventingResult<Vec<OutboxMessage>>;

    /// 人工操作：`Failed -> Pending`，保留重试计数与错误信息
    async fn requeue(&self, id: Uuid) -> EventingResult<()>;
}

#[async_trait]
impl<T> OutboxStore for Arc<T>
where
    T: OutboxStore + ?Sized,
{
    async fn append(&self, message: OutboxMessage) -> EventingResult<()> {
        (**self).append(message).await
    }

    async fn get(&self, id: Uuid) -> EventingResult<Option<OutboxMessage>> {
        (**self).get(id).await
    }

    async fn fetch_pending(&self, limit: usize) -> EventingResult<Vec<OutboxMessage>> {
        (**self).fetch_pending(limit).await
    }

    async fn mark_processed(&self, id: Uuid, processed_at: DateTime<Utc>) -> EventingResult<()> {
        (**self).mark_processed(id, processed_at).await
    }

    async fn record_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_retries: u32,
        dead_letter: DeadLetterPolicy,
    ) -> EventingResult<OutboxMessage> {
        (**self)
            .record_failure(id, reason, max_retries, dead_letter)
            .await
    }

    async fn fetch_exceeded(&self, max_retries: u32) -> EventingResult<Vec<OutboxMessage>> {
        (**self).fetch_exceeded(max_retries).await
    }

    async fn requeue(&self, id: Uuid) -> EventingResult<()> {
        (**self).requeue(id).await
    }
}

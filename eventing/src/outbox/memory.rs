use super::{OutboxMessage, OutboxStatus, OutboxStore};
use crate::config::DeadLetterPolicy;
use crate::error::{EventingError, EventingResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// 进程内 Outbox（测试与 demo 使用），按插入顺序保存全部消息
#[derive(Default)]
pub struct InMemoryOutboxStore {
    messages: Mutex<Vec<OutboxMessage>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前全部消息的快照
    pub fn snapshot(&self) -> Vec<OutboxMessage> {
        self.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn lock(&self) -> EventingResult<std::sync::MutexGuard<'_, Vec<OutboxMessage>>> {
        self.messages
            .lock()
            .map_err(|_| EventingError::outbox_store("outbox mutex poisoned"))
    }

    fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut OutboxMessage) -> T,
    ) -> EventingResult<T> {
        let mut messages = self.lock()?;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(EventingError::NotFound { id })?;
        Ok(f(message))
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, message: OutboxMessage) -> EventingResult<()> {
        let mut messages = self.lock()?;
        if messages.iter().any(|m| m.id == message.id) {
            return Err(EventingError::outbox_store(format!(
                "duplicate outbox message id: {}",
                message.id
            )));
        }
        messages.push(message);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EventingResult<Option<OutboxMessage>> {
        Ok(self.lock()?.iter().find(|m| m.id == id).cloned())
    }

    async fn fetch_pending(&self, limit: usize) -> EventingResult<Vec<OutboxMessage>> {
        let mut pending: Vec<OutboxMessage> = self
            .lock()?
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        // 稳定排序：同一时间戳保持插入顺序
        pending.sort_by_key(|m| m.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processed(&self, id: Uuid, processed_at: DateTime<Utc>) -> EventingResult<()> {
        self.update(id, |m| {
            if m.processed_at.is_none() {
                m.processed_at = Some(processed_at);
                m.status = OutboxStatus::Processed;
            }
        })
    }

    async fn record_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_retries: u32,
        dead_letter: DeadLetterPolicy,
    ) -> EventingResult<OutboxMessage> {
        self.update(id, |m| {
            if m.processed_at.is_none() {
                m.retry_count += 1;
                m.error = Some(reason.to_string());
                if dead_letter == DeadLetterPolicy::Quarantine && m.retry_count >= max_retries {
                    m.status = OutboxStatus::Failed;
                }
            }
            m.clone()
        })
    }

    async fn fetch_exceeded(&self, max_retries: u32) -> EventingResult<Vec<OutboxMessage>> {
        let mut exceeded: Vec<OutboxMessage> = self
            .lock()?
            .iter()
            .filter(|m| m.has_exceeded(max_retries))
            .cloned()
            .collect();
        exceeded.sort_by_key(|m| m.created_at);
        Ok(exceeded)
    }

    async fn requeue(&self, id: Uuid) -> EventingResult<()> {
        self.update(id, |m| {
            if m.status == OutboxStatus::Failed {
                m.status = OutboxStatus::Pending;
            }
        })
    }
}

//! 事件分发器（EventDispatcher）
//!
//! 进程内发布的唯一入口：直接转交给 `EventQueue::enqueue`，
//! 不校验、不转换、不持久化。需要持久化的调用方（如集成事件总线）必须先落库再发布。
//!
use super::queue::{Enqueued, EventQueue};
use crate::error::{EventingError, EventingResult};
use crate::event::{Event, QueuedEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// 分发协议：把已类型擦除的事件交给处理管道
#[async_trait]
pub trait EventDispatch: Send + Sync {
    async fn dispatch(&self, event: QueuedEvent) -> EventingResult<()>;
}

#[async_trait]
impl<T> EventDispatch for Arc<T>
where
    T: EventDispatch + ?Sized,
{
    async fn dispatch(&self, event: QueuedEvent) -> EventingResult<()> {
        (**self).dispatch(event).await
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    queue: Arc<EventQueue>,
}

impl EventDispatcher {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// 进程内、尽力而为的发布
    pub async fn publish<E: Event>(&self, event: E) -> EventingResult<()> {
        self.queue.enqueue(QueuedEvent::new(event)).await
    }
}

/// 重新注入路径（Outbox）使用：写满丢弃视为失败，由调用方重试
#[async_trait]
impl EventDispatch for EventDispatcher {
    async fn dispatch(&self, event: QueuedEvent) -> EventingResult<()> {
        match self.queue.offer(event).await? {
            Enqueued::Accepted => Ok(()),
            Enqueued::Dropped => Err(EventingError::QueueFull {
                capacity: self.queue.capacity().unwrap_or_default(),
            }),
        }
    }
}

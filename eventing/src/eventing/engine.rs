//! 事件引擎（EventEngine）
//!
//! 统一装配内存分发管道与 Outbox 管道，并以两个长驻任务运行：
//! - 事件处理循环：drain 队列并分发到已注册处理器；
//! - Outbox 处理循环：周期轮询 Outbox 并把事件重新注入队列。
//!
//! 两个任务共享同一个取消令牌，由 `EngineHandle` 控制关闭与等待。
//!
use super::{EventDispatcher, EventProcessor, HandlerRegistry, IntegrationEventBus};
use super::queue::EventQueue;
use crate::config::EventingConfig;
use crate::event::EventTypeRegistry;
use crate::outbox::{OutboxProcessor, OutboxStore};
use crate::store::IntegrationEventStore;
use crate::versioning::EventVersionManager;
use bon::bon;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct EventEngine {
    queue: Arc<EventQueue>,
    handlers: Arc<HandlerRegistry>,
    event_types: Arc<EventTypeRegistry>,
    versions: Arc<EventVersionManager>,
    outbox_store: Arc<dyn OutboxStore>,
    integration_store: Arc<dyn IntegrationEventStore>,
    config: EventingConfig,
}

#[bon]
impl EventEngine {
    #[builder]
    pub fn new(
        outbox_store: Arc<dyn OutboxStore>,
        integration_store: Arc<dyn IntegrationEventStore>,
        #[builder(default)] handlers: Arc<HandlerRegistry>,
        #[builder(default)] event_types: Arc<EventTypeRegistry>,
        #[builder(default)] versions: Arc<EventVersionManager>,
        #[builder(default)] config: EventingConfig,
    ) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(config.queue)),
            handlers,
            event_types,
            versions,
            outbox_store,
            integration_store,
            config,
        }
    }
}

impl EventEngine {
    /// 进程内发布入口
    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(self.queue.clone())
    }

    /// 以 `source` 为来源模块的集成事件总线
    pub fn integration_bus(&self, source: impl Into<String>) -> IntegrationEventBus {
        IntegrationEventBus::new(
            self.outbox_store.clone(),
            self.integration_store.clone(),
            source,
        )
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn event_types(&self) -> &EventTypeRegistry {
        &self.event_types
    }

    pub fn config(&self) -> &EventingConfig {
        &self.config
    }

    pub fn event_processor(&self) -> EventProcessor {
        EventProcessor::new(
            self.queue.clone(),
            self.handlers.clone(),
            self.config.handler_concurrency,
        )
    }

    pub fn outbox_processor(&self) -> OutboxProcessor {
        OutboxProcessor::builder()
            .store(self.outbox_store.clone())
            .dispatcher(Arc::new(self.dispatcher()))
            .event_types(self.event_types.clone())
            .versions(self.versions.clone())
            .config(self.config.outbox)
            .build()
    }

    /// 启动两个后台循环，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> EngineHandle {
        let token = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(2);

        {
            let processor = self.event_processor();
            let token = token.clone();
            tasks.push(tokio::spawn(async move { processor.run(token).await }));
        }

        {
            let processor = self.outbox_processor();
            let token = token.clone();
            tasks.push(tokio::spawn(async move { processor.run(token).await }));
        }

        info!(
            handlers = self.handlers.len(),
            queue_capacity = ?self.queue.capacity(),
            "event engine started"
        );
        EngineHandle { token, tasks }
    }
}

/// 引擎运行句柄：用于优雅关闭与等待任务结束；丢弃时自动取消
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
        info!("event engine stopped");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::InMemoryOutboxStore;
    use crate::store::InMemoryIntegrationEventStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct LessonViewed {
        lesson_id: u64,
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatcher_feeds_running_engine() {
        let seen = Arc::new(AtomicUsize::new(0));
        let handlers = Arc::new(HandlerRegistry::new());
        {
            let seen = seen.clone();
            handlers.register_fn("count-views", move |e: LessonViewed| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(e.lesson_id as usize, Ordering::Relaxed);
                    Ok::<_, anyhow::Error>(())
                }
            });
        }

        let engine = Arc::new(
            EventEngine::builder()
                .outbox_store(Arc::new(InMemoryOutboxStore::new()))
                .integration_store(Arc::new(InMemoryIntegrationEventStore::new()))
                .handlers(handlers)
                .build(),
        );
        let dispatcher = engine.dispatcher();
        let handle = engine.start();

        for lesson_id in [1, 2, 3] {
            dispatcher.publish(LessonViewed { lesson_id }).await.unwrap();
        }

        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::Relaxed) < 6 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.shutdown();
        handle.join().await;

        assert_eq!(seen.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn dropping_handle_cancels_loops() {
        let engine = Arc::new(
            EventEngine::builder()
                .outbox_store(Arc::new(InMemoryOutboxStore::new()))
                .integration_store(Arc::new(InMemoryIntegrationEventStore::new()))
                .build(),
        );
        let handle = engine.start();
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}

//! 事件处理循环（EventProcessor）
//!
//! 长驻任务：`Idle -> Draining -> Dispatching -> Idle`，直到收到取消信号。
//! - 每轮调用 `EventQueue::drain_all` 取走全部积压；
//! - 对每个事件按具体类型查找处理器，并发调用并等待全部完成后再处理下一个事件；
//! - 处理器的错误或 panic 只记录日志，不重试，也不影响其他处理器与后续事件；
//! - 无处理器的事件直接丢弃（正常行为）。
//!
use super::handler::{HandlerRegistry, RegisteredHandler};
use super::queue::EventQueue;
use crate::event::QueuedEvent;
use futures_util::{FutureExt, StreamExt, stream};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 单轮分发统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// 本轮取出的事件数
    pub events: usize,
    /// 无处理器而被丢弃的事件数
    pub unhandled: usize,
    /// 处理器调用次数
    pub invocations: usize,
    /// 失败（返回错误或 panic）的调用次数
    pub failures: usize,
}

pub struct EventProcessor {
    queue: Arc<EventQueue>,
    registry: Arc<HandlerRegistry>,
    handler_concurrency: usize,
}

impl EventProcessor {
    pub fn new(
        queue: Arc<EventQueue>,
        registry: Arc<HandlerRegistry>,
        handler_concurrency: usize,
    ) -> Self {
        Self {
            queue,
            registry,
            handler_concurrency: handler_concurrency.max(1),
        }
    }

    /// 循环处理直到取消；进行中的一轮分发在取消时会被中断
    pub async fn run(&self, cancel: CancellationToken) {
        info!("event processing loop started");

        loop {
            let events = self.queue.drain_all(&cancel).await;
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                report = self.dispatch_batch(events) => {
                    debug!(
                        events = report.events,
                        unhandled = report.unhandled,
                        failures = report.failures,
                        "event batch dispatched"
                    );
                }
            }
        }

        info!("event processing loop stopped");
    }

    /// 执行一轮 drain + dispatch
    pub async fn run_once(&self, cancel: &CancellationToken) -> DispatchReport {
        let events = self.queue.drain_all(cancel).await;
        self.dispatch_batch(events).await
    }

    /// 按顺序逐个事件分发；同一事件的多个处理器并发执行
    pub async fn dispatch_batch(&self, events: Vec<QueuedEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for event in events {
            report.events += 1;

            let handlers = self.registry.handlers_for(&event);
            if handlers.is_empty() {
                report.unhandled += 1;
                debug!(event = event.type_name(), "no handler registered, event dropped");
                continue;
            }
            report.invocations += handlers.len();

            let failures = AtomicUsize::new(0);
            stream::iter(handlers)
                .for_each_concurrent(Some(self.handler_concurrency), |h| {
                    let ev = event.clone();
                    let failures = &failures;
                    async move {
                        if !Self::invoke(&h, ev).await {
                            failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
                .await;
            report.failures += failures.into_inner();
        }

        report
    }

    async fn invoke(handler: &RegisteredHandler, event: QueuedEvent) -> bool {
        let type_name = event.type_name();

        match AssertUnwindSafe(handler.invoke(event)).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                error!(
                    handler = handler.name(),
                    event = type_name,
                    error = %err,
                    "event handler failed"
                );
                false
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    handler = handler.name(),
                    event = type_name,
                    reason = %reason,
                    "event handler panicked"
                );
                false
            }
        }
    }
}

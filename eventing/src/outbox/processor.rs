//! Outbox 处理循环（OutboxProcessor）
//!
//! 周期任务：`Idle -> Polling -> Delivering -> Sleeping -> Idle`，直到取消。
//! - 拉取 `Pending` 消息（`created_at` 升序，最多 `batch_size` 条）；
//! - 逐条迁移到当前版本、解码、重新注入内存分发管道，成功后标记已处理；
//! - 解码或分发失败只累加重试计数，消息留在 Outbox 等待下个周期（至少一次）；
//!   队列写满被丢弃（`DropNewest`）同样计为分发失败；
//! - 单条消息的存储错误只记录日志，不中断本批次；
//! - 每个周期结束后报告超出重试上限的死信。
//!
//! 注意：“已处理”只代表成功重新入队，不代表处理器执行成功。
//!
use super::{OutboxMessage, OutboxStatus, OutboxStore};
use crate::config::OutboxConfig;
use crate::error::EventingResult;
use crate::event::EventTypeRegistry;
use crate::eventing::EventDispatch;
use crate::versioning::EventVersionManager;
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单个轮询周期的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// 本周期拉取的消息数
    pub fetched: usize,
    /// 成功重新入队并标记已处理的消息数
    pub delivered: usize,
    /// 解码或分发失败的消息数
    pub failed: usize,
    /// 周期结束时超出重试上限的消息数
    pub exceeded: usize,
}

#[derive(Builder)]
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    dispatcher: Arc<dyn EventDispatch>,
    event_types: Arc<EventTypeRegistry>,
    #[builder(default = Arc::new(EventVersionManager::new()))]
    versions: Arc<EventVersionManager>,
    #[builder(default)]
    config: OutboxConfig,
}

impl OutboxProcessor {
    /// 周期轮询直到取消；单个周期的错误只记录日志
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "outbox processing loop started"
        );

        loop {
            match self.poll(&cancel).await {
                Ok(report) if report.fetched > 0 => debug!(
                    fetched = report.fetched,
                    delivered = report.delivered,
                    failed = report.failed,
                    exceeded = report.exceeded,
                    "outbox poll completed"
                ),
                Ok(_) => {}
                Err(err) => error!(error = %err, "outbox poll failed"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("outbox processing loop stopped");
    }

    /// 执行一个完整的轮询周期
    pub async fn poll_once(&self) -> EventingResult<PollReport> {
        self.poll(&CancellationToken::new()).await
    }

    async fn poll(&self, cancel: &CancellationToken) -> EventingResult<PollReport> {
        let pending = self.store.fetch_pending(self.config.batch_size).await?;
        let mut report = PollReport {
            fetched: pending.len(),
            ..Default::default()
        };

        for message in pending {
            // 队列按 Block 写满时投递会一直等待，需与取消信号竞争；
            // 被中断的消息保持 Pending，下次启动后重新投递
            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(report),
                delivered = self.deliver(&message) => delivered,
            };

            match delivered {
                Ok(()) => match self.store.mark_processed(message.id, Utc::now()).await {
                    Ok(()) => {
                        report.delivered += 1;
                        debug!(
                            message_id = %message.id,
                            event_type = %message.event_type,
                            "outbox message delivered"
                        );
                    }
                    // 事件已入队但未标记：下个周期会再次投递（至少一次）
                    Err(err) => error!(
                        message_id = %message.id,
                        event_type = %message.event_type,
                        error = %err,
                        "failed to mark outbox message processed"
                    ),
                },
                Err(err) => {
                    report.failed += 1;
                    self.record_failure(&message, &err.to_string()).await;
                }
            }
        }

        let exceeded = self.store.fetch_exceeded(self.config.max_retries).await?;
        report.exceeded = exceeded.len();
        for message in &exceeded {
            warn!(
                message_id = %message.id,
                event_type = %message.event_type,
                source = %message.source,
                retry_count = message.retry_count,
                error = message.error.as_deref().unwrap_or_default(),
                "outbox message exceeded max retries"
            );
        }

        Ok(report)
    }

    async fn record_failure(&self, message: &OutboxMessage, reason: &str) {
        let updated = match self
            .store
            .record_failure(
                message.id,
                reason,
                self.config.max_retries,
                self.config.dead_letter,
            )
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                error!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    error = %err,
                    reason,
                    "failed to record outbox delivery failure"
                );
                return;
            }
        };

        warn!(
            message_id = %message.id,
            event_type = %message.event_type,
            retry_count = updated.retry_count,
            error = reason,
            "outbox message delivery failed"
        );
        if updated.status == OutboxStatus::Failed {
            warn!(
                message_id = %message.id,
                event_type = %message.event_type,
                "outbox message moved to dead letter"
            );
        }
    }

    async fn deliver(&self, message: &OutboxMessage) -> EventingResult<()> {
        let event = self
            .event_types
            .rehydrate(message.to_serialized(), &self.versions)?;
        self.dispatcher.dispatch(event).await
    }
}

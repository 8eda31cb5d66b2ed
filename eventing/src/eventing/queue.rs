//! 内存事件队列（EventQueue）
//!
//! 多生产者 / 单消费者的 FIFO 缓冲：
//! - `enqueue`：任意线程并发写入，无需调用方加锁；
//! - `drain_all`：仅由处理循环调用，至少等到一条事件或取消信号，然后一次性取走全部积压。
//!
//! 默认无界（不阻塞、不丢弃）；配置容量后按 `OverflowPolicy` 处理写满。
//!
use crate::config::{OverflowPolicy, QueueConfig};
use crate::error::{EventingError, EventingResult};
use crate::event::QueuedEvent;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

enum Sender {
    Unbounded(mpsc::UnboundedSender<QueuedEvent>),
    Bounded {
        tx: mpsc::Sender<QueuedEvent>,
        capacity: usize,
        overflow: OverflowPolicy,
    },
}

enum Receiver {
    Unbounded(mpsc::UnboundedReceiver<QueuedEvent>),
    Bounded(mpsc::Receiver<QueuedEvent>),
}

impl Receiver {
    async fn recv(&mut self) -> Option<QueuedEvent> {
        match self {
            Receiver::Unbounded(rx) => rx.recv().await,
            Receiver::Bounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<QueuedEvent> {
        match self {
            Receiver::Unbounded(rx) => rx.try_recv().ok(),
            Receiver::Bounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// `offer` 的结果
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// 队列已满，按 `DropNewest` 丢弃
    Dropped,
}

pub struct EventQueue {
    tx: Sender,
    rx: Mutex<Receiver>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl EventQueue {
    pub fn new(config: QueueConfig) -> Self {
        match config.capacity {
            None => Self::unbounded(),
            Some(capacity) => {
                let capacity = capacity.max(1);
                let (tx, rx) = mpsc::channel(capacity);
                Self {
                    tx: Sender::Bounded {
                        tx,
                        capacity,
                        overflow: config.overflow,
                    },
                    rx: Mutex::new(Receiver::Bounded(rx)),
                }
            }
        }
    }

    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Sender::Unbounded(tx),
            rx: Mutex::new(Receiver::Unbounded(rx)),
        }
    }

    /// 队列容量；`None` 表示无界
    pub fn capacity(&self) -> Option<usize> {
        match &self.tx {
            Sender::Unbounded(_) => None,
            Sender::Bounded { capacity, .. } => Some(*capacity),
        }
    }

    /// 追加事件到队尾；`DropNewest` 下被丢弃的事件只记录 warn 日志
    pub async fn enqueue(&self, event: QueuedEvent) -> EventingResult<()> {
        self.offer(event).await.map(|_| ())
    }

    /// 与 `enqueue` 相同，但把写满丢弃作为 `Enqueued::Dropped` 返回给调用方
    pub async fn offer(&self, event: QueuedEvent) -> EventingResult<Enqueued> {
        match &self.tx {
            Sender::Unbounded(tx) => tx
                .send(event)
                .map(|_| Enqueued::Accepted)
                .map_err(|_| EventingError::QueueClosed),
            Sender::Bounded {
                tx,
                capacity,
                overflow,
            } => match overflow {
                OverflowPolicy::Block => tx
                    .send(event)
                    .await
                    .map(|_| Enqueued::Accepted)
                    .map_err(|_| EventingError::QueueClosed),
                OverflowPolicy::DropNewest | OverflowPolicy::Reject => match tx.try_send(event) {
                    Ok(()) => Ok(Enqueued::Accepted),
                    Err(mpsc::error::TrySendError::Full(event)) => {
                        if *overflow == OverflowPolicy::Reject {
                            return Err(EventingError::QueueFull {
                                capacity: *capacity,
                            });
                        }
                        warn!(
                            event = event.type_name(),
                            capacity = *capacity,
                            "event queue full, dropping newest event"
                        );
                        Ok(Enqueued::Dropped)
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => Err(EventingError::QueueClosed),
                },
            },
        }
    }

    /// 等待至少一条事件（或取消），然后返回当前缓冲中的全部事件（到达顺序）。
    /// 取消时返回空集合。
    pub async fn drain_all(&self, cancel: &CancellationToken) -> Vec<QueuedEvent> {
        let mut rx = self.rx.lock().await;

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Vec::new(),
            event = rx.recv() => event,
        };

        let Some(first) = first else {
            return Vec::new();
        };

        let mut batch = vec![first];
        while let Some(event) = rx.try_recv() {
            batch.push(event);
        }
        batch
    }
}

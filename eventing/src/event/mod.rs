//! 事件能力（Event）与队列中的类型擦除事件
//!
//! 任意 `'static + Send + Sync + Debug` 的值都可以作为事件入队；
//! 领域事件（`DomainEvent`）与集成事件（`IntegrationEvent`）在此基础上补充
//! 各自的元信息，供事件存储与 Outbox 使用。

mod registry;
mod serialized;

pub use registry::EventTypeRegistry;
pub use serialized::SerializedEvent;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 可入队的事件
pub trait Event: Any + Send + Sync + fmt::Debug {}

impl<T> Event for T where T: Any + Send + Sync + fmt::Debug {}

/// 领域事件：归属单个聚合，按聚合内版本号有序
pub trait DomainEvent: Event + Serialize + DeserializeOwned + Clone {
    /// 持久化记录中的事件类型
    fn event_type(&self) -> &str;

    fn aggregate_id(&self) -> &str;

    fn occurred_on(&self) -> DateTime<Utc>;
}

/// 集成事件：跨模块传递，携带稳定类型名与结构版本
pub trait IntegrationEvent: Event + Serialize + DeserializeOwned + Clone {
    /// 稳定的类型判别名，与 Rust 类型名无关
    const EVENT_TYPE: &'static str;

    /// 当前结构版本（正整数）
    const VERSION: u32 = 1;

    fn published_at(&self) -> DateTime<Utc>;
}

/// 队列中流转的事件：保留具体类型的 `TypeId`，处理时再安全向下转型
#[derive(Clone)]
pub struct QueuedEvent {
    type_id: TypeId,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl QueuedEvent {
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            payload: Arc::new(event),
        }
    }

    /// 具体事件类型的 `TypeId`（处理器注册表的键）
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

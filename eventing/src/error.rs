//! 事件子系统统一错误定义
//!
//! 覆盖序列化/版本迁移、队列与分发、Outbox 与事件存储、配置解析等最小必要集合，
//! 各实现层统一转换为 `EventingError`。
//!
use thiserror::Error;
use uuid::Uuid;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventingError {
    // --- 序列化/版本迁移 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("unknown event type: {event_type}")]
    UnknownEventType { event_type: String },
    #[error(
        "migration failed: type={event_type}, from_version={from_version}, to_version={to_version}, reason={reason}"
    )]
    MigrationFailed {
        event_type: String,
        from_version: u32,
        to_version: u32,
        reason: String,
    },
    #[error("invalid migration: type={event_type}, {from_version} -> {to_version}")]
    InvalidMigration {
        event_type: String,
        from_version: u32,
        to_version: u32,
    },

    // --- 队列与分发 ---
    #[error("event queue is full: capacity={capacity}")]
    QueueFull { capacity: usize },
    #[error("event queue is closed")]
    QueueClosed,
    #[error("dispatch error: {reason}")]
    Dispatch { reason: String },

    // --- 存储 ---
    #[error("outbox store error: {reason}")]
    OutboxStore { reason: String },
    #[error("event store error: {reason}")]
    EventStore { reason: String },
    #[error("outbox message not found: {id}")]
    NotFound { id: Uuid },
    #[error("version conflict: aggregate={aggregate_id}, version={version}")]
    VersionConflict { aggregate_id: String, version: u64 },
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 配置 ---
    #[error("invalid config: key={key}, reason={reason}")]
    Config { key: String, reason: String },
}

/// 统一 Result 类型别名
pub type EventingResult<T> = Result<T, EventingError>;

impl EventingError {
    pub fn dispatch(reason: impl Into<String>) -> Self {
        Self::Dispatch {
            reason: reason.into(),
        }
    }

    pub fn outbox_store(reason: impl Into<String>) -> Self {
        Self::OutboxStore {
            reason: reason.into(),
        }
    }

    pub fn event_store(reason: impl Into<String>) -> Self {
        Self::EventStore {
            reason: reason.into(),
        }
    }
}

// 允许在 Postgres 实现中直接使用 `?` 将 sqlx 错误转换为 EventingError
#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for EventingError {
    fn from(err: sqlx::Error) -> Self {
        EventingError::Database {
            reason: err.to_string(),
        }
    }
}

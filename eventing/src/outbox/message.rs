//! Outbox 消息模型
//!
use crate::error::EventingResult;
use crate::event::{IntegrationEvent, SerializedEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 消息状态：`Pending -> Processed` 或 `Pending -> Failed`（单向，仅人工 requeue 可回到 Pending）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processed => "processed",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "processed" => Ok(OutboxStatus::Processed),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// 待投递的集成事件（追加写，永不删除）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event_type: String,
    pub event_version: u32,
    pub event_data: Value,
    /// 产生事件的模块
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// `None` 表示尚未投递
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// 最近一次失败原因
    pub error: Option<String>,
    pub status: OutboxStatus,
}

impl OutboxMessage {
    /// 序列化集成事件并生成一条待投递消息
    pub fn from_event<E: IntegrationEvent>(event: &E, source: impl Into<String>) -> EventingResult<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            event_type: E::EVENT_TYPE.to_string(),
            event_version: E::VERSION,
            event_data: serde_json::to_value(event)?,
            source: source.into(),
            created_at: Utc::now(),
            processed_at: None,
            retry_count: 0,
            error: None,
            status: OutboxStatus::Pending,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending && self.processed_at.is_none()
    }

    /// 已超出重试预算但尚未投递成功
    pub fn has_exceeded(&self, max_retries: u32) -> bool {
        self.processed_at.is_none() && self.retry_count >= max_retries
    }

    pub fn to_serialized(&self) -> SerializedEvent {
        SerializedEvent::new(
            self.event_type.clone(),
            self.event_version,
            self.event_data.clone(),
        )
    }
}

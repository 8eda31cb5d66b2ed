//! 序列化事件（SerializedEvent）
//!
//! 事件在持久化层与版本迁移中的标准形态：类型名 + 结构版本 + JSON 载荷。
//!
use super::IntegrationEvent;
use crate::error::EventingResult;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件类型
    #[builder(into)]
    event_type: String,
    /// 载荷的结构版本
    version: u32,
    /// 事件载荷
    payload: Value,
}

impl SerializedEvent {
    pub fn new(event_type: impl Into<String>, version: u32, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            version,
            payload,
        }
    }

    /// 以当前版本序列化集成事件
    pub fn from_event<E: IntegrationEvent>(event: &E) -> EventingResult<Self> {
        Ok(Self::new(E::EVENT_TYPE, E::VERSION, serde_json::to_value(event)?))
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn into_parts(self) -> (String, u32, Value) {
        (self.event_type, self.version, self.payload)
    }
}

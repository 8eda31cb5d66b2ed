//! 事件子系统配置
//!
//! 所有运维参数（轮询间隔、批大小、最大重试次数、队列容量与溢出策略、处理并发）
//! 均可通过 `Default`、serde 反序列化或环境变量加载。
//!
use crate::error::{EventingError, EventingResult};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// 有界队列写满时的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 等待消费者腾出空间
    #[default]
    Block,
    /// 丢弃新事件（记录 warn 日志）
    DropNewest,
    /// 返回 `EventingError::QueueFull`
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop_newest" => Ok(Self::DropNewest),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "expected block | drop_newest | reject, found {other}"
            )),
        }
    }
}

/// 超过重试上限的 Outbox 消息如何处理
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterPolicy {
    /// 单向转入 `Failed`，不再被自动轮询，等待人工 requeue
    #[default]
    Quarantine,
    /// 保持 `Pending`，每个轮询周期继续重试
    KeepRetrying,
}

impl FromStr for DeadLetterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarantine" => Ok(Self::Quarantine),
            "keep_retrying" => Ok(Self::KeepRetrying),
            other => Err(format!("expected quarantine | keep_retrying, found {other}")),
        }
    }
}

/// 内存事件队列配置；`capacity = None` 表示无界
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

/// Outbox 轮询配置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// 两次轮询之间的固定间隔
    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// 单次轮询最多拉取的待投递消息数
    pub batch_size: usize,
    /// 超过该次数的消息被视为死信
    pub max_retries: u32,
    pub dead_letter: DeadLetterPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 100,
            max_retries: 3,
            dead_letter: DeadLetterPolicy::default(),
        }
    }
}

/// 事件子系统总配置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventingConfig {
    pub queue: QueueConfig,
    pub outbox: OutboxConfig,
    /// 单个事件广播给多个 handler 时的最大并发
    pub handler_concurrency: usize,
}

impl Default for EventingConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            outbox: OutboxConfig::default(),
            handler_concurrency: 8,
        }
    }
}

impl EventingConfig {
    /// 从进程环境变量加载，未设置的键保持默认值
    pub fn from_env() -> EventingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载（便于测试）
    pub fn from_lookup<F>(lookup: F) -> EventingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64, _>(&lookup, "EVENTING_POLL_INTERVAL_MS")? {
            config.outbox.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse(&lookup, "EVENTING_BATCH_SIZE")? {
            config.outbox.batch_size = size;
        }
        if let Some(retries) = parse(&lookup, "EVENTING_MAX_RETRIES")? {
            config.outbox.max_retries = retries;
        }
        if let Some(policy) = parse(&lookup, "EVENTING_DEAD_LETTER")? {
            config.outbox.dead_letter = policy;
        }
        if let Some(capacity) = parse(&lookup, "EVENTING_QUEUE_CAPACITY")? {
            config.queue.capacity = Some(capacity);
        }
        if let Some(policy) = parse(&lookup, "EVENTING_QUEUE_OVERFLOW")? {
            config.queue.overflow = policy;
        }
        if let Some(n) = parse(&lookup, "EVENTING_HANDLER_CONCURRENCY")? {
            config.handler_concurrency = n;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EventingResult<()> {
        if self.outbox.batch_size == 0 {
            return Err(invalid("EVENTING_BATCH_SIZE", "must be greater than 0"));
        }
        if self.queue.capacity == Some(0) {
            return Err(invalid("EVENTING_QUEUE_CAPACITY", "must be greater than 0"));
        }
        if self.handler_concurrency == 0 {
            return Err(invalid(
                "EVENTING_HANDLER_CONCURRENCY",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> EventingResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, e.to_string())),
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> EventingError {
    EventingError::Config {
        key: key.to_string(),
        reason: reason.into(),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_operational_constants() {
        let config = EventingConfig::default();
        assert_eq!(config.outbox.poll_interval, Duration::from_secs(10));
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.outbox.max_retries, 3);
        assert_eq!(config.outbox.dead_letter, DeadLetterPolicy::Quarantine);
        assert_eq!(config.queue.capacity, None);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = EventingConfig::from_lookup(lookup(&[
            ("EVENTING_POLL_INTERVAL_MS", "250"),
            ("EVENTING_BATCH_SIZE", "10"),
            ("EVENTING_MAX_RETRIES", "5"),
            ("EVENTING_DEAD_LETTER", "keep_retrying"),
            ("EVENTING_QUEUE_CAPACITY", "64"),
            ("EVENTING_QUEUE_OVERFLOW", "reject"),
        ]))
        .unwrap();

        assert_eq!(config.outbox.poll_interval, Duration::from_millis(250));
        assert_eq!(config.outbox.batch_size, 10);
        assert_eq!(config.outbox.max_retries, 5);
        assert_eq!(config.outbox.dead_letter, DeadLetterPolicy::KeepRetrying);
        assert_eq!(config.queue.capacity, Some(64));
        assert_eq!(config.queue.overflow, OverflowPolicy::Reject);
    }

    #[test]
    fn invalid_values_are_reported_with_key() {
        let err = EventingConfig::from_lookup(lookup(&[("EVENTING_QUEUE_OVERFLOW", "spill")]))
            .unwrap_err();
        match err {
            EventingError::Config { key, .. } => assert_eq!(key, "EVENTING_QUEUE_OVERFLOW"),
            other => panic!("unexpected {other:?}"),
        }

        let err = EventingConfig::from_lookup(lookup(&[("EVENTING_BATCH_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, EventingError::Config { .. }));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: EventingConfig = serde_json::from_value(serde_json::json!({
            "outbox": { "poll_interval_ms": 500 },
            "queue": { "capacity": 8, "overflow": "drop_newest" }
        }))
        .unwrap();

        assert_eq!(config.outbox.poll_interval, Duration::from_millis(500));
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.queue.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.handler_concurrency, 8);
    }
}

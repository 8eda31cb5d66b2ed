//! 集成事件类型注册表
//!
//! 将稳定的事件类型名映射到具体 Rust 类型的解码器，Outbox 与集成事件存储
//! 依靠它把持久化的 JSON 载荷还原为可分发的事件。
//!
use super::{IntegrationEvent, QueuedEvent, SerializedEvent};
use crate::error::{EventingError, EventingResult};
use crate::versioning::EventVersionManager;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

type Decoder = Arc<dyn Fn(Value) -> EventingResult<QueuedEvent> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    version: u32,
    type_name: &'static str,
    decode: Decoder,
}

/// 事件类型名 -> (当前版本, 解码器)
#[derive(Default)]
pub struct EventTypeRegistry {
    by_type: DashMap<String, Registration>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册集成事件类型；同名重复注册时后者覆盖前者
    pub fn register<E: IntegrationEvent>(&self) -> &Self {
        let registration = Registration {
            version: E::VERSION,
            type_name: std::any::type_name::<E>(),
            decode: Arc::new(|payload: Value| -> EventingResult<QueuedEvent> {
                let event: E = serde_json::from_value(payload)?;
                Ok(QueuedEvent::new(event))
            }),
        };

        if let Some(previous) = self.by_type.insert(E::EVENT_TYPE.to_string(), registration) {
            warn!(
                event_type = E::EVENT_TYPE,
                previous = previous.type_name,
                current = std::any::type_name::<E>(),
                "event type registered twice, last registration wins"
            );
        }
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.by_type.contains_key(event_type)
    }

    /// 已注册类型的当前结构版本
    pub fn current_version(&self, event_type: &str) -> Option<u32> {
        self.by_type.get(event_type).map(|r| r.version)
    }

    /// 按类型名解码载荷，不做版本迁移
    pub fn decode(&self, event: SerializedEvent) -> EventingResult<QueuedEvent> {
        let registration = self.lookup(event.event_type())?;
        (registration.decode)(event.into_payload())
    }

    /// 先迁移到已注册的当前版本，再解码
    pub fn rehydrate(
        &self,
        event: SerializedEvent,
        versions: &EventVersionManager,
    ) -> EventingResult<QueuedEvent> {
        let registration = self.lookup(event.event_type())?;
        let migrated = versions.migrate(event, registration.version)?;
        (registration.decode)(migrated.into_payload())
    }

    fn lookup(&self, event_type: &str) -> EventingResult<Registration> {
        self.by_type
            .get(event_type)
            .map(|r| r.value().clone())
            .ok_or_else(|| EventingError::UnknownEventType {
                event_type: event_type.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct LessonPublished {
        lesson_id: u64,
        title: String,
        published_at: DateTime<Utc>,
    }

    impl IntegrationEvent for LessonPublished {
        const EVENT_TYPE: &'static str = "LessonPublished";
        const VERSION: u32 = 2;

        fn published_at(&self) -> DateTime<Utc> {
            self.published_at
        }
    }

    #[test]
    fn decode_known_type() {
        let registry = EventTypeRegistry::new();
        registry.register::<LessonPublished>();
        assert_eq!(registry.current_version("LessonPublished"), Some(2));

        let now = Utc::now();
        let raw = SerializedEvent::new(
            "LessonPublished",
            2,
            json!({ "lesson_id": 3, "title": "Ownership", "published_at": now }),
        );
        let ev = registry.decode(raw).unwrap();
        let lesson = ev.downcast_ref::<LessonPublished>().unwrap();
        assert_eq!(lesson.lesson_id, 3);
        assert_eq!(lesson.published_at, now);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = EventTypeRegistry::new();
        let err = registry
            .decode(SerializedEvent::new("Nope", 1, json!({})))
            .unwrap_err();
        assert!(matches!(err, EventingError::UnknownEventType { .. }));
    }

    #[test]
    fn rehydrate_migrates_before_decoding() {
        let registry = EventTypeRegistry::new();
        registry.register::<LessonPublished>();

        let mut versions = EventVersionManager::new();
        versions
            .register("LessonPublished", 1, 2, |mut payload| {
                if let Some(obj) = payload.as_object_mut() {
                    if let Some(name) = obj.remove("name") {
                        obj.insert("title".to_string(), name);
                    }
                }
                Ok(payload)
            })
            .unwrap();

        let raw = SerializedEvent::new(
            "LessonPublished",
            1,
            json!({ "lesson_id": 9, "name": "Traits", "published_at": Utc::now() }),
        );
        assert!(registry.decode(raw.clone()).is_err());

        let ev = registry.rehydrate(raw, &versions).unwrap();
        assert_eq!(ev.downcast_ref::<LessonPublished>().unwrap().title, "Traits");
    }
}

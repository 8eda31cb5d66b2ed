//! 事件版本迁移（Event Versioning）
//!
//! 持久化的旧事件在读取路径上按迁移链逐步升级：每种事件类型维护一条
//! `from_version -> to_version` 的线性链，`EventVersionManager::migrate`
//! 沿链前进直到目标版本或无可用迁移为止（尽力而为，不报错）。
//!
use crate::error::{EventingError, EventingResult};
use crate::event::SerializedEvent;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// 单步迁移：把某类型事件的载荷从 `from_version` 转换为 `to_version`
pub trait EventMigration: Send + Sync {
    fn event_type(&self) -> &str;

    fn from_version(&self) -> u32;

    fn to_version(&self) -> u32;

    /// 纯函数：不得有 I/O
    fn migrate(&self, payload: Value) -> EventingResult<Value>;
}

impl<T> EventMigration for Arc<T>
where
    T: EventMigration + ?Sized,
{
    fn event_type(&self) -> &str {
        (**self).event_type()
    }

    fn from_version(&self) -> u32 {
        (**self).from_version()
    }

    fn to_version(&self) -> u32 {
        (**self).to_version()
    }

    fn migrate(&self, payload: Value) -> EventingResult<Value> {
        (**self).migrate(payload)
    }
}

/// 基于闭包的迁移
pub struct FnMigration<F> {
    event_type: String,
    from_version: u32,
    to_version: u32,
    transform: F,
}

impl<F> FnMigration<F>
where
    F: Fn(Value) -> EventingResult<Value> + Send + Sync,
{
    pub fn new(event_type: impl Into<String>, from_version: u32, to_version: u32, transform: F) -> Self {
        Self {
            event_type: event_type.into(),
            from_version,
            to_version,
            transform,
        }
    }
}

impl<F> EventMigration for FnMigration<F>
where
    F: Fn(Value) -> EventingResult<Value> + Send + Sync,
{
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn from_version(&self) -> u32 {
        self.from_version
    }

    fn to_version(&self) -> u32 {
        self.to_version
    }

    fn migrate(&self, payload: Value) -> EventingResult<Value> {
        (self.transform)(payload)
    }
}

/// 迁移注册表：事件类型 -> (from_version -> 迁移)
#[derive(Default)]
pub struct EventVersionManager {
    chains: HashMap<String, BTreeMap<u32, Arc<dyn EventMigration>>>,
}

impl EventVersionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册迁移；同一 `from_version` 重复注册时后者覆盖前者。
    /// `to_version` 必须大于 `from_version`，保证链单调递增、必然终止。
    pub fn register_migration(&mut self, migration: Arc<dyn EventMigration>) -> EventingResult<()> {
        let from_version = migration.from_version();
        let to_version = migration.to_version();

        if to_version <= from_version {
            return Err(EventingError::InvalidMigration {
                event_type: migration.event_type().to_string(),
                from_version,
                to_version,
            });
        }

        let event_type = migration.event_type().to_string();
        let chain = self.chains.entry(event_type.clone()).or_default();
        if let Some(previous) = chain.insert(from_version, migration) {
            warn!(
                event_type = %event_type,
                from_version,
                replaced_to_version = previous.to_version(),
                to_version,
                "migration registered twice for the same from_version, last registration wins"
            );
        }
        Ok(())
    }

    pub fn register<F>(
        &mut self,
        event_type: impl Into<String>,
        from_version: u32,
        to_version: u32,
        transform: F,
    ) -> EventingResult<()>
    where
        F: Fn(Value) -> EventingResult<Value> + Send + Sync + 'static,
    {
        self.register_migration(Arc::new(FnMigration::new(
            event_type,
            from_version,
            to_version,
            transform,
        )))
    }

    /// 已注册迁移所能到达的最高版本
    pub fn latest_version(&self, event_type: &str) -> Option<u32> {
        self.chains
            .get(event_type)
            .and_then(|chain| chain.values().map(|m| m.to_version()).max())
    }

    /// 沿迁移链把事件升级到 `target_version`。
    ///
    /// - 版本已等于（或高于）目标时原样返回；
    /// - 找不到下一步迁移、或下一步会越过目标时停止，返回部分迁移的结果；
    /// - 迁移函数自身失败时返回 `MigrationFailed`。
    pub fn migrate(&self, event: SerializedEvent, target_version: u32) -> EventingResult<SerializedEvent> {
        if event.version() >= target_version {
            return Ok(event);
        }

        let Some(chain) = self.chains.get(event.event_type()) else {
            return Ok(event);
        };

        let mut current = event;
        while current.version() < target_version {
            let Some(step) = chain.get(&current.version()) else {
                break;
            };
            let to_version = step.to_version();
            if to_version > target_version {
                break;
            }

            let (event_type, from_version, payload) = current.into_parts();
            let migrated = step.migrate(payload).map_err(|err| match err {
                EventingError::MigrationFailed { .. } => err,
                other => EventingError::MigrationFailed {
                    event_type: event_type.clone(),
                    from_version,
                    to_version,
                    reason: other.to_string(),
                },
            })?;
            current = SerializedEvent::new(event_type, to_version, migrated);
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rename(from: &'static str, to: &'static str) -> impl Fn(Value) -> EventingResult<Value> {
        move |mut payload| {
            if let Some(obj) = payload.as_object_mut() {
                if let Some(v) = obj.remove(from) {
                    obj.insert(to.to_string(), v);
                }
            }
            Ok(payload)
        }
    }

    fn manager_v1_v3() -> EventVersionManager {
        let mut m = EventVersionManager::new();
        m.register("OrderCreated", 1, 2, rename("order", "order_id")).unwrap();
        m.register("OrderCreated", 2, 3, |mut payload: Value| {
            payload["currency"] = json!("EUR");
            Ok(payload)
        })
        .unwrap();
        m
    }

    #[test]
    fn same_version_is_returned_unchanged() {
        let m = manager_v1_v3();
        let ev = SerializedEvent::new("OrderCreated", 2, json!({"order_id": 42}));
        assert_eq!(m.migrate(ev.clone(), 2).unwrap(), ev);
    }

    #[test]
    fn chain_applies_every_step_in_order() {
        let m = manager_v1_v3();
        let ev = SerializedEvent::new("OrderCreated", 1, json!({"order": 42}));
        let out = m.migrate(ev, 3).unwrap();

        assert_eq!(out.version(), 3);
        assert_eq!(out.payload(), &json!({"order_id": 42, "currency": "EUR"}));
        assert_eq!(m.latest_version("OrderCreated"), Some(3));
    }

    #[test]
    fn unreachable_target_stops_short_without_error() {
        let mut m = EventVersionManager::new();
        m.register("OrderCreated", 1, 2, rename("order", "order_id")).unwrap();

        let ev = SerializedEvent::new("OrderCreated", 1, json!({"order": 1}));
        let out = m.migrate(ev, 5).unwrap();
        assert_eq!(out.version(), 2);
        assert_eq!(out.payload(), &json!({"order_id": 1}));
    }

    #[test]
    fn unknown_type_and_newer_events_pass_through() {
        let m = manager_v1_v3();
        let other = SerializedEvent::new("Ping", 1, json!({}));
        assert_eq!(m.migrate(other.clone(), 3).unwrap(), other);

        let newer = SerializedEvent::new("OrderCreated", 4, json!({}));
        assert_eq!(m.migrate(newer.clone(), 3).unwrap(), newer);
    }

    #[test]
    fn step_overshooting_target_is_not_applied() {
        let mut m = EventVersionManager::new();
        m.register("ExerciseGraded", 1, 4, |p| Ok(p)).unwrap();

        let ev = SerializedEvent::new("ExerciseGraded", 1, json!({"score": 9}));
        assert_eq!(m.migrate(ev, 3).unwrap().version(), 1);
    }

    #[test]
    fn last_registration_for_from_version_wins() {
        let mut m = EventVersionManager::new();
        m.register("OrderCreated", 1, 2, |_| Ok(json!({"first": true}))).unwrap();
        m.register("OrderCreated", 1, 2, |_| Ok(json!({"second": true}))).unwrap();

        let out = m
            .migrate(SerializedEvent::new("OrderCreated", 1, json!({})), 2)
            .unwrap();
        assert_eq!(out.payload(), &json!({"second": true}));
    }

    #[test]
    fn non_increasing_migration_is_rejected() {
        let mut m = EventVersionManager::new();
        let err = m.register("OrderCreated", 2, 2, |p| Ok(p)).unwrap_err();
        assert!(matches!(err, EventingError::InvalidMigration { .. }));
        assert!(m.register("OrderCreated", 3, 1, |p| Ok(p)).is_err());
    }

    #[test]
    fn failing_transform_reports_the_step() {
        let mut m = EventVersionManager::new();
        m.register("OrderCreated", 1, 2, |_| {
            Err(EventingError::Serde {
                source: serde_json::from_str::<Value>("{").unwrap_err(),
            })
        })
        .unwrap();

        let err = m
            .migrate(SerializedEvent::new("OrderCreated", 1, json!({})), 2)
            .unwrap_err();
        match err {
            EventingError::MigrationFailed {
                from_version,
                to_version,
                ..
            } => assert_eq!((from_version, to_version), (1, 2)),
            other => panic!("unexpected {other:?}"),
        }
    }
}

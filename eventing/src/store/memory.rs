use super::{DomainEventRecord, DomainEventStore, IntegrationEventRecord, IntegrationEventStore};
use crate::error::{EventingError, EventingResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 进程内领域事件存储
#[derive(Default)]
pub struct InMemoryDomainEventStore {
    streams: Mutex<HashMap<String, Vec<DomainEventRecord>>>,
}

impl InMemoryDomainEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EventingResult<MutexGuard<'_, HashMap<String, Vec<DomainEventRecord>>>> {
        self.streams
            .lock()
            .map_err(|_| EventingError::event_store("domain event store mutex poisoned"))
    }
}

#[async_trait]
impl DomainEventStore for InMemoryDomainEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> EventingResult<DomainEventRecord> {
        let mut streams = self.lock()?;
        let stream = streams.entry(aggregate_id.to_string()).or_default();
        let version = stream.last().map_or(0, |r| r.version) + 1;

        let record = DomainEventRecord {
            id: Uuid::now_v7(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            data,
            version,
            created_at,
        };
        stream.push(record.clone());
        Ok(record)
    }

    async fn load(
        &self,
        aggregate_id: &str,
        from_version: Option<u64>,
    ) -> EventingResult<Vec<DomainEventRecord>> {
        let from = from_version.unwrap_or(0);
        Ok(self
            .lock()?
            .get(aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|r| r.version >= from)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// 进程内集成事件存储
#[derive(Default)]
pub struct InMemoryIntegrationEventStore {
    records: Mutex<Vec<IntegrationEventRecord>>,
}

impl InMemoryIntegrationEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前全部记录的快照（插入顺序）
    pub fn snapshot(&self) -> Vec<IntegrationEventRecord> {
        self.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn lock(&self) -> EventingResult<MutexGuard<'_, Vec<IntegrationEventRecord>>> {
        self.records
            .lock()
            .map_err(|_| EventingError::event_store("integration event store mutex poisoned"))
    }

    fn select(
        &self,
        predicate: impl Fn(&IntegrationEventRecord) -> bool,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        let mut selected: Vec<IntegrationEventRecord> =
            self.lock()?.iter().filter(|r| predicate(r)).cloned().collect();
        selected.sort_by_key(|r| r.created_at);
        Ok(selected)
    }
}

#[async_trait]
impl IntegrationEventStore for InMemoryIntegrationEventStore {
    async fn append(&self, record: IntegrationEventRecord) -> EventingResult<()> {
        self.lock()?.push(record);
        Ok(())
    }

    async fn by_type(&self, event_type: &str) -> EventingResult<Vec<IntegrationEventRecord>> {
        self.select(|r| r.event_type == event_type)
    }

    async fn by_type_between(
        &self,
        event_type: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        self.select(|r| r.event_type == event_type && r.created_at >= from && r.created_at <= to)
    }

    async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EventingResult<Vec<IntegrationEventRecord>> {
        self.select(|r| r.created_at >= from && r.created_at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DomainEvent, IntegrationEvent};
    use crate::store::{DomainEventStoreExt, IntegrationEventStoreExt, StoredEvent};
    use crate::versioning::EventVersionManager;
    use chrono::Duration;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PointsAwarded {
        account_id: String,
        points: u32,
        occurred_on: DateTime<Utc>,
    }

    impl DomainEvent for PointsAwarded {
        fn event_type(&self) -> &str {
            "PointsAwarded"
        }

        fn aggregate_id(&self) -> &str {
            &self.account_id
        }

        fn occurred_on(&self) -> DateTime<Utc> {
            self.occurred_on
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CourseEnrolled {
        course_id: u64,
        student: String,
        published_at: DateTime<Utc>,
    }

    impl IntegrationEvent for CourseEnrolled {
        const EVENT_TYPE: &'static str = "CourseEnrolled";
        const VERSION: u32 = 2;

        fn published_at(&self) -> DateTime<Utc> {
            self.published_at
        }
    }

    fn awarded(account_id: &str, points: u32) -> PointsAwarded {
        PointsAwarded {
            account_id: account_id.to_string(),
            points,
            occurred_on: Utc::now(),
        }
    }

    #[tokio::test]
    async fn versions_increase_per_aggregate() {
        let store = InMemoryDomainEventStore::new();
        for (account, points) in [("a-1", 5), ("a-2", 1), ("a-1", 7), ("a-1", 9)] {
            store.save(&awarded(account, points)).await.unwrap();
        }

        let a1 = store.get_events::<PointsAwarded>("a-1").await.unwrap();
        let versions: Vec<u64> = a1.iter().map(|e| e.record().version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let points: Vec<u32> = a1.iter().filter_map(|e| e.event()).map(|e| e.points).collect();
        assert_eq!(points, vec![5, 7, 9]);

        let a2 = store.load("a-2", None).await.unwrap();
        assert_eq!(a2[0].version, 1);

        let tail = store.get_events_from::<PointsAwarded>("a-1", 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].record().version, 2);

        assert!(store.get_events::<PointsAwarded>("missing").await.unwrap().is_empty());
        let snapshot: Option<PointsAwarded> = store.get_latest_snapshot("a-1").await.unwrap();
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn corrupt_domain_records_stay_visible() {
        let store = InMemoryDomainEventStore::new();
        store.save(&awarded("a-1", 5)).await.unwrap();
        store
            .append("a-1", "PointsAwarded", json!({"points": "lots"}), Utc::now())
            .await
            .unwrap();
        store.save(&awarded("a-1", 9)).await.unwrap();

        let events = store.get_events::<PointsAwarded>("a-1").await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[1].is_corrupt());
        assert_eq!(events[1].record().version, 2);

        let decoded = StoredEvent::into_decoded(events);
        assert_eq!(decoded.iter().map(|e| e.points).collect::<Vec<_>>(), vec![5, 9]);
    }

    #[tokio::test]
    async fn integration_queries_are_inclusive_and_ordered() {
        let store = InMemoryIntegrationEventStore::new();
        let base = Utc::now();
        let at = |secs: i64, event_type: &str| IntegrationEventRecord {
            id: Uuid::now_v7(),
            event_type: event_type.to_string(),
            data: json!({}),
            version: 1,
            created_at: base + Duration::seconds(secs),
        };
        for record in [
            at(30, "CourseEnrolled"),
            at(10, "CourseEnrolled"),
            at(20, "LessonPublished"),
            at(40, "CourseEnrolled"),
        ] {
            store.append(record).await.unwrap();
        }

        let secs = |records: Vec<IntegrationEventRecord>| -> Vec<i64> {
            records
                .iter()
                .map(|r| (r.created_at - base).num_seconds())
                .collect()
        };

        assert_eq!(secs(store.by_type("CourseEnrolled").await.unwrap()), vec![10, 30, 40]);
        assert_eq!(
            secs(
                store
                    .by_type_between(
                        "CourseEnrolled",
                        base + Duration::seconds(10),
                        base + Duration::seconds(30)
                    )
                    .await
                    .unwrap()
            ),
            vec![10, 30]
        );
        assert_eq!(
            secs(
                store
                    .between(base + Duration::seconds(20), base + Duration::seconds(40))
                    .await
                    .unwrap()
            ),
            vec![20, 30, 40]
        );
    }

    #[tokio::test]
    async fn typed_integration_reads_can_migrate_old_payloads() {
        let store = InMemoryIntegrationEventStore::new();
        let published_at = Utc::now();
        store
            .append(IntegrationEventRecord {
                id: Uuid::now_v7(),
                event_type: "CourseEnrolled".to_string(),
                data: json!({"course_id": 3, "student_name": "mei", "published_at": published_at}),
                version: 1,
                created_at: published_at - Duration::seconds(5),
            })
            .await
            .unwrap();
        let current = CourseEnrolled {
            course_id: 4,
            student: "li".to_string(),
            published_at,
        };
        let saved = store.save(&current).await.unwrap();
        assert_eq!(saved.version, 2);

        let raw = store.get_by_type::<CourseEnrolled>(None).await.unwrap();
        assert!(raw[0].is_corrupt());
        assert_eq!(raw[1].event(), Some(&current));

        let mut versions = EventVersionManager::new();
        versions
            .register("CourseEnrolled", 1, 2, |mut payload| {
                if let Some(obj) = payload.as_object_mut() {
                    if let Some(name) = obj.remove("student_name") {
                        obj.insert("student".to_string(), name);
                    }
                }
                Ok(payload)
            })
            .unwrap();

        let migrated = store
            .get_by_type::<CourseEnrolled>(Some(&versions))
            .await
            .unwrap();
        assert_eq!(
            migrated[0].event().map(|e| e.student.as_str()),
            Some("mei")
        );
        assert!(migrated.iter().all(|e| !e.is_corrupt()));

        let window = store
            .get_by_type_between::<CourseEnrolled>(
                published_at - Duration::seconds(10),
                published_at - Duration::seconds(1),
                Some(&versions),
            )
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].record().version, 1);
    }
}

use chrono::{DateTime, TimeZone, Utc};
use eventing::event::{DomainEvent, IntegrationEvent, SerializedEvent};
use eventing_macros::{domain_event, integration_event};
use serde_json::json;

#[integration_event(event_type = "OrderCreated", version = 2)]
struct OrderCreated {
    id: u64,
    total_cents: i64,
}

#[integration_event]
#[derive(Debug)]
struct UserRegistered {
    user_id: String,
    published_at: DateTime<Utc>,
}

#[domain_event(event_type = "exercise.submitted")]
struct ExerciseSubmitted {
    answer: String,
}

#[domain_event]
struct LessonDrafted {
    aggregate_id: String,
    title: String,
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
}

#[test]
fn integration_event_uses_declared_type_and_version() {
    let event = OrderCreated {
        published_at: fixed_time(),
        id: 42,
        total_cents: 1999,
    };

    assert_eq!(OrderCreated::EVENT_TYPE, "OrderCreated");
    assert_eq!(OrderCreated::VERSION, 2);
    assert_eq!(event.published_at(), fixed_time());

    let serialized = SerializedEvent::from_event(&event).unwrap();
    assert_eq!(serialized.event_type(), "OrderCreated");
    assert_eq!(serialized.version(), 2);
    assert_eq!(serialized.payload()["id"], json!(42));
}

#[test]
fn integration_event_defaults_to_struct_name_and_keeps_existing_field() {
    let event = UserRegistered {
        user_id: "u-1".into(),
        published_at: fixed_time(),
    };

    assert_eq!(UserRegistered::EVENT_TYPE, "UserRegistered");
    assert_eq!(UserRegistered::VERSION, 1);

    let value = serde_json::to_value(&event).unwrap();
    let back: UserRegistered = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}

#[test]
fn domain_event_exposes_aggregate_metadata() {
    let event = ExerciseSubmitted {
        aggregate_id: "ex-9".into(),
        occurred_on: fixed_time(),
        answer: "42".into(),
    };

    assert_eq!(event.event_type(), "exercise.submitted");
    assert_eq!(event.aggregate_id(), "ex-9");
    assert_eq!(event.occurred_on(), fixed_time());

    let drafted = LessonDrafted {
        occurred_on: fixed_time(),
        aggregate_id: "lesson-1".into(),
        title: "Ownership".into(),
    };
    assert_eq!(drafted.event_type(), "LessonDrafted");
    assert_eq!(drafted.aggregate_id(), "lesson-1");
    assert_eq!(drafted.clone(), drafted);
}

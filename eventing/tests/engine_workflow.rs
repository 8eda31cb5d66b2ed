use anyhow::Result as AnyResult;
use chrono::Utc;
use eventing::config::{EventingConfig, OutboxConfig};
use eventing::event::EventTypeRegistry;
use eventing::eventing::{EventEngine, HandlerRegistry};
use eventing::outbox::{InMemoryOutboxStore, OutboxMessage, OutboxStatus, OutboxStore};
use eventing::store::{InMemoryIntegrationEventStore, IntegrationEventStoreExt};
use eventing::versioning::EventVersionManager;
use eventing_macros::integration_event;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[integration_event(event_type = "OrderCreated", version = 2)]
struct OrderCreated {
    id: u64,
    channel: String,
}

#[derive(Debug, Clone)]
struct CartAbandoned {
    cart_id: u64,
}

fn versions() -> AnyResult<EventVersionManager> {
    let mut versions = EventVersionManager::new();
    versions.register("OrderCreated", 1, 2, |mut payload| {
        payload["channel"] = json!("web");
        Ok(payload)
    })?;
    Ok(versions)
}

/// 旧版本写入、尚未投递的 Outbox 行
fn legacy_order(id: u64) -> AnyResult<OutboxMessage> {
    Ok(OutboxMessage {
        id: Uuid::now_v7(),
        event_type: "OrderCreated".into(),
        event_version: 1,
        event_data: json!({ "id": id, "published_at": serde_json::to_value(Utc::now())? }),
        source: "orders".into(),
        created_at: Utc::now(),
        processed_at: None,
        retry_count: 0,
        error: None,
        status: OutboxStatus::Pending,
    })
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    // 使用 timeout + 轮询条件，减少固定 sleep 带来的不确定性
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn running_engine_delivers_outbox_and_in_process_events() -> AnyResult<()> {
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let audit = Arc::new(InMemoryIntegrationEventStore::new());

    let orders = Arc::new(Mutex::new(Vec::<(u64, String)>::new()));
    let abandoned = Arc::new(AtomicUsize::new(0));

    let handlers = Arc::new(HandlerRegistry::new());
    {
        let orders = orders.clone();
        handlers.register_fn::<OrderCreated, _, _>("order-projection", move |event| {
            let orders = orders.clone();
            async move {
                orders.lock().unwrap().push((event.id, event.channel));
                Ok(())
            }
        });
    }
    {
        let abandoned = abandoned.clone();
        handlers.register_fn::<CartAbandoned, _, _>("cart-reminder", move |event| {
            let abandoned = abandoned.clone();
            async move {
                anyhow::ensure!(event.cart_id > 0, "cart id must be positive");
                abandoned.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        });
    }

    let event_types = Arc::new(EventTypeRegistry::new());
    event_types.register::<OrderCreated>();

    let config = EventingConfig {
        outbox: OutboxConfig {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    };

    let engine = Arc::new(
        EventEngine::builder()
            .outbox_store(outbox.clone())
            .integration_store(audit.clone())
            .handlers(handlers)
            .event_types(event_types)
            .versions(Arc::new(versions()?))
            .config(config)
            .build(),
    );

    // 引擎启动前已积压的旧版本消息
    let legacy = legacy_order(7)?;
    let legacy_id = legacy.id;
    outbox.append(legacy).await?;

    let handle = engine.clone().start();

    let bus = engine.integration_bus("orders");
    let fresh = bus
        .publish_batch(&[
            OrderCreated {
                published_at: Utc::now(),
                id: 8,
                channel: "app".into(),
            },
            OrderCreated {
                published_at: Utc::now(),
                id: 9,
                channel: "app".into(),
            },
        ])
        .await?;
    assert_eq!(fresh.len(), 2);

    let dispatcher = engine.dispatcher();
    dispatcher.publish(CartAbandoned { cart_id: 1 }).await?;
    dispatcher.publish(CartAbandoned { cart_id: 0 }).await?;
    dispatcher.publish(CartAbandoned { cart_id: 2 }).await?;

    wait_until(|| orders.lock().unwrap().len() >= 3 && abandoned.load(Ordering::Relaxed) >= 2)
        .await;

    handle.shutdown();
    handle.join().await;

    let mut seen = orders.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            (7, "web".to_string()),
            (8, "app".to_string()),
            (9, "app".to_string()),
        ]
    );
    // 处理器失败只记日志，不影响后续事件
    assert_eq!(abandoned.load(Ordering::Relaxed), 2);

    let rows = outbox.snapshot();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|m| m.status == OutboxStatus::Processed));
    assert!(rows.iter().all(|m| m.processed_at.is_some() && m.retry_count == 0));
    assert_eq!(
        outbox.get(legacy_id).await?.map(|m| m.event_version),
        Some(1)
    );

    // 审计记录只包含通过总线发布的事件
    let recorded = audit.get_by_type::<OrderCreated>(None).await?;
    assert_eq!(recorded.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_outbox_types_are_dead_lettered_by_running_engine() -> AnyResult<()> {
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let config = EventingConfig {
        outbox: OutboxConfig {
            poll_interval: Duration::from_millis(10),
            max_retries: 2,
            ..Default::default()
        },
        ..Default::default()
    };

    let engine = Arc::new(
        EventEngine::builder()
            .outbox_store(outbox.clone())
            .integration_store(Arc::new(InMemoryIntegrationEventStore::new()))
            .config(config)
            .build(),
    );

    // 没有注册 OrderCreated，解码必然失败
    let message = legacy_order(1)?;
    let id = message.id;
    outbox.append(message).await?;

    let handle = engine.clone().start();
    wait_until(|| {
        outbox
            .snapshot()
            .iter()
            .any(|m| m.status == OutboxStatus::Failed)
    })
    .await;
    handle.shutdown();
    handle.join().await;

    let row = outbox.get(id).await?.expect("rows are never deleted");
    assert_eq!(row.status, OutboxStatus::Failed);
    assert_eq!(row.retry_count, 2);
    assert!(row.processed_at.is_none());
    assert!(
        row.error
            .as_deref()
            .is_some_and(|e| e.contains("unknown event type"))
    );
    assert_eq!(outbox.fetch_exceeded(2).await?.len(), 1);
    Ok(())
}

//! 下单流程演示：领域事件落库并进程内广播，集成事件经 Outbox 可靠投递。
//!
//! 运行：`RUST_LOG=debug EVENTING_POLL_INTERVAL_MS=500 cargo run -p demo`
//! 启用 `postgres` feature 并设置 `DATABASE_URL` 时改用 Postgres 存储。
//!
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use eventing::config::EventingConfig;
use eventing::event::EventTypeRegistry;
use eventing::eventing::{EventEngine, EventHandler, HandlerRegistry};
use eventing::outbox::{InMemoryOutboxStore, OutboxStore};
use eventing::store::{
    DomainEventStore, DomainEventStoreExt, InMemoryDomainEventStore,
    InMemoryIntegrationEventStore, IntegrationEventStore,
};
use eventing::versioning::EventVersionManager;
use eventing_macros::{domain_event, integration_event};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[domain_event(event_type = "order.placed")]
struct OrderPlaced {
    total_cents: i64,
}

#[domain_event(event_type = "order.paid")]
struct OrderPaid {
    amount_cents: i64,
}

/// v2 新增 `currency`，旧数据由迁移补齐
#[integration_event(event_type = "OrderConfirmed", version = 2)]
struct OrderConfirmed {
    order_id: String,
    total_cents: i64,
    currency: String,
}

/// 模拟偶发失败的邮件服务
#[derive(Default)]
struct ReceiptMailer {
    attempts: AtomicUsize,
}

#[async_trait]
impl EventHandler<OrderConfirmed> for ReceiptMailer {
    fn handler_name(&self) -> &str {
        "receipt-mailer"
    }

    async fn handle(&self, event: &OrderConfirmed) -> anyhow::Result<()> {
        if self.attempts.fetch_add(1, Ordering::Relaxed) == 0 {
            anyhow::bail!("smtp relay unavailable");
        }
        info!(
            order_id = %event.order_id,
            total_cents = event.total_cents,
            currency = %event.currency,
            "receipt sent"
        );
        Ok(())
    }
}

struct Stores {
    outbox: Arc<dyn OutboxStore>,
    domain: Arc<dyn DomainEventStore>,
    integration: Arc<dyn IntegrationEventStore>,
}

async fn stores() -> AnyResult<Stores> {
    #[cfg(feature = "postgres")]
    {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            let pg = Arc::new(eventing::postgres::PgEventStore::connect(&url).await?);
            pg.migrate().await?;
            info!("using postgres event stores");
            return Ok(Stores {
                outbox: pg.clone(),
                domain: pg.clone(),
                integration: pg,
            });
        }
    }

    info!("using in-memory event stores");
    Ok(Stores {
        outbox: Arc::new(InMemoryOutboxStore::new()),
        domain: Arc::new(InMemoryDomainEventStore::new()),
        integration: Arc::new(InMemoryIntegrationEventStore::new()),
    })
}

fn handlers() -> Arc<HandlerRegistry> {
    let handlers = Arc::new(HandlerRegistry::new());
    handlers
        .register::<OrderConfirmed, _>(Arc::new(ReceiptMailer::default()))
        .register_fn::<OrderPlaced, _, _>("inventory-reservation", |event| async move {
            info!(order_id = %event.aggregate_id, "stock reserved");
            Ok(())
        })
        .register_fn::<OrderPaid, _, _>("ledger", |event| async move {
            info!(
                order_id = %event.aggregate_id,
                amount_cents = event.amount_cents,
                "payment booked"
            );
            Ok(())
        });
    handlers
}

fn versions() -> AnyResult<EventVersionManager> {
    let mut versions = EventVersionManager::new();
    versions.register("OrderConfirmed", 1, 2, |mut payload| {
        payload["currency"] = json!("EUR");
        Ok(payload)
    })?;
    Ok(versions)
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EventingConfig::from_env()?;
    let stores = stores().await?;

    let event_types = Arc::new(EventTypeRegistry::new());
    event_types.register::<OrderConfirmed>();

    let engine = Arc::new(
        EventEngine::builder()
            .outbox_store(stores.outbox.clone())
            .integration_store(stores.integration.clone())
            .handlers(handlers())
            .event_types(event_types)
            .versions(Arc::new(versions()?))
            .config(config)
            .build(),
    );
    let handle = engine.clone().start();

    let order_id = format!("order-{}", Utc::now().timestamp_millis());
    let dispatcher = engine.dispatcher();

    let placed = OrderPlaced {
        aggregate_id: order_id.clone(),
        occurred_on: Utc::now(),
        total_cents: 4_200,
    };
    stores.domain.save(&placed).await?;
    dispatcher.publish(placed).await?;

    let paid = OrderPaid {
        aggregate_id: order_id.clone(),
        occurred_on: Utc::now(),
        amount_cents: 4_200,
    };
    stores.domain.save(&paid).await?;
    dispatcher.publish(paid).await?;

    let history = stores.domain.load(&order_id, None).await?;
    info!(
        order_id = %order_id,
        versions = ?history.iter().map(|r| r.version).collect::<Vec<_>>(),
        "order history loaded"
    );

    // 邮件服务首次调用失败：处理器错误只记日志，不会重新投递
    let bus = engine.integration_bus("orders");
    for _ in 0..2 {
        let message_id = bus
            .publish(&OrderConfirmed {
                published_at: Utc::now(),
                order_id: order_id.clone(),
                total_cents: 4_200,
                currency: "EUR".into(),
            })
            .await?;
        info!(%message_id, "order confirmation queued");
    }

    info!("press ctrl-c to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(config.outbox.poll_interval * 2) => {}
    }

    handle.shutdown();
    handle.join().await;

    for message in stores.outbox.fetch_exceeded(config.outbox.max_retries).await? {
        warn!(
            message_id = %message.id,
            event_type = %message.event_type,
            retry_count = message.retry_count,
            error = ?message.error,
            "dead letter awaiting requeue"
        );
    }
    Ok(())
}

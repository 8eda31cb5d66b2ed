//! 事件处理器（EventHandler）与处理器注册表
//!
//! 注册表以具体事件类型的 `TypeId` 为键，值为按注册顺序排列的处理闭包；
//! 分发时只做一次查表和扇出调用，运行期不依赖反射。
//!
use crate::event::{Event, QueuedEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::future::BoxFuture;
use std::any::{TypeId, type_name};
use std::future::Future;
use std::sync::Arc;

/// 事件处理器：处理一种具体类型的事件
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    /// 处理器名称（用于日志与审计）
    fn handler_name(&self) -> &str;

    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

type HandlerFn = Arc<dyn Fn(QueuedEvent) -> HandlerFuture + Send + Sync>;

/// 已注册、类型擦除后的处理器
#[derive(Clone)]
pub struct RegisteredHandler {
    name: Arc<str>,
    call: HandlerFn,
}

impl RegisteredHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn invoke(&self, event: QueuedEvent) -> anyhow::Result<()> {
        (self.call)(event).await
    }
}

/// 处理器注册表：在进程启动时由各模块填充
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<TypeId, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器
    pub fn register<E, H>(&self, handler: Arc<H>) -> &Self
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        let name: Arc<str> = Arc::from(handler.handler_name());

        let call: HandlerFn = Arc::new(move |event: QueuedEvent| -> HandlerFuture {
            let handler = handler.clone();

            Box::pin(async move {
                // 键与闭包来自同一泛型 E，这里的 downcast 正常不会失败
                match event.downcast_ref::<E>() {
                    Some(ev) => handler.handle(ev).await,
                    None => Err(anyhow::anyhow!(
                        "type mismatch: expected={}, found={}",
                        type_name::<E>(),
                        event.type_name()
                    )),
                }
            })
        });

        self.push::<E>(RegisteredHandler { name, call })
    }

    /// 以异步闭包注册处理器，闭包接收事件的克隆
    pub fn register_fn<E, F, Fut>(&self, name: impl Into<String>, f: F) -> &Self
    where
        E: Event + Clone,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);

        let call: HandlerFn = Arc::new(move |event: QueuedEvent| -> HandlerFuture {
            let f = f.clone();
            let typed = event.downcast_ref::<E>().cloned();

            Box::pin(async move {
                match typed {
                    Some(ev) => f(ev).await,
                    None => Err(anyhow::anyhow!(
                        "type mismatch: expected={}, found={}",
                        type_name::<E>(),
                        event.type_name()
                    )),
                }
            })
        });

        let name: String = name.into();
        self.push::<E>(RegisteredHandler {
            name: Arc::from(name),
            call,
        })
    }

    fn push<E: Event>(&self, handler: RegisteredHandler) -> &Self {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(handler);
        self
    }

    /// 取出与事件具体类型完全匹配的处理器（按注册顺序）
    pub fn handlers_for(&self, event: &QueuedEvent) -> Vec<RegisteredHandler> {
        self.handlers
            .get(&event.type_id())
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// 已注册处理器总数
    pub fn len(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

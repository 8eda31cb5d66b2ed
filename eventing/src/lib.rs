//! 模块化后端的事件分发与 Outbox 可靠投递子系统（eventing）
//!
//! 提供两条事件通道：
//! - 进程内通道：`EventDispatcher` → `EventQueue` → `EventProcessor` → 已注册处理器，
//!   即时、尽力而为、进程内有效；
//! - 持久化通道：`IntegrationEventBus` 先写 Outbox 与集成事件存储，
//!   `OutboxProcessor` 周期轮询后重新注入进程内通道，保证至少一次投递。
//!
//! 另外包含领域/集成事件存储（`store`）、按事件类型的版本迁移链（`versioning`）、
//! 统一配置（`config`）与错误类型（`error`）。启用 `infra-sqlx` 特性后提供 Postgres 实现。
//!
//! 典型用法：
//! 1. 在启动时向 `HandlerRegistry` 注册处理器，向 `EventTypeRegistry` 注册集成事件类型；
//! 2. 在 `EventVersionManager` 中注册旧版本事件的迁移；
//! 3. 用 `EventEngine::builder()` 装配存储与配置，调用 `start` 启动后台循环；
//! 4. 业务模块通过 `dispatcher()` 或 `integration_bus(source)` 发布事件。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod eventing;
pub mod outbox;
#[cfg(feature = "infra-sqlx")]
pub mod postgres;
pub mod store;
pub mod versioning;

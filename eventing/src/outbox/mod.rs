//! 事务性 Outbox
//!
//! 集成事件先持久化到 Outbox，再由后台轮询重新注入内存分发管道，
//! 保证跨进程重启的至少一次投递。
//!
mod memory;
mod message;
mod processor;
mod store;

pub use memory::InMemoryOutboxStore;
pub use message::{OutboxMessage, OutboxStatus};
pub use processor::{OutboxProcessor, PollReport};
pub use store::OutboxStore;

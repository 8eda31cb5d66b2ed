pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod integration_bus;
pub mod processor;
pub mod queue;

pub use dispatcher::{EventDispatch, EventDispatcher};
pub use engine::{EngineHandle, EventEngine};
pub use handler::{EventHandler, HandlerRegistry, RegisteredHandler};
pub use integration_bus::{AuditWritePolicy, IntegrationEventBus};
pub use processor::{DispatchReport, EventProcessor};
pub use queue::{Enqueued, EventQueue};

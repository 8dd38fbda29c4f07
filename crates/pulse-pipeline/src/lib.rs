pub mod broadcast;
pub mod bridge;
pub mod bulk;
pub mod parse;
pub mod worker;

pub use broadcast::Broadcaster;
pub use bridge::EventBridge;
pub use bulk::{BulkEngine, BulkOptions, BulkReport};
pub use worker::EventWorkerPool;

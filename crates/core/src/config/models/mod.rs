pub mod app_config;
pub mod database;
pub mod lifecycle_worker;
pub mod observability;
pub mod work_queue;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use lifecycle_worker::{LifecycleConfig, WorkerConfig};
pub use observability::ObservabilityConfig;
pub use work_queue::{RedisConfig, WorkQueueConfig, WorkQueueType};

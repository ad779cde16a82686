pub mod database;
pub mod in_memory_queue;
pub mod queue_keys;
pub mod redis_work_queue;
pub mod work_queue_factory;

pub use database::*;
pub use in_memory_queue::InMemoryWorkQueue;
pub use queue_keys::QueueKeys;
pub use redis_work_queue::RedisWorkQueue;
pub use work_queue_factory::WorkQueueFactory;

use std::sync::Arc;

use jobflow_core::config::{WorkQueueConfig, WorkQueueType};
use jobflow_core::traits::WorkQueue;
use jobflow_core::Result;
use tracing::{debug, info};

use crate::{InMemoryWorkQueue, RedisWorkQueue};

pub struct WorkQueueFactory;

impl WorkQueueFactory {
    pub async fn create(config: &WorkQueueConfig) -> Result<Arc<dyn WorkQueue>> {
        debug!("Creating work queue with type: {:?}", config.r#type);

        match config.r#type {
            WorkQueueType::Redis => {
                info!("Initializing Redis work queue");
                let queue = RedisWorkQueue::new(config).await?;
                Ok(Arc::new(queue))
            }
            WorkQueueType::InMemory => {
                info!("Initializing in-memory work queue");
                Ok(Arc::new(InMemoryWorkQueue::new()))
            }
        }
    }
}

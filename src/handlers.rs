use std::sync::Arc;

use async_trait::async_trait;
use jobflow_core::models::Job;
use jobflow_worker::{HandlerError, HandlerRegistry, JobHandler};

/// 原样返回任务负载，用于部署后的连通性验证
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    fn job_type(&self) -> &str {
        "echo"
    }

    async fn handle(&self, job: &Job) -> Result<serde_json::Value, HandlerError> {
        Ok(job.payload.clone())
    }
}

pub fn builtin_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(EchoHandler));
    registry
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobflow_core::models::Job;
use thiserror::Error;

/// 任务处理器返回的错误
///
/// 错误描述原样作为 `fail_job` 的错误消息，是否重试由生命周期服务按消息判断。
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::InvalidPayload(e.to_string())
    }
}

/// 某一类任务的处理逻辑
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 处理的任务类型，与 `Job::job_type` 精确匹配
    fn job_type(&self) -> &str;

    async fn handle(&self, job: &Job) -> Result<serde_json::Value, HandlerError>;
}

/// 按任务类型索引的处理器注册表
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同类型已存在时替换并返回旧的处理器
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(handler.job_type().to_string(), handler)
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// 已注册的任务类型，按名称排序
    pub fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.list())
            .finish()
    }
}

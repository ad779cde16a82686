use thiserror::Error;

use crate::models::JobId;

/// 任务队列错误类型定义
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("工作队列错误: {0}")]
    Queue(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: JobId },

    #[error("死信记录未找到: {id}")]
    DeadLetterNotFound { id: i64 },

    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    /// 持久化写入成功但入队失败，留下一条没有队列条目的PENDING记录
    #[error("任务 {job_id} 已持久化但入队失败: {message}")]
    OrphanedEnqueue { job_id: JobId, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl JobQueueError {
    /// 是否属于基础设施的瞬时故障（连接中断、连接池超时等）
    ///
    /// 任务队列自身不会吞掉这类错误，由调用方决定是否使用
    /// [`crate::retry_policy::execute_with_conditional_retry`] 重试。
    pub fn is_transient(&self) -> bool {
        match self {
            JobQueueError::Queue(_) => true,
            JobQueueError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobQueueError::JobNotFound { .. } | JobQueueError::DeadLetterNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for JobQueueError {
    fn from(e: serde_json::Error) -> Self {
        JobQueueError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, JobQueueError>;

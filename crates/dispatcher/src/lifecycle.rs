use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobflow_core::models::{DeadLetterRecord, Job, JobId, JobOptions, JobStatusReport};
use jobflow_core::Result;

/// 失败上报的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureOutcome {
    /// 已回到 PENDING，并在退避结束后重新可见
    Retrying {
        retry_count: i32,
        delay_ms: u64,
        next_attempt_at: DateTime<Utc>,
    },
    /// 进入终态 FAILED 并写入死信
    DeadLettered(DeadLetterRecord),
    /// 任务不处于处理中或不由上报方持有，重复或过期的上报
    Ignored,
}

impl FailureOutcome {
    pub fn is_retrying(&self) -> bool {
        matches!(self, FailureOutcome::Retrying { .. })
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, FailureOutcome::DeadLettered(_))
    }
}

/// 任务生命周期接口
///
/// 生产方与 Worker 只通过该接口修改任务状态或队列内容。
#[async_trait]
pub trait JobLifecycle: Send + Sync {
    async fn create_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId>;

    /// 按 高 → 中 → 低 的顺序获取一个到期任务，没有可用任务时返回 `None`
    async fn acquire_job(&self, worker_id: &str) -> Result<Option<Job>>;

    /// 只有当前持有任务的 Worker 的上报才会生效；对终态任务或已被其他 Worker
    /// 持有的任务调用是记录日志后的空操作
    async fn complete_job(
        &self,
        job_id: &JobId,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<()>;

    async fn fail_job(
        &self,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> Result<FailureOutcome>;

    async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatusReport>;
}

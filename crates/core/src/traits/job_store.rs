use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DeadLetterRecord, Job, JobExecution, JobId, JobStatus};
use crate::Result;

/// 失败后重新排队时的状态迁移参数
#[derive(Debug, Clone)]
pub struct RetryTransition {
    /// 迁移后的重试次数
    pub retry_count: i32,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
    /// 退避结束、可再次被获取的时间
    pub scheduled_at: DateTime<Utc>,
}

/// 重试耗尽进入终态时的迁移参数
#[derive(Debug, Clone)]
pub struct TerminalTransition {
    pub retry_count: i32,
    pub error_message: String,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

/// 分页游标，取上一页最后一条任务的创建时间与ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCursor {
    pub created_at: DateTime<Utc>,
    pub job_id: JobId,
}

impl From<&Job> for JobCursor {
    fn from(job: &Job) -> Self {
        Self {
            created_at: job.created_at,
            job_id: job.id,
        }
    }
}

/// 获取成功后的任务记录与新建的执行记录
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub job: Job,
    pub execution: JobExecution,
}

/// 持久化任务记录的仓储接口
///
/// 所有 `record_*` 方法都是针对当前状态的条件更新：任务不处于预期状态，
/// 或者不由传入的 Worker 持有时，返回 `Ok(None)` 且不修改任何数据。
/// 多行修改在同一个事务中完成。
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 创建所需的表和索引（幂等）
    async fn ensure_schema(&self) -> Result<()>;

    /// 插入一条 PENDING 任务
    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>>;

    /// 按状态分页查询任务，按 (创建时间, ID) 升序，从 `after` 之后开始
    async fn list_jobs_by_status(
        &self,
        status: JobStatus,
        after: Option<JobCursor>,
        limit: i64,
    ) -> Result<Vec<Job>>;

    /// PENDING → PROCESSING，并追加一条执行记录
    async fn record_acquisition(
        &self,
        job_id: &JobId,
        worker_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Option<Acquisition>>;

    /// PROCESSING → COMPLETED，并结束当前执行记录
    async fn record_completion(
        &self,
        job_id: &JobId,
        worker_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<JobExecution>>;

    /// PROCESSING → PENDING（重试），当前执行记录标记为 FAILED
    async fn record_retry(
        &self,
        job_id: &JobId,
        worker_id: &str,
        transition: &RetryTransition,
    ) -> Result<Option<JobExecution>>;

    /// PROCESSING → FAILED，当前执行记录标记为 FAILED 并写入死信
    async fn record_dead_letter(
        &self,
        job_id: &JobId,
        worker_id: &str,
        transition: &TerminalTransition,
    ) -> Result<Option<DeadLetterRecord>>;

    /// 按尝试次数升序返回执行记录
    async fn list_executions(&self, job_id: &JobId) -> Result<Vec<JobExecution>>;

    async fn get_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRecord>>;

    async fn get_dead_letter_by_job(&self, job_id: &JobId) -> Result<Option<DeadLetterRecord>>;

    /// 最新的死信在前
    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>>;
}

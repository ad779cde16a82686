use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{JobId, JobMetadata, QueueDepths, QueueTier, WorkerStat, WorkerStats};
use crate::Result;

/// 将时间转换为队列排序分值（毫秒时间戳）
pub fn queue_score(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// 优先级分发层接口
///
/// 三个按分值排序的优先级队列、一个处理中集合、一个死信集合，外加每个任务的
/// 元数据哈希和每个 Worker 的统计计数。
///
/// [`WorkQueue::acquire`] 必须在存储层原子地完成“取出到期条目并放入处理中集合”，
/// 不允许由调用方先读后写。
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// 以给定分值加入优先级队列，分值越小越先被获取
    async fn enqueue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()>;

    /// 原子地取出分值 <= 当前时间的最小条目并转入处理中集合
    ///
    /// 队列中没有到期条目时最多等待 `wait`，超时返回 `Ok(None)`。
    async fn acquire(&self, tier: QueueTier, wait: Duration) -> Result<Option<JobId>>;

    /// 从处理中集合移除，返回条目此前是否存在
    async fn release(&self, job_id: &JobId) -> Result<bool>;

    /// 原子地从处理中集合移回优先级队列
    async fn requeue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()>;

    /// 原子地从处理中集合移入死信集合
    async fn move_to_dead_letter(&self, job_id: &JobId, score: i64) -> Result<()>;

    /// 任务是否仍在任一优先级队列或处理中集合中
    async fn is_tracked(&self, job_id: &JobId) -> Result<bool>;

    /// 写入任务元数据，`ttl` 为空时永久保留
    async fn put_metadata(
        &self,
        job_id: &JobId,
        metadata: &JobMetadata,
        ttl: Option<Duration>,
    ) -> Result<()>;

    async fn get_metadata(&self, job_id: &JobId) -> Result<Option<JobMetadata>>;

    /// 递增 Worker 统计计数并返回新值
    async fn increment_worker_stat(&self, worker_id: &str, stat: WorkerStat) -> Result<u64>;

    async fn worker_stats(&self, worker_id: &str) -> Result<WorkerStats>;

    async fn depths(&self) -> Result<QueueDepths>;
}

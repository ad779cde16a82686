use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use jobflow_core::config::{AppConfig, LifecycleConfig};
use jobflow_core::models::{
    DeadLetterRecord, Job, JobExecution, JobId, JobMetadata, JobOptions, JobPriority, JobStatus,
    JobStatusReport, QueueDepths, QueueTier, WorkerStat, WorkerStats,
};
use jobflow_core::retry_policy::{calculate_delay, is_retryable_error, RetryConfig};
use jobflow_core::traits::{
    queue_score, Acquisition, JobCursor, JobStore, RetryTransition, TerminalTransition, WorkQueue,
};
use jobflow_core::{JobQueueError, Result};

use crate::lifecycle::{FailureOutcome, JobLifecycle};

/// 生命周期服务的运行参数
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub retry: RetryConfig,
    pub lifecycle: LifecycleConfig,
    /// 每个优先级层级为空时的最长等待时间
    pub acquire_wait: Duration,
    /// 终态任务元数据的保留时间
    pub result_ttl: Duration,
    /// 维护扫描每页读取的行数
    pub sweep_batch_size: i64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            lifecycle: LifecycleConfig::default(),
            acquire_wait: Duration::from_secs(2),
            result_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_batch_size: 1000,
        }
    }
}

impl LifecycleSettings {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            lifecycle: config.lifecycle.clone(),
            acquire_wait: Duration::from_millis(config.work_queue.acquire_wait_ms),
            result_ttl: Duration::from_secs(config.work_queue.result_ttl_seconds),
            ..Self::default()
        }
    }
}

/// 任务生命周期服务
///
/// 唯一允许修改任务记录与工作队列内容的组件。每个操作先在关系库中完成
/// 条件状态迁移，再调整队列条目，两侧的修改总是成对出现。
pub struct JobLifecycleService {
    job_store: Arc<dyn JobStore>,
    work_queue: Arc<dyn WorkQueue>,
    settings: LifecycleSettings,
}

impl JobLifecycleService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        work_queue: Arc<dyn WorkQueue>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            job_store,
            work_queue,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    async fn require_job(&self, job_id: &JobId) -> Result<Job> {
        self.job_store
            .get_job(job_id)
            .await?
            .ok_or(JobQueueError::JobNotFound { id: *job_id })
    }

    /// 写入队列侧元数据，失败只记录告警
    async fn store_metadata(&self, job_id: &JobId, metadata: &JobMetadata, ttl: Option<Duration>) {
        if let Err(e) = self.work_queue.put_metadata(job_id, metadata, ttl).await {
            warn!("更新任务 {} 的元数据失败: {}", job_id, e);
        }
    }

    async fn bump_worker_stat(&self, worker_id: &str, stat: WorkerStat) {
        if let Err(e) = self.work_queue.increment_worker_stat(worker_id, stat).await {
            warn!("更新Worker {} 的统计失败: {}", worker_id, e);
        }
    }

    async fn publish(&self, job: &Job, tier: QueueTier) -> Result<()> {
        self.work_queue
            .put_metadata(&job.id, &JobMetadata::from_job(job), None)
            .await?;
        self.work_queue
            .enqueue(tier, &job.id, queue_score(job.created_at))
            .await
    }

    /// 将队列中取出的任务记录为处理中
    ///
    /// 返回 `Ok(None)` 表示该条目已过期（任务不是 PENDING），条目已被丢弃。
    async fn claim(&self, job_id: &JobId, tier: QueueTier, worker_id: &str) -> Result<Option<Job>> {
        let started_at = Utc::now();
        let recorded = match self
            .job_store
            .record_acquisition(job_id, worker_id, started_at)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                error!("记录任务 {} 的获取失败，放回 {}: {}", job_id, tier, e);
                if let Err(requeue_err) = self
                    .work_queue
                    .requeue(tier, job_id, queue_score(started_at))
                    .await
                {
                    error!("任务 {} 放回队列失败: {}", job_id, requeue_err);
                }
                return Err(e);
            }
        };

        let Some(Acquisition { job, execution }) = recorded else {
            warn!("队列条目 {} 对应的任务不处于PENDING状态，丢弃该条目", job_id);
            self.work_queue.release(job_id).await?;
            counter!("jobflow_stale_entries_total").increment(1);
            return Ok(None);
        };

        self.store_metadata(job_id, &JobMetadata::from_job(&job), None)
            .await;

        counter!("jobflow_jobs_acquired_total", "tier" => tier.queue_name()).increment(1);
        info!(
            job_id = %job_id,
            worker_id = %worker_id,
            attempt = execution.attempt_number,
            "任务已被获取"
        );
        Ok(Some(job))
    }

    fn to_time_delta(duration: Duration) -> Result<TimeDelta> {
        TimeDelta::from_std(duration)
            .map_err(|e| JobQueueError::InvalidArgument(format!("时间跨度超出范围: {e}")))
    }

    /// 失败进入终态时写入死信并转移队列条目
    async fn dead_letter(
        &self,
        job: &Job,
        worker_id: &str,
        error_message: &str,
        failure_reason: String,
        failed_at: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let transition = TerminalTransition {
            retry_count: (job.retry_count + 1).min(job.max_retries.max(0)),
            error_message: error_message.to_string(),
            failure_reason,
            failed_at,
        };
        let Some(record) = self
            .job_store
            .record_dead_letter(&job.id, worker_id, &transition)
            .await?
        else {
            info!("任务 {} 状态已被并发修改，忽略失败上报", job.id);
            return Ok(FailureOutcome::Ignored);
        };

        self.work_queue
            .move_to_dead_letter(&job.id, queue_score(failed_at))
            .await?;

        let mut metadata = JobMetadata::from_job(job);
        metadata.status = JobStatus::Failed;
        metadata.retry_count = record.retry_count;
        metadata.last_error = Some(error_message.to_string());
        metadata.completed_at = Some(failed_at);
        self.store_metadata(&job.id, &metadata, Some(self.settings.result_ttl))
            .await;

        counter!("jobflow_jobs_dead_lettered_total").increment(1);
        error!(
            job_id = %job.id,
            job_type = %job.job_type,
            retry_count = record.retry_count,
            "任务进入死信队列: {}",
            record.failure_reason
        );
        Ok(FailureOutcome::DeadLettered(record))
    }

    /// 失败后重新排队到中优先级队列，分值为退避结束的时间
    async fn schedule_retry(
        &self,
        job: &Job,
        worker_id: &str,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let delay_ms = calculate_delay(job.retry_count.max(0) as u32, &self.settings.retry);
        let next_attempt_at = failed_at + TimeDelta::milliseconds(delay_ms as i64);
        let transition = RetryTransition {
            retry_count: job.retry_count + 1,
            error_message: error_message.to_string(),
            failed_at,
            scheduled_at: next_attempt_at,
        };
        if self
            .job_store
            .record_retry(&job.id, worker_id, &transition)
            .await?
            .is_none()
        {
            info!("任务 {} 状态已被并发修改，忽略失败上报", job.id);
            return Ok(FailureOutcome::Ignored);
        }

        self.work_queue
            .requeue(QueueTier::RETRY, &job.id, queue_score(next_attempt_at))
            .await?;

        let mut metadata = JobMetadata::from_job(job);
        metadata.status = JobStatus::Pending;
        metadata.retry_count = transition.retry_count;
        metadata.last_error = Some(error_message.to_string());
        self.store_metadata(&job.id, &metadata, None).await;

        counter!("jobflow_jobs_retried_total").increment(1);
        warn!(
            job_id = %job.id,
            retry_count = transition.retry_count,
            max_retries = job.max_retries,
            "任务执行失败，{}ms 后重试: {}",
            delay_ms,
            error_message
        );
        Ok(FailureOutcome::Retrying {
            retry_count: transition.retry_count,
            delay_ms,
            next_attempt_at,
        })
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<Job> {
        self.require_job(job_id).await
    }

    pub async fn list_executions(&self, job_id: &JobId) -> Result<Vec<JobExecution>> {
        self.require_job(job_id).await?;
        self.job_store.list_executions(job_id).await
    }

    pub async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>> {
        if limit <= 0 {
            return Err(JobQueueError::InvalidArgument(format!(
                "查询数量必须大于0: {limit}"
            )));
        }
        self.job_store.list_dead_letters(limit).await
    }

    /// 基于死信记录创建一个新任务，原死信保留
    #[instrument(skip(self))]
    pub async fn recreate_from_dead_letter(&self, dead_letter_id: i64) -> Result<JobId> {
        let record = self
            .job_store
            .get_dead_letter(dead_letter_id)
            .await?
            .ok_or(JobQueueError::DeadLetterNotFound { id: dead_letter_id })?;

        let job_id = self
            .create_job(&record.job_type, record.payload.clone(), JobOptions::default())
            .await?;
        info!(
            "已根据死信 {} (原任务 {}) 重新创建任务 {}",
            dead_letter_id, record.original_job_id, job_id
        );
        Ok(job_id)
    }

    pub async fn queue_depths(&self) -> Result<QueueDepths> {
        self.work_queue.depths().await
    }

    pub async fn worker_stats(&self, worker_id: &str) -> Result<WorkerStats> {
        self.work_queue.worker_stats(worker_id).await
    }

    /// 分页读出某个状态的全部任务
    async fn scan_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let batch_size = self.settings.sweep_batch_size.max(1);
        let mut jobs = Vec::new();
        let mut cursor: Option<JobCursor> = None;

        loop {
            let page = self
                .job_store
                .list_jobs_by_status(status, cursor, batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(JobCursor::from(last));
            let exhausted = (page.len() as i64) < batch_size;
            jobs.extend(page);
            if exhausted {
                break;
            }
        }
        Ok(jobs)
    }

    /// 查找已持久化但不在任何队列中的 PENDING 任务
    ///
    /// 只做检测和告警，不自动补入队列。
    pub async fn find_orphaned_jobs(&self, grace: Duration) -> Result<Vec<JobId>> {
        let cutoff = Utc::now() - Self::to_time_delta(grace)?;
        let pending = self.scan_by_status(JobStatus::Pending).await?;

        let mut orphaned = Vec::new();
        for job in pending.iter().filter(|job| job.scheduled_at < cutoff) {
            if !self.work_queue.is_tracked(&job.id).await? {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    created_at = %job.created_at,
                    "发现孤儿任务：PENDING 记录不在任何队列中"
                );
                orphaned.push(job.id);
            }
        }

        if !orphaned.is_empty() {
            counter!("jobflow_orphaned_jobs_detected_total").increment(orphaned.len() as u64);
        }
        Ok(orphaned)
    }

    /// 回收超过租约时长仍处于处理中的任务
    ///
    /// 可选扩展，只有配置了 `lease_timeout_seconds` 才会被维护服务调用。
    /// 被回收的任务按一次失败处理，遵循正常的重试与死信规则。
    pub async fn reclaim_abandoned_jobs(&self, lease: Duration) -> Result<Vec<JobId>> {
        let cutoff = Utc::now() - Self::to_time_delta(lease)?;
        let processing = self.scan_by_status(JobStatus::Processing).await?;

        let mut reclaimed = Vec::new();
        for job in processing
            .iter()
            .filter(|job| job.started_at.is_some_and(|started| started < cutoff))
        {
            let Some(holder) = job.worker_id.as_deref() else {
                warn!("处理中的任务 {} 没有记录持有者，跳过回收", job.id);
                continue;
            };
            let message = format!(
                "lease expired: worker {} held the job longer than {}s",
                holder,
                lease.as_secs()
            );
            // 以原持有者的身份上报失败，持有者已变化时条件更新不会生效
            match self.fail_job(&job.id, holder, &message).await? {
                FailureOutcome::Ignored => {}
                _ => {
                    warn!("回收租约过期的任务 {}", job.id);
                    reclaimed.push(job.id);
                }
            }
        }
        Ok(reclaimed)
    }
}

#[async_trait]
impl JobLifecycle for JobLifecycleService {
    #[instrument(skip(self, payload, options), fields(job_type = %job_type))]
    async fn create_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId> {
        if job_type.trim().is_empty() {
            return Err(JobQueueError::InvalidArgument(
                "任务类型不能为空".to_string(),
            ));
        }
        if options.max_retries < 0 {
            return Err(JobQueueError::InvalidArgument(format!(
                "最大重试次数不能为负数: {}",
                options.max_retries
            )));
        }

        let priority = JobPriority::clamped(options.priority);
        if priority.level() != options.priority {
            warn!(
                "优先级 {} 超出 {}-{} 范围，已调整为 {}",
                options.priority,
                JobPriority::MIN_LEVEL,
                JobPriority::MAX_LEVEL,
                priority.level()
            );
        }

        let job = Job::new(job_type, payload, priority, options.max_retries);
        self.job_store.insert_job(&job).await?;

        let tier = job.tier();
        if let Err(e) = self.publish(&job, tier).await {
            counter!("jobflow_orphaned_enqueues_total").increment(1);
            error!(
                job_id = %job.id,
                tier = %tier,
                "任务已持久化但入队失败，该任务不会被任何Worker获取: {}",
                e
            );
            return Err(JobQueueError::OrphanedEnqueue {
                job_id: job.id,
                message: e.to_string(),
            });
        }

        counter!("jobflow_jobs_created_total").increment(1);
        info!(job_id = %job.id, tier = %tier, "任务已创建");
        Ok(job.id)
    }

    #[instrument(skip(self))]
    async fn acquire_job(&self, worker_id: &str) -> Result<Option<Job>> {
        for tier in QueueTier::ACQUIRE_ORDER {
            while let Some(job_id) = self
                .work_queue
                .acquire(tier, self.settings.acquire_wait)
                .await?
            {
                if let Some(job) = self.claim(&job_id, tier, worker_id).await? {
                    return Ok(Some(job));
                }
            }
        }

        debug!("没有可获取的任务");
        Ok(None)
    }

    #[instrument(skip(self, result), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn complete_job(
        &self,
        job_id: &JobId,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<()> {
        let job = self.require_job(job_id).await?;
        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                info!("任务已处于终态 {}，忽略重复的完成上报", job.status);
                return Ok(());
            }
            JobStatus::Pending => {
                error!("任务仍处于PENDING状态，未被获取就上报完成，忽略");
                return Ok(());
            }
            JobStatus::Processing => {}
        }
        if !job.is_held_by(worker_id) {
            warn!(
                "任务当前由 {} 持有，忽略过期的完成上报",
                job.worker_id.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }

        let completed_at = Utc::now();
        let Some(execution) = self
            .job_store
            .record_completion(job_id, worker_id, completed_at)
            .await?
        else {
            info!("任务状态已被并发修改，忽略完成上报");
            return Ok(());
        };

        self.work_queue.release(job_id).await?;

        let mut metadata = JobMetadata::from_job(&job);
        metadata.status = JobStatus::Completed;
        metadata.result = Some(result);
        metadata.last_error = None;
        metadata.completed_at = Some(completed_at);
        self.store_metadata(job_id, &metadata, Some(self.settings.result_ttl))
            .await;

        self.bump_worker_stat(&execution.worker_id, WorkerStat::JobsCompleted)
            .await;
        counter!("jobflow_jobs_completed_total").increment(1);
        info!(
            attempt = execution.attempt_number,
            execution_time_ms = ?execution.execution_time_ms,
            "任务已完成"
        );
        Ok(())
    }

    #[instrument(skip(self, error_message), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn fail_job(
        &self,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> Result<FailureOutcome> {
        let job = self.require_job(job_id).await?;
        if job.status != JobStatus::Processing {
            if job.is_terminal() {
                info!("任务已处于终态 {}，忽略重复的失败上报", job.status);
            } else {
                warn!("任务处于 {} 状态，不能上报失败，忽略", job.status);
            }
            return Ok(FailureOutcome::Ignored);
        }
        if !job.is_held_by(worker_id) {
            warn!(
                "任务当前由 {} 持有，忽略过期的失败上报",
                job.worker_id.as_deref().unwrap_or("unknown")
            );
            return Ok(FailureOutcome::Ignored);
        }

        let failed_at = Utc::now();
        let non_retryable =
            self.settings.lifecycle.dead_letter_non_retryable && !is_retryable_error(error_message);

        let outcome = if non_retryable {
            self.dead_letter(
                &job,
                worker_id,
                error_message,
                "不可重试的错误".to_string(),
                failed_at,
            )
            .await?
        } else if job.can_retry_after_failure() {
            self.schedule_retry(&job, worker_id, error_message, failed_at)
                .await?
        } else {
            let reason = format!("重试次数已耗尽 ({}/{})", job.retry_count + 1, job.max_retries);
            self.dead_letter(&job, worker_id, error_message, reason, failed_at)
                .await?
        };

        if outcome != FailureOutcome::Ignored {
            self.bump_worker_stat(worker_id, WorkerStat::JobsFailed).await;
            counter!("jobflow_jobs_failed_total").increment(1);
        }
        Ok(outcome)
    }

    async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatusReport> {
        let job = self.require_job(job_id).await?;

        let metadata = match self.work_queue.get_metadata(job_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("读取任务 {} 的元数据失败，只返回持久化状态: {}", job_id, e);
                None
            }
        };

        let result = metadata.as_ref().and_then(|m| m.result.clone());
        let error = if job.status == JobStatus::Completed {
            None
        } else {
            job.error_message
                .clone()
                .or_else(|| metadata.and_then(|m| m.last_error))
        };

        Ok(JobStatusReport {
            job_id: job.id,
            status: job.status,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            result,
            error,
        })
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobflow_core::models::{JobId, JobMetadata, QueueDepths, QueueTier, WorkerStat, WorkerStats};
use jobflow_core::retry_policy::RetryConfig;
use jobflow_core::traits::{JobStore, WorkQueue};
use jobflow_core::{JobQueueError, Result};
use jobflow_infrastructure::{InMemoryWorkQueue, SqliteJobStore};
use sqlx::sqlite::SqlitePoolOptions;

use crate::lifecycle_service::{JobLifecycleService, LifecycleSettings};

pub async fn sqlite_store() -> Arc<SqliteJobStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let store = SqliteJobStore::new(pool);
    store.ensure_schema().await.expect("Failed to create schema");
    Arc::new(store)
}

pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        retry: RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 1000,
            ..RetryConfig::default()
        }
        .without_jitter(),
        acquire_wait: Duration::from_millis(20),
        ..LifecycleSettings::default()
    }
}

/// 可以按需注入故障的工作队列
#[derive(Default)]
pub struct FlakyWorkQueue {
    inner: InMemoryWorkQueue,
    pub fail_enqueue: AtomicBool,
    pub fail_metadata: AtomicBool,
}

impl FlakyWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(JobQueueError::Queue("connect ECONNREFUSED 127.0.0.1:6379".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkQueue for FlakyWorkQueue {
    async fn enqueue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        Self::check(&self.fail_enqueue)?;
        self.inner.enqueue(tier, job_id, score).await
    }

    async fn acquire(&self, tier: QueueTier, wait: Duration) -> Result<Option<JobId>> {
        self.inner.acquire(tier, wait).await
    }

    async fn release(&self, job_id: &JobId) -> Result<bool> {
        self.inner.release(job_id).await
    }

    async fn requeue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        self.inner.requeue(tier, job_id, score).await
    }

    async fn move_to_dead_letter(&self, job_id: &JobId, score: i64) -> Result<()> {
        self.inner.move_to_dead_letter(job_id, score).await
    }

    async fn is_tracked(&self, job_id: &JobId) -> Result<bool> {
        self.inner.is_tracked(job_id).await
    }

    async fn put_metadata(
        &self,
        job_id: &JobId,
        metadata: &JobMetadata,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.inner.put_metadata(job_id, metadata, ttl).await
    }

    async fn get_metadata(&self, job_id: &JobId) -> Result<Option<JobMetadata>> {
        Self::check(&self.fail_metadata)?;
        self.inner.get_metadata(job_id).await
    }

    async fn increment_worker_stat(&self, worker_id: &str, stat: WorkerStat) -> Result<u64> {
        self.inner.increment_worker_stat(worker_id, stat).await
    }

    async fn worker_stats(&self, worker_id: &str) -> Result<WorkerStats> {
        self.inner.worker_stats(worker_id).await
    }

    async fn depths(&self) -> Result<QueueDepths> {
        self.inner.depths().await
    }
}

pub async fn lifecycle_with(queue: Arc<dyn WorkQueue>) -> (JobLifecycleService, Arc<SqliteJobStore>) {
    let store = sqlite_store().await;
    let service = JobLifecycleService::new(store.clone(), queue, fast_settings());
    (service, store)
}

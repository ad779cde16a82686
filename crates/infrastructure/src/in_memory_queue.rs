use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobflow_core::models::{JobId, JobMetadata, QueueDepths, QueueTier, WorkerStat, WorkerStats};
use jobflow_core::traits::{queue_score, WorkQueue};
use jobflow_core::Result;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

/// 单个优先级层级：按 (分值, 入队序号) 排序，同分值先进先出
#[derive(Debug, Default)]
struct TierQueue {
    order: BTreeSet<(i64, u64, JobId)>,
    members: HashMap<JobId, (i64, u64)>,
}

impl TierQueue {
    /// 已存在的条目只更新分值
    fn insert(&mut self, job_id: JobId, score: i64, seq: u64) {
        if let Some((old_score, old_seq)) = self.members.insert(job_id, (score, seq)) {
            self.order.remove(&(old_score, old_seq, job_id));
        }
        self.order.insert((score, seq, job_id));
    }

    fn pop_due(&mut self, now: i64) -> Option<JobId> {
        let first = *self.order.iter().next()?;
        if first.0 > now {
            return None;
        }
        self.order.remove(&first);
        self.members.remove(&first.2);
        Some(first.2)
    }

    fn next_score(&self) -> Option<i64> {
        self.order.iter().next().map(|(score, _, _)| *score)
    }

    fn contains(&self, job_id: &JobId) -> bool {
        self.members.contains_key(job_id)
    }

    fn len(&self) -> u64 {
        self.members.len() as u64
    }
}

#[derive(Debug, Default)]
struct QueueState {
    high: TierQueue,
    medium: TierQueue,
    low: TierQueue,
    processing: HashMap<JobId, i64>,
    dead_letter: HashMap<JobId, i64>,
    metadata: HashMap<JobId, (JobMetadata, Option<Instant>)>,
    worker_stats: HashMap<String, WorkerStats>,
    seq: u64,
}

impl QueueState {
    fn tier_mut(&mut self, tier: QueueTier) -> &mut TierQueue {
        match tier {
            QueueTier::High => &mut self.high,
            QueueTier::Medium => &mut self.medium,
            QueueTier::Low => &mut self.low,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// 进程内工作队列
///
/// 适用于单进程部署和测试。所有操作都在同一把互斥锁内完成，
/// 因此“取出到期条目并转入处理中集合”天然是原子的。
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let seq = state.next_seq();
            state.tier_mut(tier).insert(*job_id, score, seq);
        }
        self.notify.notify_waiters();
        debug!("任务 {} 加入 {} (score={})", job_id, tier, score);
        Ok(())
    }

    async fn acquire(&self, tier: QueueTier, wait: Duration) -> Result<Option<JobId>> {
        let deadline = Instant::now() + wait;

        loop {
            // 在检查之前注册，避免错过检查与等待之间的入队通知
            let notified = self.notify.notified();

            let (now_score, next_score) = {
                let mut state = self.state.lock().await;
                let now_score = queue_score(Utc::now());
                if let Some(job_id) = state.tier_mut(tier).pop_due(now_score) {
                    state.processing.insert(job_id, now_score);
                    return Ok(Some(job_id));
                }
                (now_score, state.tier_mut(tier).next_score())
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = match next_score {
                Some(score) => {
                    let due_in = Duration::from_millis((score - now_score).max(1) as u64);
                    deadline.min(now + due_in)
                }
                None => deadline,
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn release(&self, job_id: &JobId) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.processing.remove(job_id).is_some())
    }

    async fn requeue(&self, tier: QueueTier, job_id: &JobId, score: i64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.processing.remove(job_id);
            let seq = state.next_seq();
            state.tier_mut(tier).insert(*job_id, score, seq);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn move_to_dead_letter(&self, job_id: &JobId, score: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.processing.remove(job_id);
        state.dead_letter.insert(*job_id, score);
        Ok(())
    }

    async fn is_tracked(&self, job_id: &JobId) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.high.contains(job_id)
            || state.medium.contains(job_id)
            || state.low.contains(job_id)
            || state.processing.contains_key(job_id))
    }

    async fn put_metadata(
        &self,
        job_id: &JobId,
        metadata: &JobMetadata,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut state = self.state.lock().await;
        state
            .metadata
            .insert(*job_id, (metadata.clone(), expires_at));
        Ok(())
    }

    async fn get_metadata(&self, job_id: &JobId) -> Result<Option<JobMetadata>> {
        let mut state = self.state.lock().await;
        let expired = match state.metadata.get(job_id) {
            Some((_, Some(expires_at))) => *expires_at <= Instant::now(),
            Some((_, None)) => false,
            None => return Ok(None),
        };
        if expired {
            state.metadata.remove(job_id);
            return Ok(None);
        }
        Ok(state.metadata.get(job_id).map(|(metadata, _)| metadata.clone()))
    }

    async fn increment_worker_stat(&self, worker_id: &str, stat: WorkerStat) -> Result<u64> {
        let mut state = self.state.lock().await;
        let stats = state.worker_stats.entry(worker_id.to_string()).or_default();
        let counter = match stat {
            WorkerStat::JobsCompleted => &mut stats.jobs_completed,
            WorkerStat::JobsFailed => &mut stats.jobs_failed,
        };
        *counter += 1;
        Ok(*counter)
    }

    async fn worker_stats(&self, worker_id: &str) -> Result<WorkerStats> {
        let state = self.state.lock().await;
        Ok(state
            .worker_stats
            .get(worker_id)
            .copied()
            .unwrap_or_default())
    }

    async fn depths(&self) -> Result<QueueDepths> {
        let state = self.state.lock().await;
        Ok(QueueDepths {
            high: state.high.len(),
            medium: state.medium.len(),
            low: state.low.len(),
            processing: state.processing.len() as u64,
            dead_letter: state.dead_letter.len() as u64,
        })
    }
}

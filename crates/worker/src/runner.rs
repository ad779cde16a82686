use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobflow_core::config::WorkerConfig;
use jobflow_core::models::Job;
use jobflow_dispatcher::{FailureOutcome, JobLifecycle};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::handler::HandlerRegistry;

/// 一次运行期间的处理计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerSummary {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct RunnerCounters {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Worker 轮询循环
///
/// 在并发上限内不断获取任务，交给对应的处理器执行，再把结果上报给生命周期服务。
pub struct WorkerRunner {
    lifecycle: Arc<dyn JobLifecycle>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    hostname: String,
    permits: Arc<Semaphore>,
    counters: Arc<RunnerCounters>,
}

impl WorkerRunner {
    pub fn new(
        lifecycle: Arc<dyn JobLifecycle>,
        registry: HandlerRegistry,
        config: WorkerConfig,
    ) -> Self {
        let hostname = hostname::get()
            .unwrap_or_else(|_| "unknown".into())
            .to_string_lossy()
            .to_string();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            lifecycle,
            registry: Arc::new(registry),
            config,
            hostname,
            permits,
            counters: Arc::new(RunnerCounters::default()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn summary(&self) -> RunnerSummary {
        RunnerSummary {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// 当前正在执行的任务数
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs.max(1) - self.permits.available_permits()
    }

    /// 运行直到收到关闭信号，然后等待正在执行的任务结束
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> RunnerSummary {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut in_flight = JoinSet::new();

        info!(
            "Worker {} 已启动 (主机 {})，最大并发 {}，支持的任务类型: {:?}",
            self.config.worker_id,
            self.hostname,
            self.config.max_concurrent_jobs,
            self.registry.list()
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("任务执行协程异常退出: {}", e);
                }
            }

            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.recv() => break,
            };

            // 获取过程不可中断，否则队列条目可能停留在处理中集合
            match shutdown_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            match self.lifecycle.acquire_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    in_flight.spawn(Self::execute(
                        self.lifecycle.clone(),
                        self.registry.clone(),
                        self.counters.clone(),
                        self.config.worker_id.clone(),
                        job,
                        permit,
                    ));
                    continue;
                }
                Ok(None) => {
                    debug!("Worker {} 没有获取到任务", self.config.worker_id);
                }
                Err(e) => {
                    error!("Worker {} 获取任务失败: {}", self.config.worker_id, e);
                }
            }
            drop(permit);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!(
            "Worker {} 正在停止，等待 {} 个执行中的任务",
            self.config.worker_id,
            in_flight.len()
        );
        let drain = async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("任务执行协程异常退出: {}", e);
                }
            }
        };
        let timeout = Duration::from_secs(self.config.shutdown_timeout_seconds);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                "Worker {} 等待执行中任务超时 ({}s)，剩余任务保持PROCESSING状态",
                self.config.worker_id, self.config.shutdown_timeout_seconds
            );
        }

        let summary = self.summary();
        info!(
            "Worker {} 已停止，完成 {} 个，失败 {} 个",
            self.config.worker_id, summary.completed, summary.failed
        );
        summary
    }

    async fn execute(
        lifecycle: Arc<dyn JobLifecycle>,
        registry: Arc<HandlerRegistry>,
        counters: Arc<RunnerCounters>,
        worker_id: String,
        job: Job,
        _permit: OwnedSemaphorePermit,
    ) {
        let job_id = job.id;
        let outcome = match registry.get(&job.job_type) {
            Some(handler) => {
                let job = job.clone();
                match tokio::spawn(async move { handler.handle(&job).await }).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) => Err(format!("handler aborted: {e}")),
                }
            }
            None => {
                error!("没有注册任务类型 {} 的处理器", job.job_type);
                Err(format!("unsupported job type: {}", job.job_type))
            }
        };

        match outcome {
            Ok(output) => match lifecycle.complete_job(&job_id, &worker_id, output).await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => error!("上报任务 {} 完成失败: {}", job_id, e),
            },
            Err(message) => match lifecycle.fail_job(&job_id, &worker_id, &message).await {
                Ok(FailureOutcome::Retrying { delay_ms, .. }) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    debug!("任务 {} 将在 {}ms 后重试", job_id, delay_ms);
                }
                Ok(FailureOutcome::DeadLettered(record)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    debug!("任务 {} 已进入死信 {}", job_id, record.id);
                }
                Ok(FailureOutcome::Ignored) => {
                    warn!("任务 {} 的失败上报被忽略", job_id);
                }
                Err(e) => error!("上报任务 {} 失败结果时出错: {}", job_id, e),
            },
        }
    }
}

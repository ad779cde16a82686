use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// 处理中任务的租约时长（秒），为空时不回收被遗弃的任务
    pub lease_timeout_seconds: Option<u64>,
    /// PENDING 记录超过该时长仍不在任何队列中即视为孤儿（秒）
    pub orphan_grace_seconds: u64,
    pub maintenance_interval_seconds: u64,
    /// 不可重试的错误直接进入死信，不消耗重试次数
    pub dead_letter_non_retryable: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            lease_timeout_seconds: None,
            orphan_grace_seconds: 300,
            maintenance_interval_seconds: 60,
            dead_letter_non_retryable: false,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.maintenance_interval_seconds == 0 {
            return Err(anyhow::anyhow!("维护间隔必须大于0"));
        }

        if self.lease_timeout_seconds == Some(0) {
            return Err(anyhow::anyhow!("租约时长必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_id: String,
    pub max_concurrent_jobs: usize,
    /// 没有可获取任务时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_id: "worker-001".to_string(),
            max_concurrent_jobs: 4,
            poll_interval_ms: 1000,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }

        Ok(())
    }
}

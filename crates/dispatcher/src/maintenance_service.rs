use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use jobflow_core::config::LifecycleConfig;
use jobflow_core::models::{JobId, QueueDepths};
use jobflow_core::Result;

use crate::lifecycle_service::JobLifecycleService;

/// 单轮维护扫描的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub orphaned: Vec<JobId>,
    pub reclaimed: Vec<JobId>,
    pub depths: QueueDepths,
}

/// 周期性维护服务
///
/// - 检测入队失败留下的孤儿任务（只告警）
/// - 配置了租约时长时，回收被遗弃的处理中任务
pub struct MaintenanceService {
    lifecycle: Arc<JobLifecycleService>,
    config: LifecycleConfig,
}

impl MaintenanceService {
    pub fn new(lifecycle: Arc<JobLifecycleService>, config: LifecycleConfig) -> Self {
        Self { lifecycle, config }
    }

    pub async fn run_once(&self) -> Result<MaintenanceReport> {
        let orphaned = self
            .lifecycle
            .find_orphaned_jobs(Duration::from_secs(self.config.orphan_grace_seconds))
            .await?;

        let reclaimed = match self.config.lease_timeout_seconds {
            Some(lease) => {
                self.lifecycle
                    .reclaim_abandoned_jobs(Duration::from_secs(lease))
                    .await?
            }
            None => Vec::new(),
        };

        let depths = self.lifecycle.queue_depths().await?;
        debug!(
            high = depths.high,
            medium = depths.medium,
            low = depths.low,
            processing = depths.processing,
            dead_letter = depths.dead_letter,
            "队列深度"
        );

        if !orphaned.is_empty() || !reclaimed.is_empty() {
            warn!(
                "维护扫描完成: 孤儿任务 {} 个，回收任务 {} 个",
                orphaned.len(),
                reclaimed.len()
            );
        }

        Ok(MaintenanceReport {
            orphaned,
            reclaimed,
            depths,
        })
    }

    /// 按配置的间隔循环执行，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.maintenance_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "维护服务已启动，间隔 {}s，租约回收: {}",
            self.config.maintenance_interval_seconds,
            if self.config.lease_timeout_seconds.is_some() {
                "启用"
            } else {
                "关闭"
            }
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("维护扫描失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("维护服务收到关闭信号");
                    break;
                }
            }
        }
    }
}

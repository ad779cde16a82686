use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jobflow_core::config::AppConfig;
use jobflow_dispatcher::{JobLifecycleService, LifecycleSettings, MaintenanceService};
use jobflow_infrastructure::{DatabaseManager, WorkQueueFactory};
use jobflow_worker::{HandlerRegistry, WorkerRunner};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::handlers::builtin_handlers;

/// 主应用程序
///
/// 持有数据库连接与工作队列，运行维护服务，并在配置启用时运行 Worker。
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    lifecycle: Arc<JobLifecycleService>,
    registry: HandlerRegistry,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_handlers(config, builtin_handlers()).await
    }

    pub async fn with_handlers(config: AppConfig, registry: HandlerRegistry) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        let work_queue = WorkQueueFactory::create(&config.work_queue)
            .await
            .context("初始化工作队列失败")?;

        let lifecycle = Arc::new(JobLifecycleService::new(
            database.job_store(),
            work_queue,
            LifecycleSettings::from_app_config(&config),
        ));

        Ok(Self {
            config,
            database,
            lifecycle,
            registry,
        })
    }

    pub fn lifecycle(&self) -> Arc<JobLifecycleService> {
        Arc::clone(&self.lifecycle)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行直到收到关闭信号，返回前关闭数据库连接
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let maintenance_handle = {
            let maintenance =
                MaintenanceService::new(self.lifecycle(), self.config.lifecycle.clone());
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { maintenance.run(shutdown_rx).await })
        };

        let worker_handle = if self.config.worker.enabled {
            let runner = WorkerRunner::new(
                self.lifecycle(),
                self.registry.clone(),
                self.config.worker.clone(),
            );
            let shutdown_rx = shutdown_rx.resubscribe();
            Some(tokio::spawn(async move { runner.run(shutdown_rx).await }))
        } else {
            info!("Worker未启用，只运行维护服务");
            None
        };
        drop(shutdown_rx);

        if let Err(e) = maintenance_handle.await {
            error!("维护服务异常退出: {e}");
        }

        if let Some(handle) = worker_handle {
            match handle.await {
                Ok(summary) => info!(
                    "Worker 已退出，完成 {} 个任务，失败 {} 个",
                    summary.completed, summary.failed
                ),
                Err(e) => error!("Worker 异常退出: {e}"),
            }
        }

        self.database.close().await;
        info!("数据库连接已关闭");
        Ok(())
    }

    /// 关闭等待时间：Worker 的排空时间再留出余量
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.config.worker.shutdown_timeout_seconds + 5)
    }
}

//! 配置管理
//!
//! 配置按 默认值 → TOML 文件 → `JOBFLOW_` 环境变量 的顺序合并，
//! 加载完成后逐段校验。

pub mod models;

pub use models::{
    AppConfig, DatabaseConfig, LifecycleConfig, ObservabilityConfig, RedisConfig,
    WorkQueueConfig, WorkQueueType, WorkerConfig,
};
pub use crate::retry_policy::RetryConfig;

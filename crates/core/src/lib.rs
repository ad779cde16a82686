//! # jobflow-core
//!
//! 持久化任务队列的核心抽象：数据模型、错误类型、配置、重试策略，
//! 以及存储层 [`JobStore`] 与工作队列层 [`WorkQueue`] 两个接口。

pub mod config;
pub mod errors;
pub mod models;
pub mod retry_policy;
pub mod traits;

pub use config::*;
pub use errors::{JobQueueError, Result};
pub use models::*;
pub use retry_policy::{
    calculate_delay, execute_with_conditional_retry, execute_with_retry, is_retryable_error,
    RetryOutcome,
};
pub use traits::*;

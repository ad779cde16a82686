//! 任务执行侧：处理器注册表与 Worker 轮询循环

pub mod handler;
pub mod runner;

pub use handler::{HandlerError, HandlerRegistry, JobHandler};
pub use runner::{RunnerSummary, WorkerRunner};

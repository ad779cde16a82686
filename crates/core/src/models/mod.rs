//! # 数据模型
//!
//! 定义持久化任务队列的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Job - 任务
//! 持久化的工作单元，每个任务在关系库中有且只有一行权威记录。
//!
//! ### JobExecution - 执行尝试
//! 每次被 Worker 获取都会追加一行，`attempt_number` 从1开始单调递增。
//!
//! ### DeadLetterRecord - 死信
//! 重试耗尽的任务归档，每个任务最多产生一条。
//!
//! ### JobMetadata / QueueDepths / WorkerStats
//! 工作队列侧的缓存数据与统计，不是事实来源。
//!
//! ## 状态流转
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↑          │
//!    └──────────┤ (重试)
//!               ↓
//!             FAILED → 死信
//! ```
//!
//! ## 数据库映射
//!
//! ### jobs 表
//! - `job_id` - 主键（UUID 文本）
//! - `status` - 任务状态（VARCHAR）
//! - `priority` - 1-5
//! - `scheduled_at` - 最早可被获取的时间
//!
//! ### job_executions 表
//! - `id` - 自增主键
//! - `job_id` - 关联任务
//! - `attempt_number` - 第几次尝试
//!
//! ### dead_letter_queue 表
//! - `id` - 自增主键
//! - `original_job_id` - 原任务

pub mod dead_letter;
pub mod execution;
pub mod job;
pub mod queue;
mod sqlx_impls;

pub use dead_letter::*;
pub use execution::*;
pub use job::*;
pub use queue::*;

//! 组件之间的抽象接口
//!
//! - [`JobStore`] - 持久化记录（事实来源）
//! - [`WorkQueue`] - 优先级分发层（决定下一个交给谁）

pub mod job_store;
pub mod work_queue;

pub use job_store::*;
pub use work_queue::*;

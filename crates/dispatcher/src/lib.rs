//! 任务分发侧：生命周期服务与周期性维护
//!
//! [`JobLifecycleService`] 协调关系库与工作队列两侧的状态，
//! [`MaintenanceService`] 负责孤儿检测与可选的租约回收。

pub mod lifecycle;
pub mod lifecycle_service;
pub mod maintenance_service;

#[cfg(test)]
pub mod test_utils;

pub use lifecycle::{FailureOutcome, JobLifecycle};
pub use lifecycle_service::{JobLifecycleService, LifecycleSettings};
pub use maintenance_service::{MaintenanceReport, MaintenanceService};

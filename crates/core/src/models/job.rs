use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{JobQueueError, Result};

/// 任务的不透明唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| JobQueueError::InvalidArgument(format!("无效的任务ID '{s}': {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = JobQueueError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// 任务状态
///
/// 状态只能沿 `PENDING → PROCESSING → {COMPLETED | PENDING(重试) | FAILED}` 前进，
/// `COMPLETED` 与 `FAILED` 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 检查状态迁移是否合法
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Pending)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(JobQueueError::Serialization(format!("Invalid job status: {s}"))),
        }
    }
}

/// 任务优先级（1-5）
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(into = "i32", try_from = "i32")]
pub enum JobPriority {
    #[default]
    Lowest = 1,
    Low = 2,
    Normal = 3,
    High = 4,
    Critical = 5,
}

impl JobPriority {
    pub const MIN_LEVEL: i32 = 1;
    pub const MAX_LEVEL: i32 = 5;

    /// 将任意整数收敛到 1-5 区间
    pub fn clamped(level: i32) -> Self {
        match level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL) {
            1 => JobPriority::Lowest,
            2 => JobPriority::Low,
            3 => JobPriority::Normal,
            4 => JobPriority::High,
            _ => JobPriority::Critical,
        }
    }

    pub fn level(&self) -> i32 {
        *self as i32
    }

    /// 按优先级选择队列层级：>=4 高，>=2 中，其余低
    pub fn tier(&self) -> QueueTier {
        let level = self.level();
        if level >= 4 {
            QueueTier::High
        } else if level >= 2 {
            QueueTier::Medium
        } else {
            QueueTier::Low
        }
    }
}

impl From<JobPriority> for i32 {
    fn from(p: JobPriority) -> Self {
        p.level()
    }
}

impl TryFrom<i32> for JobPriority {
    type Error = JobQueueError;

    fn try_from(level: i32) -> Result<Self> {
        if (Self::MIN_LEVEL..=Self::MAX_LEVEL).contains(&level) {
            Ok(Self::clamped(level))
        } else {
            Err(JobQueueError::InvalidArgument(format!(
                "优先级必须在 {}-{} 之间: {level}",
                Self::MIN_LEVEL,
                Self::MAX_LEVEL
            )))
        }
    }
}

/// 工作队列的优先级层级，按 [`QueueTier::ACQUIRE_ORDER`] 的顺序被获取
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueTier {
    High,
    Medium,
    Low,
}

impl QueueTier {
    pub const ACQUIRE_ORDER: [QueueTier; 3] = [QueueTier::High, QueueTier::Medium, QueueTier::Low];

    /// 重试任务统一回到中优先级队列
    pub const RETRY: QueueTier = QueueTier::Medium;

    pub fn queue_name(&self) -> &'static str {
        match self {
            QueueTier::High => "high-priority-queue",
            QueueTier::Medium => "medium-priority-queue",
            QueueTier::Low => "low-priority-queue",
        }
    }
}

impl fmt::Display for QueueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// 持久化的任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 最早可被获取的时间，重试时为 now + 退避延迟
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: JobPriority,
        max_retries: i32,
    ) -> Self {
        // 截断到微秒，与 PostgreSQL TIMESTAMPTZ 的精度一致
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            worker_id: None,
            error_message: None,
            created_at: now,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn tier(&self) -> QueueTier {
        self.priority.tier()
    }

    /// 任务是否由指定 Worker 持有
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.worker_id.as_deref() == Some(worker_id)
    }

    /// 本次失败之后是否还能再次入队
    ///
    /// 失败计数为 `retry_count + 1`，只有严格小于 `max_retries` 才会重试，
    /// 否则任务进入 FAILED 并写入死信。
    pub fn can_retry_after_failure(&self) -> bool {
        self.retry_count + 1 < self.max_retries
    }
}

/// 创建任务时的可选参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: i32,
    pub max_retries: i32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 1,
            max_retries: 5,
        }
    }
}

impl JobOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// 提供给轮询方的任务状态视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_clamping_and_tiers() {
        assert_eq!(JobPriority::clamped(-3), JobPriority::Lowest);
        assert_eq!(JobPriority::clamped(9), JobPriority::Critical);

        assert_eq!(JobPriority::clamped(1).tier(), QueueTier::Low);
        assert_eq!(JobPriority::clamped(2).tier(), QueueTier::Medium);
        assert_eq!(JobPriority::clamped(3).tier(), QueueTier::Medium);
        assert_eq!(JobPriority::clamped(4).tier(), QueueTier::High);
        assert_eq!(JobPriority::clamped(5).tier(), QueueTier::High);

        assert!(JobPriority::try_from(0).is_err());
        assert_eq!(JobPriority::try_from(3).unwrap(), JobPriority::Normal);
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_job_holder_and_timestamp_precision() {
        let mut job = Job::new("email", serde_json::json!({}), JobPriority::Normal, 3);
        assert_eq!(job.created_at.timestamp_subsec_nanos() % 1000, 0);
        assert!(!job.is_held_by("worker-a"));

        job.worker_id = Some("worker-a".to_string());
        assert!(job.is_held_by("worker-a"));
        assert!(!job.is_held_by("worker-b"));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("PROCESING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_retry_boundary() {
        let mut job = Job::new("email", serde_json::json!({}), JobPriority::High, 5);
        assert!(job.can_retry_after_failure());
        job.retry_count = 3;
        assert!(job.can_retry_after_failure());
        job.retry_count = 4;
        assert!(!job.can_retry_after_failure());

        let single = Job::new("email", serde_json::json!({}), JobPriority::High, 1);
        assert!(!single.can_retry_after_failure());
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(JobId::parse("not-a-uuid").is_err());
    }
}

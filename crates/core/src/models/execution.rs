use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{JobQueueError, Result};
use crate::models::JobId;

/// 单次执行尝试的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: JobId,
    pub worker_id: String,
    /// 从1开始，等于该任务此前的执行次数 + 1
    pub attempt_number: i32,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl JobExecution {
    pub fn is_processing(&self) -> bool {
        matches!(self.status, ExecutionStatus::Processing)
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.started_at).num_milliseconds())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Processing => "PROCESSING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = JobQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PROCESSING" => Ok(ExecutionStatus::Processing),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            _ => Err(JobQueueError::Serialization(format!(
                "Invalid execution status: {s}"
            ))),
        }
    }
}

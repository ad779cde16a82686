use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{JobQueueError, Result};
use crate::models::{Job, JobStatus};

/// 工作队列侧缓存的任务元数据
///
/// 以哈希结构保存，字段名为 `jobType, status, priority, retryCount, result,
/// lastError, createdAt, updatedAt, completedAt`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetadata {
    pub job_type: String,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: i32,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobMetadata {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_type: job.job_type.clone(),
            status: job.status,
            priority: job.priority.level(),
            retry_count: job.retry_count,
            result: None,
            last_error: job.error_message.clone(),
            created_at: job.created_at,
            updated_at: Utc::now(),
            completed_at: job.completed_at,
        }
    }

    /// 转换为哈希字段列表，空值字段不写入
    pub fn to_fields(&self) -> Result<Vec<(String, String)>> {
        let mut fields = vec![
            ("jobType".to_string(), self.job_type.clone()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("priority".to_string(), self.priority.to_string()),
            ("retryCount".to_string(), self.retry_count.to_string()),
            ("createdAt".to_string(), self.created_at.to_rfc3339()),
            ("updatedAt".to_string(), self.updated_at.to_rfc3339()),
        ];
        if let Some(result) = &self.result {
            fields.push(("result".to_string(), serde_json::to_string(result)?));
        }
        if let Some(last_error) = &self.last_error {
            fields.push(("lastError".to_string(), last_error.clone()));
        }
        if let Some(completed_at) = &self.completed_at {
            fields.push(("completedAt".to_string(), completed_at.to_rfc3339()));
        }
        Ok(fields)
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            fields.get(name).ok_or_else(|| {
                JobQueueError::Serialization(format!("任务元数据缺少字段: {name}"))
            })
        };
        let parse_int = |name: &str| -> Result<i32> {
            get(name)?.parse::<i32>().map_err(|e| {
                JobQueueError::Serialization(format!("任务元数据字段 {name} 无效: {e}"))
            })
        };
        let parse_time = |value: &str| -> Result<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| JobQueueError::Serialization(format!("无效的时间戳 {value}: {e}")))
        };

        Ok(Self {
            job_type: get("jobType")?.clone(),
            status: get("status")?.parse()?,
            priority: parse_int("priority")?,
            retry_count: parse_int("retryCount")?,
            result: fields
                .get("result")
                .map(|raw| serde_json::from_str(raw))
                .transpose()?,
            last_error: fields.get("lastError").cloned(),
            created_at: parse_time(get("createdAt")?)?,
            updated_at: parse_time(get("updatedAt")?)?,
            completed_at: fields
                .get("completedAt")
                .map(|raw| parse_time(raw))
                .transpose()?,
        })
    }
}

/// 各队列当前条目数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueDepths {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub processing: u64,
    pub dead_letter: u64,
}

impl QueueDepths {
    pub fn pending_total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}

/// Worker 维度的累计统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStat {
    JobsCompleted,
    JobsFailed,
}

impl WorkerStat {
    pub fn field_name(&self) -> &'static str {
        match self {
            WorkerStat::JobsCompleted => "jobsCompleted",
            WorkerStat::JobsFailed => "jobsFailed",
        }
    }
}

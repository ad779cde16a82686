use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Job, JobId};

/// 耗尽重试次数的任务归档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterRecord {
    pub id: i64,
    pub original_job_id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub failure_reason: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// 根据死亡时刻的任务快照构造记录，`id` 由数据库生成
    pub fn from_job(job: &Job, failure_reason: impl Into<String>, last_error: &str) -> Self {
        Self {
            id: 0,
            original_job_id: job.id,
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            failure_reason: failure_reason.into(),
            retry_count: job.retry_count,
            last_error: Some(last_error.to_string()),
            created_at: Utc::now(),
        }
    }
}

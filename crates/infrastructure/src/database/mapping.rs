//! Shared database mapping utilities for the SQLite and PostgreSQL job stores
//!
//! PostgreSQL keeps payloads in JSONB columns while SQLite stores them as JSON text,
//! so the two backends differ only in how the payload column is read and written.

use jobflow_core::models::{JobId, JobPriority};
use jobflow_core::{JobQueueError, Result};
use sqlx::Row;

pub(crate) struct MappingHelpers;

impl MappingHelpers {
    pub fn parse_job_id(raw: &str) -> Result<JobId> {
        JobId::parse(raw)
            .map_err(|e| JobQueueError::Serialization(format!("数据库中的任务ID无效: {e}")))
    }

    /// 数据库中出现越界优先级时收敛到 1-5，而不是拒绝整行
    pub fn parse_priority(level: i32) -> JobPriority {
        JobPriority::clamped(level)
    }

    pub fn payload_to_sqlite(payload: &serde_json::Value) -> Result<String> {
        Ok(serde_json::to_string(payload)?)
    }

    pub fn parse_payload_sqlite(
        row: &sqlx::sqlite::SqliteRow,
        field_name: &str,
    ) -> Result<serde_json::Value> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str)
            .map_err(|e| JobQueueError::Serialization(format!("解析任务负载失败: {e}")))
    }

    pub fn parse_payload_postgres(
        row: &sqlx::postgres::PgRow,
        field_name: &str,
    ) -> Result<serde_json::Value> {
        Ok(row.try_get(field_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        let id = JobId::new();
        assert_eq!(MappingHelpers::parse_job_id(&id.to_string()).unwrap(), id);

        let err = MappingHelpers::parse_job_id("garbage").unwrap_err();
        assert!(matches!(err, JobQueueError::Serialization(_)));
    }

    #[test]
    fn test_parse_priority_clamps() {
        assert_eq!(MappingHelpers::parse_priority(0), JobPriority::Lowest);
        assert_eq!(MappingHelpers::parse_priority(4), JobPriority::High);
        assert_eq!(MappingHelpers::parse_priority(42), JobPriority::Critical);
    }

    #[test]
    fn test_payload_text_encoding() {
        let payload = serde_json::json!({"to": "ops@example.com", "tags": [1, 2]});
        let text = MappingHelpers::payload_to_sqlite(&payload).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&text).unwrap(), payload);
    }
}

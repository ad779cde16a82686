use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobflow_core::models::{DeadLetterRecord, ExecutionStatus, Job, JobExecution, JobId, JobStatus};
use jobflow_core::traits::{Acquisition, JobCursor, JobStore, RetryTransition, TerminalTransition};
use jobflow_core::{JobQueueError, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument, warn};

use crate::database::mapping::MappingHelpers;
use crate::database::schema::{DEAD_LETTER_COLUMNS, EXECUTION_COLUMNS, JOB_COLUMNS, SQLITE_SCHEMA};

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
        let job_id: String = row.try_get("job_id")?;
        Ok(Job {
            id: MappingHelpers::parse_job_id(&job_id)?,
            job_type: row.try_get("job_type")?,
            payload: MappingHelpers::parse_payload_sqlite(row, "payload")?,
            priority: MappingHelpers::parse_priority(row.try_get("priority")?),
            status: row.try_get("status")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            worker_id: row.try_get("worker_id")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<JobExecution> {
        let job_id: String = row.try_get("job_id")?;
        Ok(JobExecution {
            id: row.try_get("id")?,
            job_id: MappingHelpers::parse_job_id(&job_id)?,
            worker_id: row.try_get("worker_id")?,
            attempt_number: row.try_get("attempt_number")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            execution_time_ms: row.try_get("execution_time_ms")?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn row_to_dead_letter(row: &sqlx::sqlite::SqliteRow) -> Result<DeadLetterRecord> {
        let job_id: String = row.try_get("original_job_id")?;
        Ok(DeadLetterRecord {
            id: row.try_get("id")?,
            original_job_id: MappingHelpers::parse_job_id(&job_id)?,
            job_type: row.try_get("job_type")?,
            payload: MappingHelpers::parse_payload_sqlite(row, "payload")?,
            failure_reason: row.try_get("failure_reason")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// 结束当前处理中的执行记录
    ///
    /// 调用前任务行已在同一事务内离开 PROCESSING，执行记录缺失说明数据不一致。
    async fn finish_execution(
        tx: &mut Transaction<'_, Sqlite>,
        job_id: &JobId,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<JobExecution> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM job_executions WHERE job_id = $1 AND status = $2"
        );
        let current = sqlx::query(&sql)
            .bind(job_id.to_string())
            .bind(ExecutionStatus::Processing)
            .fetch_optional(&mut **tx)
            .await?;

        let current = match current {
            Some(row) => Self::row_to_execution(&row)?,
            None => {
                return Err(JobQueueError::Internal(format!(
                    "任务 {job_id} 处于处理中但没有对应的执行记录"
                )))
            }
        };

        let execution_time_ms = (finished_at - current.started_at).num_milliseconds().max(0);
        let sql = format!(
            "UPDATE job_executions SET status = $1, completed_at = $2, execution_time_ms = $3, \
             error_message = $4 WHERE id = $5 RETURNING {EXECUTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(status)
            .bind(finished_at)
            .bind(execution_time_ms)
            .bind(error_message)
            .bind(current.id)
            .fetch_one(&mut **tx)
            .await?;

        Self::row_to_execution(&row)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SQLITE_SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("SQLite任务表结构已就绪");
        Ok(())
    }

    #[instrument(skip(self, job), fields(
        job_id = %job.id,
        job_type = %job.job_type,
        priority = job.priority.level(),
    ))]
    async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, job_type, payload, priority, status, retry_count, max_retries,
                              worker_id, error_message, created_at, scheduled_at, started_at,
                              completed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $10)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.job_type)
        .bind(MappingHelpers::payload_to_sqlite(&job.payload)?)
        .bind(job.priority.level())
        .bind(job.status)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(&job.worker_id)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        debug!("任务已写入数据库");
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_job(&row)).transpose()
    }

    async fn list_jobs_by_status(
        &self,
        status: JobStatus,
        after: Option<JobCursor>,
        limit: i64,
    ) -> Result<Vec<Job>> {
        let rows = match after {
            Some(cursor) => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 \
                     AND (created_at > $2 OR (created_at = $2 AND job_id > $3)) \
                     ORDER BY created_at ASC, job_id ASC LIMIT $4"
                );
                sqlx::query(&sql)
                    .bind(status)
                    .bind(cursor.created_at)
                    .bind(cursor.job_id.to_string())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 \
                     ORDER BY created_at ASC, job_id ASC LIMIT $2"
                );
                sqlx::query(&sql)
                    .bind(status)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn record_acquisition(
        &self,
        job_id: &JobId,
        worker_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Option<Acquisition>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE jobs SET status = $1, worker_id = $2, started_at = $3, updated_at = $3 \
             WHERE job_id = $4 AND status = $5 RETURNING {JOB_COLUMNS}"
        );
        let updated = sqlx::query(&sql)
            .bind(JobStatus::Processing)
            .bind(worker_id)
            .bind(started_at)
            .bind(job_id.to_string())
            .bind(JobStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            debug!("任务不处于PENDING状态，忽略获取记录");
            return Ok(None);
        };
        let job = Self::row_to_job(&row)?;

        let prior_attempts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_executions WHERE job_id = $1")
                .bind(job_id.to_string())
                .fetch_one(&mut *tx)
                .await?;
        let attempt_number = i32::try_from(prior_attempts + 1).map_err(|_| {
            JobQueueError::Internal(format!("任务 {job_id} 的执行次数溢出"))
        })?;

        let sql = format!(
            "INSERT INTO job_executions (job_id, worker_id, attempt_number, status, started_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {EXECUTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(job_id.to_string())
            .bind(worker_id)
            .bind(attempt_number)
            .bind(ExecutionStatus::Processing)
            .bind(started_at)
            .fetch_one(&mut *tx)
            .await?;
        let execution = Self::row_to_execution(&row)?;

        tx.commit().await?;
        debug!("记录第 {} 次执行尝试", execution.attempt_number);
        Ok(Some(Acquisition { job, execution }))
    }

    #[instrument(skip(self), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn record_completion(
        &self,
        job_id: &JobId,
        worker_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<JobExecution>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, completed_at = $2, updated_at = $2
            WHERE job_id = $3 AND status = $4 AND worker_id = $5
            "#,
        )
        .bind(JobStatus::Completed)
        .bind(completed_at)
        .bind(job_id.to_string())
        .bind(JobStatus::Processing)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let execution = Self::finish_execution(
            &mut tx,
            job_id,
            ExecutionStatus::Completed,
            completed_at,
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(execution))
    }

    #[instrument(skip(self, transition), fields(job_id = %job_id, retry_count = transition.retry_count))]
    async fn record_retry(
        &self,
        job_id: &JobId,
        worker_id: &str,
        transition: &RetryTransition,
    ) -> Result<Option<JobExecution>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, retry_count = $2, error_message = $3, worker_id = NULL,
                scheduled_at = $4, updated_at = $5
            WHERE job_id = $6 AND status = $7 AND worker_id = $8
            "#,
        )
        .bind(JobStatus::Pending)
        .bind(transition.retry_count)
        .bind(&transition.error_message)
        .bind(transition.scheduled_at)
        .bind(transition.failed_at)
        .bind(job_id.to_string())
        .bind(JobStatus::Processing)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let execution = Self::finish_execution(
            &mut tx,
            job_id,
            ExecutionStatus::Failed,
            transition.failed_at,
            Some(&transition.error_message),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(execution))
    }

    #[instrument(skip(self, transition), fields(job_id = %job_id, retry_count = transition.retry_count))]
    async fn record_dead_letter(
        &self,
        job_id: &JobId,
        worker_id: &str,
        transition: &TerminalTransition,
    ) -> Result<Option<DeadLetterRecord>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, retry_count = $2, error_message = $3, completed_at = $4, updated_at = $4
            WHERE job_id = $5 AND status = $6 AND worker_id = $7
            "#,
        )
        .bind(JobStatus::Failed)
        .bind(transition.retry_count)
        .bind(&transition.error_message)
        .bind(transition.failed_at)
        .bind(job_id.to_string())
        .bind(JobStatus::Processing)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        Self::finish_execution(
            &mut tx,
            job_id,
            ExecutionStatus::Failed,
            transition.failed_at,
            Some(&transition.error_message),
        )
        .await?;

        let sql = format!(
            "INSERT INTO dead_letter_queue (original_job_id, job_type, payload, failure_reason, \
             retry_count, last_error, created_at) \
             SELECT job_id, job_type, payload, $1, retry_count, error_message, $2 \
             FROM jobs WHERE job_id = $3 RETURNING {DEAD_LETTER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&transition.failure_reason)
            .bind(transition.failed_at)
            .bind(job_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let record = Self::row_to_dead_letter(&row)?;

        tx.commit().await?;
        warn!("任务进入死信队列: {}", record.failure_reason);
        Ok(Some(record))
    }

    async fn list_executions(&self, job_id: &JobId) -> Result<Vec<JobExecution>> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM job_executions WHERE job_id = $1 \
             ORDER BY attempt_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn get_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRecord>> {
        let sql = format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letter_queue WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        row.map(|row| Self::row_to_dead_letter(&row)).transpose()
    }

    async fn get_dead_letter_by_job(&self, job_id: &JobId) -> Result<Option<DeadLetterRecord>> {
        let sql = format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letter_queue WHERE original_job_id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_dead_letter(&row)).transpose()
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>> {
        let sql =
            format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letter_queue ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_dead_letter).collect()
    }
}

//! 三张任务表的建表语句
//!
//! 状态列统一使用 VARCHAR 文本，任务ID以 UUID 文本存储。
//! `idx_job_executions_single_processing` 保证每个任务最多只有一条 PROCESSING 执行记录。

pub(crate) const JOB_COLUMNS: &str = "job_id, job_type, payload, priority, status, retry_count, \
     max_retries, worker_id, error_message, created_at, scheduled_at, started_at, completed_at";

pub(crate) const EXECUTION_COLUMNS: &str = "id, job_id, worker_id, attempt_number, status, \
     started_at, completed_at, execution_time_ms, error_message";

pub(crate) const DEAD_LETTER_COLUMNS: &str = "id, original_job_id, job_type, payload, \
     failure_reason, retry_count, last_error, created_at";

pub(crate) const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        job_type VARCHAR(255) NOT NULL,
        payload TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status VARCHAR(20) NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 5,
        worker_id VARCHAR(255),
        error_message TEXT,
        created_at TEXT NOT NULL,
        scheduled_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL REFERENCES jobs(job_id),
        worker_id VARCHAR(255) NOT NULL,
        attempt_number INTEGER NOT NULL,
        status VARCHAR(20) NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        execution_time_ms INTEGER,
        error_message TEXT,
        UNIQUE (job_id, attempt_number)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_job_executions_single_processing
        ON job_executions(job_id) WHERE status = 'PROCESSING'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        original_job_id TEXT NOT NULL UNIQUE REFERENCES jobs(job_id),
        job_type VARCHAR(255) NOT NULL,
        payload TEXT NOT NULL,
        failure_reason TEXT NOT NULL,
        retry_count INTEGER NOT NULL,
        last_error TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];

pub(crate) const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        job_type VARCHAR(255) NOT NULL,
        payload JSONB NOT NULL,
        priority INTEGER NOT NULL,
        status VARCHAR(20) NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 5,
        worker_id VARCHAR(255),
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id BIGSERIAL PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES jobs(job_id),
        worker_id VARCHAR(255) NOT NULL,
        attempt_number INTEGER NOT NULL,
        status VARCHAR(20) NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ,
        execution_time_ms BIGINT,
        error_message TEXT,
        UNIQUE (job_id, attempt_number)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_job_executions_single_processing
        ON job_executions(job_id) WHERE status = 'PROCESSING'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id BIGSERIAL PRIMARY KEY,
        original_job_id TEXT NOT NULL UNIQUE REFERENCES jobs(job_id),
        job_type VARCHAR(255) NOT NULL,
        payload JSONB NOT NULL,
        failure_reason TEXT NOT NULL,
        retry_count INTEGER NOT NULL,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

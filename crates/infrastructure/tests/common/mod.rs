//! SQLite 与 PostgreSQL 共用的 JobStore 测试场景

use chrono::{Duration, SubsecRound, Utc};
use jobflow_core::models::{ExecutionStatus, Job, JobId, JobPriority, JobStatus};
use jobflow_core::traits::{JobCursor, JobStore, RetryTransition, TerminalTransition};
use serde_json::json;

pub async fn insert_email_job(store: &dyn JobStore, max_retries: i32) -> Job {
    let job = Job::new(
        "email",
        json!({"to": "analyst@example.com", "template": "weekly-digest", "attachments": [1, 2]}),
        JobPriority::Critical,
        max_retries,
    );
    store.insert_job(&job).await.unwrap();
    job
}

fn now() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub async fn insert_and_get_job(store: &dyn JobStore) {
    let job = insert_email_job(store, 5).await;

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.job_type, "email");
    assert_eq!(loaded.payload, job.payload);
    assert_eq!(loaded.priority, JobPriority::Critical);
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.retry_count, 0);
    assert_eq!(loaded.max_retries, 5);
    assert!(loaded.worker_id.is_none());
    assert_eq!(loaded.created_at, job.created_at);
    assert_eq!(loaded.scheduled_at, job.scheduled_at);

    assert!(store.get_job(&JobId::new()).await.unwrap().is_none());
}

pub async fn schema_creation_is_idempotent(store: &dyn JobStore) {
    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
}

pub async fn acquisition_is_conditional_on_pending(store: &dyn JobStore) {
    let job = insert_email_job(store, 5).await;

    let first = store
        .record_acquisition(&job.id, "worker-a", now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.execution.attempt_number, 1);
    assert_eq!(first.execution.worker_id, "worker-a");
    assert_eq!(first.execution.status, ExecutionStatus::Processing);
    assert_eq!(first.job.status, JobStatus::Processing);
    assert_eq!(first.job.worker_id.as_deref(), Some("worker-a"));
    assert_eq!(first.job.payload, job.payload);

    // 已经在处理中的任务不能被第二个 Worker 再次获取
    let second = store
        .record_acquisition(&job.id, "worker-b", now())
        .await
        .unwrap();
    assert!(second.is_none());

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Processing);
    assert_eq!(loaded.worker_id.as_deref(), Some("worker-a"));
    assert_eq!(loaded.started_at, first.job.started_at);

    let executions = store.list_executions(&job.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions.iter().filter(|e| e.is_processing()).count(), 1);
}

pub async fn completion_records_execution_time(store: &dyn JobStore) {
    let job = insert_email_job(store, 5).await;
    let started_at = now() - Duration::milliseconds(250);

    store
        .record_acquisition(&job.id, "worker-a", started_at)
        .await
        .unwrap()
        .unwrap();

    // 非持有者的完成上报不生效
    assert!(store
        .record_completion(&job.id, "worker-b", now())
        .await
        .unwrap()
        .is_none());

    let execution = store
        .record_completion(&job.id, "worker-a", now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.execution_time_ms.unwrap() >= 250);
    assert!(execution.completed_at.is_some());

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert!(loaded.completed_at.is_some());

    // 重复完成不产生任何修改
    assert!(store
        .record_completion(&job.id, "worker-a", now())
        .await
        .unwrap()
        .is_none());
    let executions = store.list_executions(&job.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].completed_at, execution.completed_at);
}

pub async fn completion_requires_processing(store: &dyn JobStore) {
    let job = insert_email_job(store, 5).await;

    assert!(store
        .record_completion(&job.id, "worker-a", now())
        .await
        .unwrap()
        .is_none());
    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Pending);
}

pub async fn retry_returns_job_to_pending(store: &dyn JobStore) {
    let job = insert_email_job(store, 5).await;

    store
        .record_acquisition(&job.id, "worker-a", now())
        .await
        .unwrap()
        .unwrap();

    let failed_at = now();
    let transition = RetryTransition {
        retry_count: 1,
        error_message: "connect ECONNREFUSED 10.0.0.5:587".to_string(),
        failed_at,
        scheduled_at: failed_at + Duration::seconds(1),
    };
    assert!(store
        .record_retry(&job.id, "worker-b", &transition)
        .await
        .unwrap()
        .is_none());

    let failed = store
        .record_retry(&job.id, "worker-a", &transition)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("connect ECONNREFUSED 10.0.0.5:587")
    );

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.retry_count, 1);
    assert!(loaded.worker_id.is_none());
    assert_eq!(loaded.scheduled_at, transition.scheduled_at);

    // 重复的失败上报被忽略
    assert!(store
        .record_retry(&job.id, "worker-a", &transition)
        .await
        .unwrap()
        .is_none());

    let second = store
        .record_acquisition(&job.id, "worker-b", now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.execution.attempt_number, 2);
    assert_eq!(second.job.retry_count, 1);

    let attempts: Vec<i32> = store
        .list_executions(&job.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.attempt_number)
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

pub async fn dead_letter_written_once(store: &dyn JobStore) {
    let job = insert_email_job(store, 1).await;

    store
        .record_acquisition(&job.id, "worker-a", now())
        .await
        .unwrap()
        .unwrap();

    let transition = TerminalTransition {
        retry_count: 1,
        error_message: "Invalid input".to_string(),
        failure_reason: "重试次数已耗尽".to_string(),
        failed_at: now(),
    };
    assert!(store
        .record_dead_letter(&job.id, "worker-b", &transition)
        .await
        .unwrap()
        .is_none());
    assert!(store.list_dead_letters(10).await.unwrap().is_empty());

    let record = store
        .record_dead_letter(&job.id, "worker-a", &transition)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.original_job_id, job.id);
    assert_eq!(record.job_type, "email");
    assert_eq!(record.payload, job.payload);
    assert_eq!(record.retry_count, 1);
    assert_eq!(record.failure_reason, "重试次数已耗尽");
    assert_eq!(record.last_error.as_deref(), Some("Invalid input"));

    assert!(store
        .record_dead_letter(&job.id, "worker-a", &transition)
        .await
        .unwrap()
        .is_none());

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Failed);
    assert_eq!(loaded.retry_count, 1);

    let executions = store.list_executions(&job.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);

    assert_eq!(store.list_dead_letters(10).await.unwrap().len(), 1);
    assert_eq!(
        store.get_dead_letter(record.id).await.unwrap().unwrap(),
        record
    );
    assert_eq!(
        store.get_dead_letter_by_job(&job.id).await.unwrap().unwrap(),
        record
    );
    assert!(store.get_dead_letter(record.id + 100).await.unwrap().is_none());
}

pub async fn list_jobs_by_status_pages_in_creation_order(store: &dyn JobStore) {
    let mut pending = Vec::new();
    for _ in 0..5 {
        pending.push(insert_email_job(store, 5).await.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    let acquired = pending.remove(2);
    store
        .record_acquisition(&acquired, "worker-a", now())
        .await
        .unwrap()
        .unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<JobCursor> = None;
    loop {
        let page = store
            .list_jobs_by_status(JobStatus::Pending, cursor, 2)
            .await
            .unwrap();
        assert!(page.len() <= 2);
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(JobCursor::from(last));
        seen.extend(page.iter().map(|j| j.id));
    }
    assert_eq!(seen, pending);

    let processing = store
        .list_jobs_by_status(JobStatus::Processing, None, 10)
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, acquired);
}

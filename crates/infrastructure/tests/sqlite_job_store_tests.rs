mod common;

use jobflow_core::traits::JobStore;
use jobflow_infrastructure::SqliteJobStore;
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_store() -> SqliteJobStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let store = SqliteJobStore::new(pool);
    store.ensure_schema().await.expect("Failed to create schema");
    store
}

#[tokio::test]
async fn test_insert_and_get_job() {
    common::insert_and_get_job(&setup_store().await).await;
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    common::schema_creation_is_idempotent(&setup_store().await).await;
}

#[tokio::test]
async fn test_acquisition_is_conditional_on_pending() {
    common::acquisition_is_conditional_on_pending(&setup_store().await).await;
}

#[tokio::test]
async fn test_completion_records_execution_time() {
    common::completion_records_execution_time(&setup_store().await).await;
}

#[tokio::test]
async fn test_completion_requires_processing() {
    common::completion_requires_processing(&setup_store().await).await;
}

#[tokio::test]
async fn test_retry_returns_job_to_pending_with_next_attempt() {
    common::retry_returns_job_to_pending(&setup_store().await).await;
}

#[tokio::test]
async fn test_dead_letter_written_once() {
    common::dead_letter_written_once(&setup_store().await).await;
}

#[tokio::test]
async fn test_list_jobs_by_status_pages_in_creation_order() {
    common::list_jobs_by_status_pages_in_creation_order(&setup_store().await).await;
}

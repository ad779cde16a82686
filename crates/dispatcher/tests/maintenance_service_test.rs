use std::sync::Arc;
use std::time::Duration;

use jobflow_core::config::LifecycleConfig;
use jobflow_core::models::{JobOptions, JobStatus, QueueTier};
use jobflow_core::traits::{JobStore, WorkQueue};
use jobflow_dispatcher::{JobLifecycle, JobLifecycleService, LifecycleSettings, MaintenanceService};
use jobflow_infrastructure::{InMemoryWorkQueue, SqliteJobStore};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;

async fn setup() -> (Arc<JobLifecycleService>, Arc<InMemoryWorkQueue>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let store = Arc::new(SqliteJobStore::new(pool));
    store.ensure_schema().await.expect("Failed to create schema");
    let queue = Arc::new(InMemoryWorkQueue::new());
    let settings = LifecycleSettings {
        acquire_wait: Duration::from_millis(20),
        ..LifecycleSettings::default()
    };
    let service = Arc::new(JobLifecycleService::new(store, queue.clone(), settings));
    (service, queue)
}

fn config(lease_timeout_seconds: Option<u64>) -> LifecycleConfig {
    LifecycleConfig {
        lease_timeout_seconds,
        orphan_grace_seconds: 0,
        maintenance_interval_seconds: 1,
        ..LifecycleConfig::default()
    }
}

#[tokio::test]
async fn test_run_once_on_empty_queue() {
    let (service, _) = setup().await;
    let maintenance = MaintenanceService::new(service, config(None));

    let report = maintenance.run_once().await.unwrap();
    assert!(report.orphaned.is_empty());
    assert!(report.reclaimed.is_empty());
    assert_eq!(report.depths.pending_total(), 0);
}

#[tokio::test]
async fn test_run_once_detects_orphans_without_repairing() {
    let (service, queue) = setup().await;
    let tracked = service
        .create_job("email", json!({}), JobOptions::default().with_priority(1))
        .await
        .unwrap();
    let orphan = service
        .create_job("email", json!({}), JobOptions::default().with_priority(5))
        .await
        .unwrap();

    // 模拟队列条目丢失
    let removed = queue
        .acquire(QueueTier::High, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(removed, Some(orphan));
    assert!(queue.release(&orphan).await.unwrap());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let maintenance = MaintenanceService::new(service.clone(), config(None));
    let report = maintenance.run_once().await.unwrap();

    assert_eq!(report.orphaned, vec![orphan]);
    assert_eq!(report.depths.low, 1);
    assert!(!queue.is_tracked(&orphan).await.unwrap());
    assert!(queue.is_tracked(&tracked).await.unwrap());
    assert_eq!(
        service.get_job(&orphan).await.unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn test_lease_reclaim_only_when_configured() {
    let (service, _) = setup().await;
    let job_id = service
        .create_job("ingest", json!({}), JobOptions::default().with_priority(4))
        .await
        .unwrap();
    service.acquire_job("worker-gone").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let disabled = MaintenanceService::new(service.clone(), config(None));
    let report = disabled.run_once().await.unwrap();
    assert!(report.reclaimed.is_empty());
    assert_eq!(
        service.get_job(&job_id).await.unwrap().status,
        JobStatus::Processing
    );

    let enabled = MaintenanceService::new(service.clone(), config(Some(0)));
    let report = enabled.run_once().await.unwrap();
    assert_eq!(report.reclaimed, vec![job_id]);
    assert_eq!(report.depths.processing, 0);
    assert_eq!(report.depths.medium, 1);

    let job = service.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (service, _) = setup().await;
    let maintenance = Arc::new(MaintenanceService::new(service, config(None)));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = {
        let maintenance = maintenance.clone();
        tokio::spawn(async move { maintenance.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("maintenance loop did not stop")
        .unwrap();
}

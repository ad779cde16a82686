use std::io::Write;

use jobflow_core::config::{AppConfig, WorkQueueType};

// 环境变量是进程级的，所有覆盖场景放在同一个测试里顺序执行
#[test]
fn test_environment_overrides_file_values() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite::memory:"

[work_queue.redis]
host = "redis.from-file"

[worker]
max_concurrent_jobs = 2
"#
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.work_queue.redis.host, "redis.from-file");
    assert_eq!(config.worker.max_concurrent_jobs, 2);

    std::env::set_var("JOBFLOW_WORK_QUEUE__REDIS__HOST", "redis.internal");
    std::env::set_var("JOBFLOW_WORK_QUEUE__TYPE", "in_memory");
    std::env::set_var("JOBFLOW_WORKER__MAX_CONCURRENT_JOBS", "8");

    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.work_queue.redis.host, "redis.internal");
    assert_eq!(config.work_queue.r#type, WorkQueueType::InMemory);
    assert_eq!(config.worker.max_concurrent_jobs, 8);
    assert_eq!(config.database.url, "sqlite::memory:");

    std::env::set_var("JOBFLOW_WORKER__MAX_CONCURRENT_JOBS", "0");
    assert!(AppConfig::load(Some(&path)).is_err());

    std::env::remove_var("JOBFLOW_WORK_QUEUE__REDIS__HOST");
    std::env::remove_var("JOBFLOW_WORK_QUEUE__TYPE");
    std::env::remove_var("JOBFLOW_WORKER__MAX_CONCURRENT_JOBS");
}

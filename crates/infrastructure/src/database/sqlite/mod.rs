pub mod sqlite_job_store;

pub use sqlite_job_store::SqliteJobStore;

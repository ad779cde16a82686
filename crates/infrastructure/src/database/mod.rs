pub mod manager;
pub(crate) mod mapping;
pub mod postgres;
pub(crate) mod schema;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use postgres::PostgresJobStore;
pub use sqlite::SqliteJobStore;

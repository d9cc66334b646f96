//! Integration and unit tests for presenze.
//!
//! ## Test Modules
//!
//! - **api_tests**: the full router driven with `tower::ServiceExt::oneshot`
//! - **service_tests**: leave workflow through [`crate::leave::LeaveService`]
//! - **db_tests**: schema and store queries
//! - **config_tests**: configuration loading and validation
//! - **error_tests**: error envelope and field validators
//!
//! Every test gets its own in-memory SQLite database on a single connection.

pub mod service_tests;

use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Fresh schema in a private in-memory database.
pub(crate) async fn memory_pool() -> SqlitePool {
    // one connection, or every checkout would see a different empty database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

pub(crate) fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

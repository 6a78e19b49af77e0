//! On-device embedded store.
//!
//! One SQLite database holds the active session and context, the catalogs
//! mirrored at login, and records authored offline until they are uploaded.
//! All operations go through a single connection; the store must be
//! [`initialize`](LocalStore::initialize)d before use.

mod catalog;
pub mod guard;
pub mod models;
mod records;
mod schema;
mod session;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database not initialized")]
    NotInitialized,
    #[error("insert into {0} did not return a row id")]
    MissingRowId(&'static str),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub struct LocalStore {
    options: SqliteConnectOptions,
    pool: OnceCell<SqlitePool>,
}

impl LocalStore {
    /// Store backed by a database file, created on first initialization.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_options(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::with_options(SqliteConnectOptions::from_str(
            "sqlite::memory:",
        )?))
    }

    fn with_options(options: SqliteConnectOptions) -> Self {
        Self {
            options,
            pool: OnceCell::new(),
        }
    }

    /// Open the database and create any missing tables.
    ///
    /// Concurrent callers share the same in-flight initialization; once it has
    /// succeeded further calls return immediately. A failed attempt is not
    /// cached, so the next call tries again.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.pool
            .get_or_try_init(|| async {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None::<Duration>)
                    .max_lifetime(None::<Duration>)
                    .connect_with(self.options.clone())
                    .await
                    .inspect_err(|e| tracing::error!(error = %e, "failed to open local database"))?;

                schema::create_tables(&pool).await?;
                tracing::debug!("local database initialized");
                Ok::<_, StoreError>(pool)
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    fn pool(&self) -> Result<&SqlitePool, StoreError> {
        self.pool.get().ok_or(StoreError::NotInitialized)
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> LocalStore {
    let store = LocalStore::in_memory().unwrap();
    store.initialize().await.unwrap();
    store
}

/// Run raw SQL against a store, for tests outside this module that need to
/// install triggers or reshape rows.
#[cfg(test)]
pub(crate) async fn execute_raw(store: &LocalStore, sql: &str) {
    sqlx::query(sql)
        .execute(store.pool().unwrap())
        .await
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_operations_fail_before_initialize() {
        let store = LocalStore::in_memory().unwrap();
        assert!(!store.is_initialized());
        let err = store.get_session().await.unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
        let err = store.clear_session().await.unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = LocalStore::in_memory().unwrap();
        store.initialize().await.unwrap();
        store
            .save_session("u1", "tok", chrono::Utc::now())
            .await
            .unwrap();
        store.initialize().await.unwrap();
        // Second call must not recreate or wipe tables
        assert!(store.get_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_shares_one_result() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.initialize().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(store.is_initialized());
        assert!(store.get_tipos_usuario().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialize_is_retried() {
        let store = LocalStore::open("/nonexistent-dir/etnoapp.db");
        assert!(store.initialize().await.is_err());
        assert!(!store.is_initialized());
        assert!(store.initialize().await.is_err());
    }
}

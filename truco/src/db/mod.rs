//! Database module providing PostgreSQL connection pooling and the store
//! abstractions the core persists through.
//!
//! This module implements:
//! - `Database`: pooled PostgreSQL connection with migrations
//! - Repository traits (`LedgerStore`, `RoomStore`, `PaymentStore`)
//! - `PgStore` and the in-process `MemoryStore`
//! - Query timeouts and bounded retry

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;
pub mod retry;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repository::{LedgerStore, PaymentStore, PgStore, RoomStore};
pub use retry::RetryPolicy;

/// Pooled PostgreSQL connection shared by every [`PgStore`]
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool described by `config`
    ///
    /// Fails fast when the first connection cannot be established within
    /// `connection_timeout_secs`.
    ///
    /// ```no_run
    /// use truco::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::connect(&DatabaseConfig::from_env()).await?;
    ///     let store = db.store();
    ///     # let _ = store;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        log::info!(
            "Database pool ready ({}..{} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self { pool })
    }

    /// Ledger, room and payment store over this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations in `truco/migrations`
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> StoreResult<()> {
        retry::with_timeout(retry::DEFAULT_QUERY_TIMEOUT, async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    /// Wait for checked-out connections and close the pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

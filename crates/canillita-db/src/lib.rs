//! # canillita-db
//!
//! Storage for the canillita job queue and processed-post dedup store.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL implementations of `JobRepository` and `DedupStore`
//! - An in-memory store with the same semantics for tests and database-less runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use canillita_db::{Database, PoolConfig, Stores};
//!
//! let db = Database::connect("postgres://localhost/canillita", PoolConfig::default()).await?;
//! db.migrate().await?;
//! let stores = Stores::postgres(&db);
//! let pending = stores.jobs.pending_count().await?;
//! ```

pub mod jobs;
pub mod memory;
pub mod pool;
pub mod processed;

// Always compiled so integration tests in tests/ can reach it.
pub mod test_fixtures;

use std::sync::Arc;

use tokio::sync::Notify;

pub use canillita_core::*;

pub use jobs::PgJobRepository;
pub use memory::MemoryStore;
pub use pool::{create_pool, PoolConfig};
pub use processed::PgDedupStore;
pub use test_fixtures::DEFAULT_TEST_DATABASE_URL;

/// Database context holding the pool and both repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Job queue repository.
    pub jobs: PgJobRepository,
    /// Processed-post dedup store.
    pub posts: PgDedupStore,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            posts: PgDedupStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

/// The two stores the pipeline depends on, behind their traits.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobRepository>,
    pub dedup: Arc<dyn DedupStore>,
    /// Woken whenever a job becomes claimable.
    pub notify: Arc<Notify>,
}

impl Stores {
    /// Stores backed by one shared in-memory state.
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let notify = store.job_notify();
        let store = Arc::new(store);
        Self {
            jobs: store.clone(),
            dedup: store,
            notify,
        }
    }

    /// Stores backed by PostgreSQL.
    pub fn postgres(db: &Database) -> Self {
        Self {
            notify: db.jobs.job_notify(),
            jobs: Arc::new(db.jobs.clone()),
            dedup: Arc::new(db.posts.clone()),
        }
    }
}

//! PostgreSQL access
//!
//! One connection pool serves both the prompt tables and the `Vectors` table.
//! The pool is created at startup, checked with a trivial query, and closed
//! explicitly on shutdown.

pub mod vector;

use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::config::Config;
use crate::error::{Error, Result, StatusCode};

pub use vector::{PgVectorIndex, RetrievedChunk, VectorIndex, VectorRecord};

/// PostgreSQL connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Create the pool and check that the server answers
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut cfg = PoolConfig::new();
        cfg.dbname = Some(config.db_name.clone());
        cfg.user = Some(config.db_user.clone());
        cfg.password = Some(config.db_password.clone());
        cfg.host = Some(config.db_host.clone());
        cfg.port = config.db_port_number();
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                Error::database(
                    StatusCode::DATABASE_CONNECT,
                    format!("Failed to create PostgreSQL connection pool: {e}"),
                )
            })?;

        let db = Self { pool };
        let client = db.client(StatusCode::DATABASE_CONNECT).await?;
        client.simple_query("SELECT 1").await.map_err(|e| {
            Error::database_with_source(
                StatusCode::DATABASE_CONNECT,
                "PostgreSQL did not answer the connection check",
                e,
            )
        })?;

        tracing::info!(host = %config.db_host, db = %config.db_name, "Connection to PostgreSQL DB successful");
        Ok(db)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Pooled client; failures are reported under `code`
    pub async fn client(&self, code: StatusCode) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            Error::database(code, format!("Failed to get PostgreSQL connection: {e}"))
        })
    }

    /// Close the pool; later `client` calls fail
    pub fn close(&self) {
        self.pool.close();
        tracing::debug!("PostgreSQL pool closed");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("Database")
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

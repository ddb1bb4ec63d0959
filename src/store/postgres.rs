//! PostgreSQL asset store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! Batches are inserted with `jsonb_populate_recordset`, which maps the JSON
//! form of each record onto the table's columns by name.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row};
use std::time::Duration;
use uuid::Uuid;

use super::{AssetStore, Predicate, StoreError, StoreTransaction};
use crate::types::{Commit, CommitId, RecordBatch, Table};

/// DDL for the versioned asset tables.
///
/// Every asset table is keyed by `(mrid, commit_id)`: rows are appended,
/// never updated.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS commits (
    id BIGSERIAL PRIMARY KEY,
    message TEXT NOT NULL,
    author TEXT NOT NULL,
    branch TEXT NOT NULL DEFAULT 'main',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS entities (
    mrid UUID NOT NULL,
    commit_id BIGINT NOT NULL REFERENCES commits(id),
    model_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS reporting_groups (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS bus_name_markers (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    priority INTEGER NOT NULL, reporting_group_mrid UUID NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS connectivity_nodes (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    connectivity_node_container_mrid UUID NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS switches (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    base_voltage_mrid UUID NOT NULL, equipment_container_mrid UUID NOT NULL,
    normal_open BOOLEAN NOT NULL, retained BOOLEAN NOT NULL, rated_current DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS power_transformers (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    base_voltage_mrid UUID NOT NULL, equipment_container_mrid UUID NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS terminals (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    sequence_number INTEGER NOT NULL, phases TEXT NOT NULL,
    conducting_equipment_mrid UUID NOT NULL, connectivity_node_mrid UUID NOT NULL, bus_name_marker_mrid UUID NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS power_transformer_ends (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    end_number INTEGER NOT NULL, terminal_mrid UUID NOT NULL, base_voltage_mrid UUID NOT NULL,
    power_transformer_mrid UUID NOT NULL, connection_kind TEXT NOT NULL,
    rated_s DOUBLE PRECISION NOT NULL, rated_u DOUBLE PRECISION NOT NULL,
    r DOUBLE PRECISION NOT NULL, x DOUBLE PRECISION NOT NULL, g DOUBLE PRECISION NOT NULL, b DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS substations (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS voltage_levels (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    base_voltage_mrid UUID NOT NULL, substation_mrid UUID NOT NULL,
    low_voltage_limit DOUBLE PRECISION NOT NULL, high_voltage_limit DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS base_voltages (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    nominal_voltage DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS ac_line_segments (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    equipment_container_mrid UUID NOT NULL, base_voltage_mrid UUID NOT NULL,
    length DOUBLE PRECISION NOT NULL, r DOUBLE PRECISION NOT NULL, x DOUBLE PRECISION NOT NULL,
    bch DOUBLE PRECISION NOT NULL, gch DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS synchronous_machines (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    equipment_container_mrid UUID NOT NULL, rated_s DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
CREATE TABLE IF NOT EXISTS conform_loads (
    mrid UUID NOT NULL, commit_id BIGINT NOT NULL REFERENCES commits(id), deleted BOOLEAN NOT NULL DEFAULT FALSE,
    name TEXT NOT NULL, short_name TEXT NOT NULL, description TEXT NOT NULL,
    equipment_container_mrid UUID NOT NULL, p DOUBLE PRECISION NOT NULL, q DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (mrid, commit_id)
);
"#;

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/grid".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// PostgreSQL asset store.
pub struct PostgresAssetStore {
    pool: PgPool,
}

impl PostgresAssetStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the asset tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

/// Transaction on a [`PostgresAssetStore`].
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_commit(&mut self, commit: &Commit) -> Result<CommitId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO commits (message, author, branch, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&commit.message)
        .bind(&commit.author)
        .bind(&commit.branch)
        .bind(commit.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(CommitId::new(id))
    }

    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {table} SELECT * FROM jsonb_populate_recordset(NULL::{table}, $1)",
            table = batch.table.name()
        );
        let result = sqlx::query(&sql)
            .bind(Value::Array(batch.rows.clone()))
            .execute(&mut *self.tx)
            .await?;

        tracing::debug!(
            table = %batch.table,
            rows = result.rows_affected(),
            "Inserted batch"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for PostgresAssetStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn query(&self, table: Table, predicate: &Predicate) -> Result<Vec<Value>, StoreError> {
        let rows = match predicate {
            Predicate::All => {
                let sql = format!("SELECT to_jsonb(t) AS row FROM {} t", table.name());
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
            Predicate::ColumnIn { column, values } => {
                let sql = format!(
                    "SELECT to_jsonb(t) AS row FROM {} t WHERE t.{} = ANY($1)",
                    table.name(),
                    column
                );
                let uuids: Vec<Uuid> = values.iter().map(|m| m.as_uuid()).collect();
                sqlx::query(&sql).bind(&uuids).fetch_all(&self.pool).await?
            }
        };

        rows.iter()
            .map(|row| row.try_get::<Value, _>("row").map_err(StoreError::from))
            .collect()
    }
}

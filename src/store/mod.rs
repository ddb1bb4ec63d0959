//! Asset storage backends.
//!
//! The kernel consumes the relational engine through three primitives:
//! transactional batch inserts, commit-row inserts returning the generated
//! id, and predicate queries.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{Commit, CommitId, Mrid, RecordBatch, Table, TableRecord};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
    /// A row could not be encoded or decoded.
    #[error("Row serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The backend rejected the operation.
    #[error("Store rejected {operation}: {reason}")]
    Rejected {
        /// Operation that failed.
        operation: String,
        /// Backend-specific reason.
        reason: String,
    },
}

/// Row filter for [`AssetStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every row of the table.
    All,
    /// Rows whose `column` holds one of `values`.
    ColumnIn {
        /// Column holding an mrid reference.
        column: &'static str,
        /// Accepted values.
        values: Vec<Mrid>,
    },
}

impl Predicate {
    /// Rows whose own mrid is one of `values`.
    pub fn mrid_in(values: impl IntoIterator<Item = Mrid>) -> Self {
        Self::column_in("mrid", values)
    }

    /// Rows whose `column` is one of `values`.
    pub fn column_in(column: &'static str, values: impl IntoIterator<Item = Mrid>) -> Self {
        Self::ColumnIn {
            column,
            values: values.into_iter().collect(),
        }
    }

    /// Evaluate the predicate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::All => true,
            Self::ColumnIn { column, values } => row
                .get(*column)
                .and_then(|v| serde_json::from_value::<Mrid>(v.clone()).ok())
                .map(|mrid| values.contains(&mrid))
                .unwrap_or(false),
        }
    }
}

/// An open write transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// everything written through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert a commit row and return its generated id.
    async fn insert_commit(&mut self, commit: &Commit) -> Result<CommitId, StoreError>;

    /// Insert a batch of rows into one table.
    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<(), StoreError>;

    /// Make all writes of the transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all writes of the transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Trait for asset storage backends.
///
/// Query results contain every stored version; resolving the current state
/// is the caller's job (see [`crate::versioned`]).
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Open a write transaction.
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTransaction + 'a>, StoreError>;

    /// Fetch all rows of `table` matching `predicate`.
    async fn query(&self, table: Table, predicate: &Predicate) -> Result<Vec<Value>, StoreError>;
}

/// Fetch and decode every stored version of `T` matching `predicate`.
pub async fn fetch<T, S>(store: &S, predicate: &Predicate) -> Result<Vec<T>, StoreError>
where
    T: TableRecord,
    S: AssetStore + ?Sized,
{
    let rows = store.query(T::TABLE, predicate).await?;
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

pub use memory::{FailurePoint, InMemoryAssetStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresAssetStore;

//! In-memory asset store for testing.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{AssetStore, Predicate, StoreError, StoreTransaction};
use crate::types::{Commit, CommitId, RecordBatch, Table, TableRecord, Versioned};

/// Step at which an [`InMemoryAssetStore`] is told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Fail when inserting the commit row.
    Commit,
    /// Fail when inserting a batch into this table.
    Table(Table),
}

#[derive(Debug, Default)]
struct MemoryState {
    commits: Vec<Commit>,
    tables: BTreeMap<Table, Vec<Value>>,
    last_commit_id: i64,
    rows_written: usize,
}

/// In-memory asset store for testing.
///
/// Transactions stage their writes and apply them on commit, so a rolled
/// back or dropped transaction leaves no trace. Commit ids are taken from a
/// sequence and are never reused, even when the transaction rolls back.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    state: Mutex<MemoryState>,
    failure: Mutex<Option<FailurePoint>>,
    latency: Option<Duration>,
}

impl InMemoryAssetStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that fails at the given step of every transaction.
    pub fn failing_at(point: FailurePoint) -> Self {
        let store = Self::new();
        store.fail_at(Some(point));
        store
    }

    /// Delay every batch insert by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Change (or clear) the injected failure.
    pub fn fail_at(&self, point: Option<FailurePoint>) {
        *self.failure.lock() = point;
    }

    /// Seed records directly, outside any transaction.
    ///
    /// The commit sequence moves past the highest seeded commit id, so later
    /// transactions never reuse a seeded id.
    pub fn seed<T: TableRecord>(&self, records: &[T]) -> Result<(), StoreError> {
        let batch = RecordBatch::from_records(records)?;
        let highest = records.iter().map(|r| r.commit_id().get()).max().unwrap_or(0);
        let mut state = self.state.lock();
        state.last_commit_id = state.last_commit_id.max(highest);
        state.tables.entry(batch.table).or_default().extend(batch.rows);
        Ok(())
    }

    /// All committed commit rows.
    pub fn commits(&self) -> Vec<Commit> {
        self.state.lock().commits.clone()
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: Table) -> usize {
        self.state.lock().tables.get(&table).map(Vec::len).unwrap_or(0)
    }

    /// Rows persisted through transactions, commit rows included.
    pub fn rows_written(&self) -> usize {
        self.state.lock().rows_written
    }

    fn check_failure(&self, point: FailurePoint) -> Result<(), StoreError> {
        if *self.failure.lock() == Some(point) {
            return Err(StoreError::Rejected {
                operation: match point {
                    FailurePoint::Commit => "commit insert".to_string(),
                    FailurePoint::Table(table) => format!("insert into {table}"),
                },
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Transaction staging writes against an [`InMemoryAssetStore`].
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryAssetStore,
    commits: Vec<Commit>,
    batches: Vec<RecordBatch>,
}

#[async_trait]
impl<'a> StoreTransaction for InMemoryTransaction<'a> {
    async fn insert_commit(&mut self, commit: &Commit) -> Result<CommitId, StoreError> {
        self.store.check_failure(FailurePoint::Commit)?;

        let id = {
            let mut state = self.store.state.lock();
            state.last_commit_id += 1;
            CommitId::new(state.last_commit_id)
        };

        let mut stored = commit.clone();
        stored.id = Some(id);
        self.commits.push(stored);
        Ok(id)
    }

    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<(), StoreError> {
        if let Some(latency) = self.store.latency {
            tokio::time::sleep(latency).await;
        }
        self.store.check_failure(FailurePoint::Table(batch.table))?;
        self.batches.push(batch.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.store.state.lock();

        state.rows_written += this.commits.len();
        state.commits.extend(this.commits);
        for batch in this.batches {
            state.rows_written += batch.rows.len();
            state.tables.entry(batch.table).or_default().extend(batch.rows);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::debug!(
            staged_batches = self.batches.len(),
            "Discarding staged in-memory writes"
        );
        Ok(())
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            commits: Vec::new(),
            batches: Vec::new(),
        }))
    }

    async fn query(&self, table: Table, predicate: &Predicate) -> Result<Vec<Value>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|row| predicate.matches(row)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fetch;
    use crate::types::{BaseVoltage, IdentifiedObject, Mrid};
    use uuid::Uuid;

    fn base_voltage(id: u128, kv: f64) -> BaseVoltage {
        BaseVoltage {
            identity: IdentifiedObject::named(
                Mrid::new(Uuid::from_u128(id)),
                format!("{kv} kV"),
                "",
                "",
            ),
            nominal_voltage: kv,
        }
    }

    #[tokio::test]
    async fn test_committed_writes_are_visible() {
        let store = InMemoryAssetStore::new();
        let mut tx = store.begin().await.unwrap();

        let id = tx.insert_commit(&Commit::new("seed", "test")).await.unwrap();
        let batch = RecordBatch::from_records(&[base_voltage(1, 400.0)]).unwrap();
        tx.insert_batch(&batch).await.unwrap();

        assert_eq!(store.row_count(Table::BaseVoltages), 0);
        tx.commit().await.unwrap();

        assert_eq!(id, CommitId::new(1));
        assert_eq!(store.row_count(Table::BaseVoltages), 1);
        assert_eq!(store.commits()[0].id, Some(id));
        assert_eq!(store.rows_written(), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes_but_not_ids() {
        let store = InMemoryAssetStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_commit(&Commit::new("discarded", "test")).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_commit(&Commit::new("kept", "test")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(id, CommitId::new(2));
        assert_eq!(store.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_ids_continue_after_seeded_versions() {
        let store = InMemoryAssetStore::new();
        let mut seeded = base_voltage(1, 400.0);
        seeded.identity.commit_id = CommitId::new(7);
        store.seed(&[seeded, base_voltage(2, 132.0)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_commit(&Commit::new("after seed", "test")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(id, CommitId::new(8));

        // Seeding older versions never moves the sequence backwards
        let mut older = base_voltage(3, 66.0);
        older.identity.commit_id = CommitId::new(2);
        store.seed(&[older]).unwrap();

        let mut tx = store.begin().await.unwrap();
        let next = tx.insert_commit(&Commit::new("next", "test")).await.unwrap();
        assert_eq!(next, CommitId::new(9));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryAssetStore::failing_at(FailurePoint::Table(Table::BaseVoltages));
        let mut tx = store.begin().await.unwrap();
        let batch = RecordBatch::from_records(&[base_voltage(1, 400.0)]).unwrap();

        assert!(tx.insert_batch(&batch).await.is_err());
    }

    #[tokio::test]
    async fn test_query_with_predicate() {
        let store = InMemoryAssetStore::new();
        store.seed(&[base_voltage(1, 400.0), base_voltage(2, 132.0)]).unwrap();

        let all: Vec<BaseVoltage> = fetch(&store, &Predicate::All).await.unwrap();
        assert_eq!(all.len(), 2);

        let one: Vec<BaseVoltage> =
            fetch(&store, &Predicate::mrid_in([Mrid::new(Uuid::from_u128(2))])).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].nominal_voltage, 132.0);
    }
}

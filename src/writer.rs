//! Atomic, dependency-ordered persistence of synthesized aggregates.
//!
//! ## Protocol
//!
//! 1. Insert the commit row and obtain its generated id
//! 2. Stamp every identity record and every synthesized record with that id
//! 3. Insert the identity records
//! 4. Insert each typed batch, referenced tables before referencing ones
//!
//! All steps run in one transaction. A failure at any step rolls back
//! everything written so far and reports the step that failed.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{AssetStore, StoreError, StoreTransaction};
use crate::types::{Commit, CommitId, Entity, RecordBatch, Table};

/// A self-consistent set of new records persisted under one commit.
pub trait Aggregate {
    /// Stamp every record with the commit that persists it.
    fn assign_commit_id(&mut self, commit_id: CommitId);

    /// One identity record per asset in the aggregate.
    fn identities(&self, model_id: i32) -> Vec<Entity>;

    /// Typed batches in dependency order.
    fn batches(&self) -> Result<Vec<RecordBatch>, serde_json::Error>;
}

/// Step of the write protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Opening the transaction.
    Begin,
    /// Inserting the commit row.
    Commit,
    /// Encoding records into rows.
    Encode,
    /// Inserting identity records.
    Identities,
    /// Inserting a typed batch.
    Batch(Table),
    /// Committing the transaction.
    Finalize,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "transaction begin"),
            Self::Commit => write!(f, "commit insert"),
            Self::Encode => write!(f, "record encoding"),
            Self::Identities => write!(f, "identity insert"),
            Self::Batch(table) => write!(f, "batch insert into {table}"),
            Self::Finalize => write!(f, "transaction commit"),
        }
    }
}

/// Error type for atomic writes.
///
/// Every variant means no part of the aggregate was persisted.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A step of the protocol failed and the transaction was rolled back.
    #[error("Write failed at {step}: {source}")]
    Step {
        /// Failing step.
        step: WriteStep,
        /// Store error raised by the step.
        #[source]
        source: StoreError,
    },
    /// The write did not finish in time and was abandoned.
    #[error("Write timed out after {0:?}, no changes persisted")]
    TimedOut(Duration),
}

impl WriteError {
    /// Step that failed, if the write reached the store.
    pub fn step(&self) -> Option<WriteStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::TimedOut(_) => None,
        }
    }
}

fn at(step: WriteStep) -> impl FnOnce(StoreError) -> WriteError {
    move |source| WriteError::Step { step, source }
}

/// Writes aggregates to an [`AssetStore`] in a single transaction.
pub struct AtomicWriter<'s, S: AssetStore + ?Sized> {
    store: &'s S,
    model_id: i32,
}

impl<'s, S: AssetStore + ?Sized> AtomicWriter<'s, S> {
    /// Writer registering assets under `model_id`.
    pub fn new(store: &'s S, model_id: i32) -> Self {
        Self { store, model_id }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.store
    }

    /// Persist `aggregate` under a new commit.
    ///
    /// On success the aggregate's records carry the returned commit id. On
    /// failure they are reset to [`CommitId::UNSET`], so the aggregate can be
    /// written again as is.
    pub async fn write<A: Aggregate + Send>(
        &self,
        mut commit: Commit,
        aggregate: &mut A,
    ) -> Result<CommitId, WriteError> {
        let mut tx = self.store.begin().await.map_err(at(WriteStep::Begin))?;

        match self.write_steps(tx.as_mut(), &mut commit, aggregate).await {
            Ok(commit_id) => {
                if let Err(err) = tx.commit().await {
                    aggregate.assign_commit_id(CommitId::UNSET);
                    return Err(at(WriteStep::Finalize)(err));
                }
                info!(
                    commit_id = %commit_id,
                    message = %commit.message,
                    author = %commit.author,
                    "Committed aggregate"
                );
                Ok(commit_id)
            }
            Err(err) => {
                warn!(error = %err, "Rolling back aggregate write");
                aggregate.assign_commit_id(CommitId::UNSET);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn write_steps<A: Aggregate + Send>(
        &self,
        tx: &mut (dyn StoreTransaction + '_),
        commit: &mut Commit,
        aggregate: &mut A,
    ) -> Result<CommitId, WriteError> {
        let commit_id = tx.insert_commit(commit).await.map_err(at(WriteStep::Commit))?;
        commit.id = Some(commit_id);

        aggregate.assign_commit_id(commit_id);
        let mut identities = aggregate.identities(self.model_id);
        for identity in &mut identities {
            identity.commit_id = commit_id;
        }

        let identity_batch = RecordBatch::from_records(&identities)
            .map_err(|e| WriteError::Step { step: WriteStep::Encode, source: e.into() })?;
        let batches = aggregate
            .batches()
            .map_err(|e| WriteError::Step { step: WriteStep::Encode, source: e.into() })?;

        tx.insert_batch(&identity_batch)
            .await
            .map_err(at(WriteStep::Identities))?;

        for batch in &batches {
            tx.insert_batch(batch)
                .await
                .map_err(at(WriteStep::Batch(batch.table)))?;
            debug!(table = %batch.table, rows = batch.len(), "Inserted batch");
        }

        Ok(commit_id)
    }

    /// [`write`](Self::write) bounded by `timeout`.
    ///
    /// When the timeout elapses the in-flight transaction is dropped, which
    /// discards its writes, and the aggregate's commit stamp is reset.
    pub async fn write_with_timeout<A: Aggregate + Send>(
        &self,
        commit: Commit,
        aggregate: &mut A,
        timeout: Duration,
    ) -> Result<CommitId, WriteError> {
        let outcome = tokio::time::timeout(timeout, self.write(commit, &mut *aggregate)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                aggregate.assign_commit_id(CommitId::UNSET);
                warn!(timeout_ms = timeout.as_millis() as u64, "Aggregate write timed out");
                Err(WriteError::TimedOut(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fetch, FailurePoint, InMemoryAssetStore, Predicate};
    use crate::types::{
        BusNameMarker, ConnectivityNode, IdentifiedObject, Mrid, ReportingGroup, TableRecord,
        Versioned,
    };
    use uuid::Uuid;

    /// Reporting group, one marker and one node.
    struct SmallAggregate {
        group: ReportingGroup,
        markers: Vec<BusNameMarker>,
        nodes: Vec<ConnectivityNode>,
    }

    impl SmallAggregate {
        fn new() -> Self {
            let identity =
                |n: u128| IdentifiedObject::named(Mrid::new(Uuid::from_u128(n)), "x", "x", "x");
            Self {
                group: ReportingGroup { identity: identity(1) },
                markers: vec![BusNameMarker {
                    identity: identity(2),
                    reporting_group_mrid: Mrid::new(Uuid::from_u128(1)),
                    ..Default::default()
                }],
                nodes: vec![ConnectivityNode { identity: identity(3), ..Default::default() }],
            }
        }
    }

    impl Aggregate for SmallAggregate {
        fn assign_commit_id(&mut self, commit_id: CommitId) {
            self.group.set_commit_id(commit_id);
            self.markers.iter_mut().for_each(|m| m.set_commit_id(commit_id));
            self.nodes.iter_mut().for_each(|n| n.set_commit_id(commit_id));
        }

        fn identities(&self, model_id: i32) -> Vec<Entity> {
            let mut out = vec![Entity::of(&self.group, model_id)];
            out.extend(self.markers.iter().map(|m| Entity::of(m, model_id)));
            out.extend(self.nodes.iter().map(|n| Entity::of(n, model_id)));
            out
        }

        fn batches(&self) -> Result<Vec<RecordBatch>, serde_json::Error> {
            Ok(vec![
                RecordBatch::from_records(std::slice::from_ref(&self.group))?,
                RecordBatch::from_records(&self.markers)?,
                RecordBatch::from_records(&self.nodes)?,
            ])
        }
    }

    #[tokio::test]
    async fn test_write_stamps_and_persists() {
        let store = InMemoryAssetStore::new();
        let writer = AtomicWriter::new(&store, 7);
        let mut aggregate = SmallAggregate::new();

        let commit_id = writer
            .write(Commit::new("small", "test"), &mut aggregate)
            .await
            .unwrap();

        assert_eq!(aggregate.group.commit_id(), commit_id);
        assert_eq!(aggregate.nodes[0].commit_id(), commit_id);

        let entities: Vec<Entity> = fetch(&store, &Predicate::All).await.unwrap();
        assert_eq!(entities.len(), 3);
        assert!(entities.iter().all(|e| e.commit_id == commit_id && e.model_id == 7));

        let nodes: Vec<ConnectivityNode> = fetch(&store, &Predicate::All).await.unwrap();
        assert_eq!(nodes[0].commit_id(), commit_id);
        assert_eq!(store.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_at_each_step_rolls_back() {
        let points = [
            (FailurePoint::Commit, WriteStep::Commit),
            (FailurePoint::Table(Table::Entities), WriteStep::Identities),
            (
                FailurePoint::Table(Table::ReportingGroups),
                WriteStep::Batch(Table::ReportingGroups),
            ),
            (
                FailurePoint::Table(Table::ConnectivityNodes),
                WriteStep::Batch(Table::ConnectivityNodes),
            ),
        ];

        for (point, expected) in points {
            let store = InMemoryAssetStore::failing_at(point);
            let writer = AtomicWriter::new(&store, 0);
            let mut aggregate = SmallAggregate::new();

            let err = writer
                .write(Commit::new("doomed", "test"), &mut aggregate)
                .await
                .unwrap_err();

            assert_eq!(err.step(), Some(expected));
            assert_eq!(store.rows_written(), 0, "partial write at {expected}");
            assert!(store.commits().is_empty());
            assert_eq!(aggregate.group.commit_id(), CommitId::UNSET, "stamp kept at {expected}");
            assert_eq!(aggregate.nodes[0].commit_id(), CommitId::UNSET);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_persists_nothing() {
        let store = InMemoryAssetStore::new().with_latency(Duration::from_secs(10));
        let writer = AtomicWriter::new(&store, 0);
        let mut aggregate = SmallAggregate::new();

        let err = writer
            .write_with_timeout(Commit::new("slow", "test"), &mut aggregate, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::TimedOut(_)));
        assert_eq!(err.step(), None);
        assert_eq!(store.rows_written(), 0);
        assert_eq!(aggregate.group.commit_id(), CommitId::UNSET);
        assert_eq!(aggregate.markers[0].commit_id(), CommitId::UNSET);
    }
}

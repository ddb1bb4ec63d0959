//! Current-state resolution over the append-only version log.
//!
//! ## Rules
//!
//! - The latest version of an asset is the one with the largest commit id.
//!   Commit ids are unique, so there are no ties.
//! - The active view drops assets whose latest version is a tombstone; the
//!   full-history view keeps them.
//! - A version is always a complete snapshot. Payloads that leave schema
//!   fields unset are rejected instead of merged.
//! - Writing a snapshot whose checksum equals the stored one is a no-op, which
//!   keeps the log from growing on unchanged edits.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::canonical::content_checksum;
use crate::store::AssetStore;
use crate::types::{Commit, CommitId, Entity, Mrid, RecordBatch, TableRecord, Versioned};
use crate::writer::{Aggregate, AtomicWriter, WriteError};

/// Fields a payload may leave out: the commit stamp and the soft-delete flag.
///
/// The asset identity is never optional; a snapshot without `mrid` would
/// describe the nil asset.
pub const DEFAULT_ALLOWED_OMISSIONS: &[&str] = &["commit_id", "deleted"];

/// Keep only the most recent version of each asset.
///
/// Output is ordered by mrid.
pub fn latest_version<T, I>(records: I) -> Vec<T>
where
    T: Versioned,
    I: IntoIterator<Item = T>,
{
    let mut latest: BTreeMap<Mrid, T> = BTreeMap::new();
    for record in records {
        match latest.get(&record.mrid()) {
            Some(current) if current.commit_id() >= record.commit_id() => {}
            _ => {
                latest.insert(record.mrid(), record);
            }
        }
    }
    latest.into_values().collect()
}

/// Latest versions of all assets that are not deleted.
pub fn active_latest<T, I>(records: I) -> Vec<T>
where
    T: Versioned,
    I: IntoIterator<Item = T>,
{
    latest_version(records)
        .into_iter()
        .filter(|record| !record.is_deleted())
        .collect()
}

/// Error type for payload validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Payload is not a JSON object.
    #[error("Payload must be a JSON object")]
    NotAnObject,
    /// Schema fields missing from the payload.
    #[error("Fields not set: {}", .0.join(", "))]
    UnsetFields(Vec<String>),
    /// Payload could not be decoded into the record type.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Reject payloads that leave schema fields unset.
///
/// Every field of `schema_fields` must be in `supplied_fields` or in
/// `allowed_omissions`. The error lists the offending fields in schema order.
pub fn validate_complete_payload<S: AsRef<str>>(
    schema_fields: &[S],
    supplied_fields: &[S],
    allowed_omissions: &[&str],
) -> Result<(), ValidationError> {
    let supplied: BTreeSet<&str> = supplied_fields.iter().map(AsRef::as_ref).collect();
    let unset: Vec<String> = schema_fields
        .iter()
        .map(AsRef::as_ref)
        .filter(|field| !supplied.contains(field) && !allowed_omissions.contains(field))
        .map(str::to_string)
        .collect();

    if unset.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnsetFields(unset))
    }
}

/// Field names of a record type, in serialization order.
pub fn schema_fields<T: Serialize + Default>() -> Result<Vec<String>, serde_json::Error> {
    match serde_json::to_value(T::default())? {
        Value::Object(map) => Ok(map.keys().cloned().collect()),
        _ => Ok(Vec::new()),
    }
}

/// Field names present in a JSON object payload.
pub fn supplied_fields(payload: &Map<String, Value>) -> Vec<String> {
    payload.keys().cloned().collect()
}

/// Validate a JSON payload as a complete snapshot of `T` and decode it.
pub fn decode_complete<T>(payload: &Value, allowed_omissions: &[&str]) -> Result<T, ValidationError>
where
    T: TableRecord + Default,
{
    let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    let schema = schema_fields::<T>()?;
    validate_complete_payload(&schema, &supplied_fields(object), allowed_omissions)?;

    let mut complete = serde_json::to_value(T::default())?;
    if let Value::Object(target) = &mut complete {
        for (key, value) in object {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(complete)?)
}

/// Checksum of a record's content, independent of its commit stamp.
pub fn record_checksum<T: TableRecord>(record: &T) -> Result<String, serde_json::Error> {
    let mut unstamped = record.clone();
    unstamped.set_commit_id(CommitId::UNSET);
    content_checksum(&unstamped)
}

/// Result of [`commit_if_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Candidate matched the stored checksum; nothing was written.
    NoChanges,
    /// Candidate was written under this commit.
    Committed(CommitId),
}

/// Error type for [`commit_if_changed`].
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Candidate could not be checksummed.
    #[error("Failed to checksum candidate: {0}")]
    Checksum(#[from] serde_json::Error),
    /// Writing the new version failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// One new version of one record.
struct SingleVersion<T> {
    record: T,
}

impl<T: TableRecord> Aggregate for SingleVersion<T> {
    fn assign_commit_id(&mut self, commit_id: CommitId) {
        self.record.set_commit_id(commit_id);
    }

    fn identities(&self, model_id: i32) -> Vec<Entity> {
        vec![Entity::of(&self.record, model_id)]
    }

    fn batches(&self) -> Result<Vec<RecordBatch>, serde_json::Error> {
        Ok(vec![RecordBatch::from_records(std::slice::from_ref(&self.record))?])
    }
}

/// Append `candidate` as a new version unless its content is unchanged.
///
/// `stored_checksum` is the checksum the caller obtained for the current
/// version (see [`record_checksum`]).
pub async fn commit_if_changed<S, T>(
    writer: &AtomicWriter<'_, S>,
    stored_checksum: &str,
    candidate: T,
    commit: Commit,
) -> Result<CommitOutcome, CommitError>
where
    S: AssetStore + ?Sized,
    T: TableRecord,
{
    let checksum = record_checksum(&candidate)?;
    if checksum == stored_checksum {
        info!(mrid = %candidate.mrid(), "No changes detected, no commit performed");
        return Ok(CommitOutcome::NoChanges);
    }

    let mrid = candidate.mrid();
    let deleted = candidate.is_deleted();
    let mut version = SingleVersion { record: candidate };
    let commit_id = writer.write(commit, &mut version).await?;
    info!(mrid = %mrid, commit_id = %commit_id, deleted, "Committed new version");
    Ok(CommitOutcome::Committed(commit_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fetch, InMemoryAssetStore, Predicate};
    use crate::types::{BaseVoltage, IdentifiedObject, Table};
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    fn version(id: u128, commit: i64, deleted: bool) -> BaseVoltage {
        let mut identity = IdentifiedObject::named(Mrid::new(Uuid::from_u128(id)), "bv", "bv", "");
        identity.commit_id = CommitId::new(commit);
        identity.deleted = deleted;
        BaseVoltage { identity, nominal_voltage: commit as f64 }
    }

    fn keys(records: &[BaseVoltage]) -> Vec<(u128, i64)> {
        records
            .iter()
            .map(|r| (r.mrid().as_uuid().as_u128(), r.commit_id().get()))
            .collect()
    }

    #[test]
    fn test_latest_version_per_mrid() {
        let records = vec![version(0xA, 1, false), version(0xA, 3, false), version(0xB, 2, false)];
        assert_eq!(keys(&latest_version(records)), vec![(0xA, 3), (0xB, 2)]);
    }

    #[test]
    fn test_latest_version_ignores_input_order() {
        let records = vec![version(0xA, 3, false), version(0xB, 2, false), version(0xA, 1, false)];
        assert_eq!(keys(&latest_version(records)), vec![(0xA, 3), (0xB, 2)]);
    }

    #[test]
    fn test_tombstone_excluded_from_active_view_only() {
        let records = vec![version(0xA, 1, false), version(0xA, 4, true), version(0xB, 2, false)];

        assert_eq!(keys(&latest_version(records.clone())), vec![(0xA, 4), (0xB, 2)]);
        assert_eq!(keys(&active_latest(records)), vec![(0xB, 2)]);
    }

    #[test]
    fn test_older_tombstone_does_not_hide_revival() {
        let records = vec![version(0xA, 2, true), version(0xA, 5, false)];
        assert_eq!(keys(&active_latest(records)), vec![(0xA, 5)]);
    }

    #[test]
    fn test_validate_complete_payload() {
        let schema = ["mrid", "commit_id", "deleted", "name", "nominal_voltage"];

        assert!(validate_complete_payload(
            &schema,
            &["mrid", "name", "nominal_voltage"],
            DEFAULT_ALLOWED_OMISSIONS
        )
        .is_ok());

        let supplied = ["mrid", "name"];
        let err = validate_complete_payload(&schema, &supplied, DEFAULT_ALLOWED_OMISSIONS)
            .unwrap_err();
        match err {
            ValidationError::UnsetFields(fields) => assert_eq!(fields, vec!["nominal_voltage"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_fields_are_flat() {
        let fields = schema_fields::<BaseVoltage>().unwrap();
        assert!(fields.contains(&"mrid".to_string()));
        assert!(fields.contains(&"nominal_voltage".to_string()));
        assert!(!fields.contains(&"identity".to_string()));
    }

    #[test]
    fn test_decode_complete_rejects_sparse_patch() {
        let sparse = json!({ "name": "400 kV" });
        let err = decode_complete::<BaseVoltage>(&sparse, DEFAULT_ALLOWED_OMISSIONS).unwrap_err();
        let ValidationError::UnsetFields(fields) = err else {
            panic!("expected unset fields");
        };
        assert!(fields.contains(&"nominal_voltage".to_string()));
        assert!(fields.contains(&"short_name".to_string()));
    }

    #[test]
    fn test_decode_complete_accepts_full_snapshot() {
        let payload = json!({
            "mrid": Mrid::new(Uuid::from_u128(9)),
            "name": "400 kV",
            "short_name": "400",
            "description": "",
            "nominal_voltage": 400.0
        });
        let bv = decode_complete::<BaseVoltage>(&payload, DEFAULT_ALLOWED_OMISSIONS).unwrap();
        assert_eq!(bv.nominal_voltage, 400.0);
        assert_eq!(bv.commit_id(), CommitId::UNSET);

        assert!(matches!(
            decode_complete::<BaseVoltage>(&json!([1, 2]), DEFAULT_ALLOWED_OMISSIONS),
            Err(ValidationError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_complete_requires_mrid() {
        let anonymous = json!({
            "name": "400 kV",
            "short_name": "400",
            "description": "",
            "nominal_voltage": 400.0
        });
        let err =
            decode_complete::<BaseVoltage>(&anonymous, DEFAULT_ALLOWED_OMISSIONS).unwrap_err();
        let ValidationError::UnsetFields(fields) = err else {
            panic!("expected unset fields");
        };
        assert_eq!(fields, vec!["mrid"]);
    }

    #[test]
    fn test_checksum_ignores_commit_stamp() {
        let a = version(0xA, 1, false);
        let mut b = a.clone();
        b.identity.commit_id = CommitId::new(99);
        assert_eq!(record_checksum(&a).unwrap(), record_checksum(&b).unwrap());
    }

    #[tokio::test]
    async fn test_commit_if_changed_skips_unchanged() {
        let store = InMemoryAssetStore::new();
        let writer = AtomicWriter::new(&store, 0);
        let current = version(0xA, 1, false);
        let stored = record_checksum(&current).unwrap();

        let noop = Commit::new("noop", "test");
        let outcome = commit_if_changed(&writer, &stored, current.clone(), noop)
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::NoChanges);
        assert_eq!(store.rows_written(), 0);
        assert!(store.commits().is_empty());
    }

    #[tokio::test]
    async fn test_commit_if_changed_appends_version() {
        let store = InMemoryAssetStore::new();
        store.seed(&[version(0xA, 1, false)]).unwrap();
        let writer = AtomicWriter::new(&store, 0);
        let stored = record_checksum(&version(0xA, 1, false)).unwrap();

        let mut edited = version(0xA, 1, false);
        edited.nominal_voltage = 420.0;
        let outcome = commit_if_changed(&writer, &stored, edited, Commit::new("edit", "test"))
            .await
            .unwrap();

        let CommitOutcome::Committed(commit_id) = outcome else {
            panic!("expected a commit");
        };
        let all: Vec<BaseVoltage> = fetch(&store, &Predicate::All).await.unwrap();
        assert_eq!(all.len(), 2);
        let current = latest_version(all);
        assert_eq!(current[0].nominal_voltage, 420.0);
        assert_eq!(current[0].commit_id(), commit_id);
        assert_eq!(store.row_count(Table::Entities), 1);
    }

    proptest! {
        #[test]
        fn prop_latest_version_keeps_max_commit(
            entries in proptest::collection::vec((0u128..5, any::<bool>()), 1..40)
        ) {
            // Commit ids are unique: use the position as the commit id.
            let records: Vec<BaseVoltage> = entries
                .iter()
                .enumerate()
                .map(|(i, (id, deleted))| version(*id, i as i64 + 1, *deleted))
                .collect();

            let latest = latest_version(records.clone());
            let distinct: BTreeSet<u128> = entries.iter().map(|(id, _)| *id).collect();
            prop_assert_eq!(latest.len(), distinct.len());

            for record in &latest {
                let max = records
                    .iter()
                    .filter(|r| r.mrid() == record.mrid())
                    .map(|r| r.commit_id())
                    .max()
                    .unwrap();
                prop_assert_eq!(record.commit_id(), max);
            }

            let active = active_latest(records);
            prop_assert!(active.iter().all(|r| !r.is_deleted()));
            prop_assert_eq!(active.len(), latest.iter().filter(|r| !r.is_deleted()).count());
        }
    }
}

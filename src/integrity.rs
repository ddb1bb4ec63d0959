//! Data quality checks over stored topology.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::store::{fetch, AssetStore, Predicate, StoreError};
use crate::types::{Mrid, Terminal};
use crate::versioned::active_latest;

/// Equipment whose active terminals are not numbered `1..=n`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidSequenceNumbers {
    /// Name of the check.
    pub name: String,
    /// Offending terminals per equipment, sorted by sequence number.
    pub terminals: BTreeMap<Mrid, Vec<Terminal>>,
}

impl InvalidSequenceNumbers {
    /// Whether every equipment passed.
    pub fn is_clean(&self) -> bool {
        self.terminals.is_empty()
    }
}

/// Check that each equipment's active terminals are numbered from 1 to their count.
///
/// `terminals` may hold every stored version; the check runs on the active
/// view.
pub fn invalid_sequence_numbers(terminals: Vec<Terminal>) -> InvalidSequenceNumbers {
    let mut grouped: BTreeMap<Mrid, Vec<Terminal>> = BTreeMap::new();
    for terminal in active_latest(terminals) {
        grouped
            .entry(terminal.conducting_equipment_mrid)
            .or_default()
            .push(terminal);
    }

    grouped.retain(|_, terms| {
        let min = terms.iter().map(|t| t.sequence_number).min();
        let max = terms.iter().map(|t| t.sequence_number).max();
        !(min == Some(1) && max == Some(terms.len() as i32))
    });
    for terms in grouped.values_mut() {
        terms.sort_by_key(|t| t.sequence_number);
    }

    InvalidSequenceNumbers {
        name: "InvalidSequenceNumbers".to_string(),
        terminals: grouped,
    }
}

/// Run [`invalid_sequence_numbers`] over every terminal in the store.
pub async fn check_sequence_numbers<S>(store: &S) -> Result<InvalidSequenceNumbers, StoreError>
where
    S: AssetStore + ?Sized,
{
    let report = invalid_sequence_numbers(fetch(store, &Predicate::All).await?);
    if !report.is_clean() {
        warn!(
            equipment = report.terminals.len(),
            "Equipment with invalid terminal sequence numbers"
        );
    }
    Ok(report)
}

//! Identity and version identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of an asset, invariant across all of its versions.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mrid(Uuid);

impl Mrid {
    /// Create an mrid from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse an mrid from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// The all-zero mrid, used for unset references.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Whether this is the nil mrid.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for Mrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for Mrid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Generated id of a commit.
///
/// Commit ids are globally unique and strictly increasing, so the
/// version with the largest commit id is the most recent one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(i64);

impl CommitId {
    /// Placeholder carried by records that have not been stamped yet.
    pub const UNSET: CommitId = CommitId(0);

    /// Create a commit id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of fresh asset identities.
pub trait MridSource {
    /// Produce an mrid that has never been handed out before.
    fn next_mrid(&mut self) -> Mrid;
}

/// Random (UUID v4) identities for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMrids;

impl MridSource for RandomMrids {
    fn next_mrid(&mut self) -> Mrid {
        Mrid::new(Uuid::new_v4())
    }
}

/// Deterministic identities counting up from a start value.
///
/// Reproducible runs and golden tests use this instead of [`RandomMrids`].
#[derive(Debug, Clone)]
pub struct SequentialMrids {
    next: u128,
}

impl SequentialMrids {
    /// Start handing out ids at `start`.
    pub fn starting_at(start: u128) -> Self {
        Self { next: start }
    }
}

impl Default for SequentialMrids {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl MridSource for SequentialMrids {
    fn next_mrid(&mut self) -> Mrid {
        let mrid = Mrid::new(Uuid::from_u128(self.next));
        self.next += 1;
        mrid
    }
}

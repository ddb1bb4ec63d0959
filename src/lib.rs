//! # grid-topology-kernel
//!
//! Versioned power-grid asset resolution and connectivity topology synthesis.
//!
//! Every change to the asset model is an immutable, commit-stamped version.
//! The kernel answers two questions:
//!
//! > What is the current state of the asset graph?
//!
//! > Which switches, nodes and transformers are missing to fully interconnect
//! > a voltage level or a substation?
//!
//! ## Core Contract
//!
//! 1. The latest version of an asset is the one with the largest commit id;
//!    tombstoned assets are absent from the active view
//! 2. A synthesis run never links two points already connected within the
//!    hop bound
//! 3. Everything produced by one run shares one commit id and persists
//!    atomically
//!
//! ## Architecture
//!
//! ```text
//! AssetStore ─→ loader ─→ ConnectivityGraph ─→ Synthesizer ─→ AtomicWriter ─→ AssetStore
//!  (Postgres or Memory)          ↑                  │
//!                                └── new terminals ─┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod config;
pub mod graph;
pub mod integrity;
pub mod loader;
pub mod per_unit;
pub mod store;
pub mod synth;
pub mod telemetry;
pub mod types;
pub mod versioned;
pub mod writer;

// Re-exports
pub use types::{
    AcLineSegment, BaseVoltage, BusNameMarker, Commit, CommitId, ConformLoad, ConnectivityNode,
    Entity, IdentifiedObject, Mrid, MridSource, PowerTransformer, PowerTransformerEnd,
    RandomMrids, RecordBatch, ReportingGroup, SequentialMrids, Substation, Switch,
    SynchronousMachine, Table, TableRecord, Terminal, Versioned, VoltageLevel, WindingConnection,
};
pub use canonical::{content_checksum, to_canonical_bytes};
pub use config::KernelConfig;
pub use graph::{ConnectivityGraph, DEFAULT_HOP_BOUND};
pub use integrity::{invalid_sequence_numbers, InvalidSequenceNumbers};
pub use loader::LoadError;
pub use per_unit::PerUnit;
pub use store::{AssetStore, InMemoryAssetStore, Predicate, StoreError, StoreTransaction};
#[cfg(feature = "postgres")]
pub use store::PostgresAssetStore;
pub use synth::{
    ConnectableVoltageLevel, SubstationData, SubstationModel, SubstationSynthesizer, Topology,
    VoltageLevelEquipment, VoltageLevelModel, VoltageLevelSynthesizer,
};
pub use telemetry::{init_tracing, LogFormat};
pub use versioned::{
    active_latest, commit_if_changed, latest_version, validate_complete_payload, CommitError,
    CommitOutcome, ValidationError, DEFAULT_ALLOWED_OMISSIONS,
};
pub use writer::{Aggregate, AtomicWriter, WriteError, WriteStep};

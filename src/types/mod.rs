//! Core types for the grid topology kernel.

pub mod ids;
pub mod records;
pub mod table;

pub use ids::{CommitId, Mrid, MridSource, RandomMrids, SequentialMrids};
pub use records::{
    AcLineSegment, BaseVoltage, BusNameMarker, Commit, ConformLoad, ConnectivityNode, Entity,
    IdentifiedObject, PowerTransformer, PowerTransformerEnd, ReportingGroup, Substation, Switch,
    SynchronousMachine, TableRecord, Terminal, Versioned, VoltageLevel, WindingConnection,
};
pub use table::{RecordBatch, Table};

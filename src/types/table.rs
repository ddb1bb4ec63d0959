//! Table identifiers and type-erased record batches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::records::TableRecord;

/// Tables of the versioned asset model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Commit log.
    Commits,
    /// Identity records, one per asset version.
    Entities,
    /// Reporting groups.
    ReportingGroups,
    /// Bus name markers.
    BusNameMarkers,
    /// Connectivity nodes.
    ConnectivityNodes,
    /// Switches.
    Switches,
    /// Power transformers.
    PowerTransformers,
    /// Terminals.
    Terminals,
    /// Power transformer ends (windings).
    PowerTransformerEnds,
    /// Substations.
    Substations,
    /// Voltage levels.
    VoltageLevels,
    /// Base voltages.
    BaseVoltages,
    /// AC line segments.
    AcLineSegments,
    /// Synchronous machines.
    SynchronousMachines,
    /// Conform loads.
    ConformLoads,
}

impl Table {
    /// SQL table name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commits => "commits",
            Self::Entities => "entities",
            Self::ReportingGroups => "reporting_groups",
            Self::BusNameMarkers => "bus_name_markers",
            Self::ConnectivityNodes => "connectivity_nodes",
            Self::Switches => "switches",
            Self::PowerTransformers => "power_transformers",
            Self::Terminals => "terminals",
            Self::PowerTransformerEnds => "power_transformer_ends",
            Self::Substations => "substations",
            Self::VoltageLevels => "voltage_levels",
            Self::BaseVoltages => "base_voltages",
            Self::AcLineSegments => "ac_line_segments",
            Self::SynchronousMachines => "synchronous_machines",
            Self::ConformLoads => "conform_loads",
        }
    }

    /// CIM class name recorded on identity records.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Commits => "Commit",
            Self::Entities => "Entity",
            Self::ReportingGroups => "ReportingGroup",
            Self::BusNameMarkers => "BusNameMarker",
            Self::ConnectivityNodes => "ConnectivityNode",
            Self::Switches => "Switch",
            Self::PowerTransformers => "PowerTransformer",
            Self::Terminals => "Terminal",
            Self::PowerTransformerEnds => "PowerTransformerEnd",
            Self::Substations => "Substation",
            Self::VoltageLevels => "VoltageLevel",
            Self::BaseVoltages => "BaseVoltage",
            Self::AcLineSegments => "ACLineSegment",
            Self::SynchronousMachines => "SynchronousMachine",
            Self::ConformLoads => "ConformLoad",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A batch of rows bound for one table.
///
/// Rows are the JSON form of typed records so that stores can insert any
/// table through a single primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Target table.
    pub table: Table,
    /// Rows in insertion order.
    pub rows: Vec<Value>,
}

impl RecordBatch {
    /// Encode typed records into a batch for their table.
    pub fn from_records<T: TableRecord>(records: &[T]) -> Result<Self, serde_json::Error> {
        let rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { table: T::TABLE, rows })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

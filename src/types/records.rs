//! Versioned CIM records.
//!
//! Every record is a complete snapshot of one asset at one commit. The shared
//! identity columns live in [`IdentifiedObject`], flattened into each record
//! so that rows stay one level deep on the wire and in SQL.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ids::{CommitId, Mrid};
use super::table::Table;

/// Read access to the version key of a record.
pub trait Versioned {
    /// Stable asset identity.
    fn mrid(&self) -> Mrid;
    /// Commit that produced this version.
    fn commit_id(&self) -> CommitId;
    /// Whether this version is a tombstone.
    fn is_deleted(&self) -> bool;
}

/// A versioned record persisted in a known table.
pub trait TableRecord: Versioned + Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Table the record lives in.
    const TABLE: Table;

    /// Stamp the record with the commit that persists it.
    fn set_commit_id(&mut self, commit_id: CommitId);
}

/// Identity and version columns shared by all CIM records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedObject {
    /// Asset identity.
    pub mrid: Mrid,
    /// Commit that produced this version.
    pub commit_id: CommitId,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Display name.
    pub name: String,
    /// Short display name.
    pub short_name: String,
    /// Free-form description.
    pub description: String,
}

impl IdentifiedObject {
    /// Unstamped, live identity with the given names.
    pub fn named(
        mrid: Mrid,
        name: impl Into<String>,
        short_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            mrid,
            commit_id: CommitId::UNSET,
            deleted: false,
            name: name.into(),
            short_name: short_name.into(),
            description: description.into(),
        }
    }
}

macro_rules! versioned_record {
    ($($ty:ty => $table:expr),+ $(,)?) => {
        $(
            impl Versioned for $ty {
                fn mrid(&self) -> Mrid {
                    self.identity.mrid
                }

                fn commit_id(&self) -> CommitId {
                    self.identity.commit_id
                }

                fn is_deleted(&self) -> bool {
                    self.identity.deleted
                }
            }

            impl TableRecord for $ty {
                const TABLE: Table = $table;

                fn set_commit_id(&mut self, commit_id: CommitId) {
                    self.identity.commit_id = commit_id;
                }
            }
        )+
    };
}

/// Substation containing voltage levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Substation {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
}

/// Nominal voltage shared by a set of voltage levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseVoltage {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Nominal voltage in kV.
    pub nominal_voltage: f64,
}

/// Voltage level inside a substation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoltageLevel {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Base voltage of the level.
    pub base_voltage_mrid: Mrid,
    /// Containing substation.
    pub substation_mrid: Mrid,
    /// Lower operating limit in kV.
    pub low_voltage_limit: f64,
    /// Upper operating limit in kV.
    pub high_voltage_limit: f64,
}

/// Transmission line segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcLineSegment {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Container the line is modelled in.
    pub equipment_container_mrid: Mrid,
    /// Base voltage of the line.
    pub base_voltage_mrid: Mrid,
    /// Length in km.
    pub length: f64,
    /// Series resistance in ohm.
    pub r: f64,
    /// Series reactance in ohm.
    pub x: f64,
    /// Shunt susceptance in S.
    pub bch: f64,
    /// Shunt conductance in S.
    pub gch: f64,
}

/// Generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynchronousMachine {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Containing voltage level.
    pub equipment_container_mrid: Mrid,
    /// Rated apparent power in MVA.
    pub rated_s: f64,
}

/// Load following a conform load schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformLoad {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Containing voltage level.
    pub equipment_container_mrid: Mrid,
    /// Active power in MW.
    pub p: f64,
    /// Reactive power in MVAr.
    pub q: f64,
}

/// Junction point that equipment terminals attach to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityNode {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Voltage level (or other container) holding the node.
    pub connectivity_node_container_mrid: Mrid,
}

/// Join between one piece of conducting equipment and one connectivity node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Distinguishes the terminals of one piece of equipment, starting at 1.
    pub sequence_number: i32,
    /// Phases carried by the terminal.
    pub phases: String,
    /// Equipment the terminal belongs to.
    pub conducting_equipment_mrid: Mrid,
    /// Node the terminal attaches to.
    pub connectivity_node_mrid: Mrid,
    /// Bus name marker naming the terminal's bus.
    pub bus_name_marker_mrid: Mrid,
}

/// Breaker or disconnector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Base voltage of the switch.
    pub base_voltage_mrid: Mrid,
    /// Containing voltage level.
    pub equipment_container_mrid: Mrid,
    /// Whether the switch is open in normal operation.
    pub normal_open: bool,
    /// Whether the switch is retained in bus-branch reduction.
    pub retained: bool,
    /// Rated current in A.
    pub rated_current: f64,
}

/// Marker naming a bus for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusNameMarker {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Naming priority.
    pub priority: i32,
    /// Reporting group of the marker.
    pub reporting_group_mrid: Mrid,
}

/// Group collecting all records produced by one synthesis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportingGroup {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
}

/// Two-winding power transformer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerTransformer {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Base voltage of the primary side.
    pub base_voltage_mrid: Mrid,
    /// Containing substation.
    pub equipment_container_mrid: Mrid,
}

/// Winding connection kind of a transformer end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindingConnection {
    /// Delta.
    D,
    /// Wye.
    #[default]
    Y,
    /// Wye with grounded neutral.
    Yn,
}

/// One winding of a power transformer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerTransformerEnd {
    /// Identity columns.
    #[serde(flatten)]
    pub identity: IdentifiedObject,
    /// Winding number, matching its terminal's sequence number.
    pub end_number: i32,
    /// Terminal of the winding.
    pub terminal_mrid: Mrid,
    /// Base voltage of the winding.
    pub base_voltage_mrid: Mrid,
    /// Owning transformer.
    pub power_transformer_mrid: Mrid,
    /// Winding connection.
    pub connection_kind: WindingConnection,
    /// Rated apparent power in MVA.
    pub rated_s: f64,
    /// Rated voltage in kV.
    pub rated_u: f64,
    /// Resistance in ohm.
    pub r: f64,
    /// Reactance in ohm.
    pub x: f64,
    /// Magnetizing conductance in S.
    pub g: f64,
    /// Magnetizing susceptance in S.
    pub b: f64,
}

versioned_record! {
    Substation => Table::Substations,
    BaseVoltage => Table::BaseVoltages,
    VoltageLevel => Table::VoltageLevels,
    AcLineSegment => Table::AcLineSegments,
    SynchronousMachine => Table::SynchronousMachines,
    ConformLoad => Table::ConformLoads,
    ConnectivityNode => Table::ConnectivityNodes,
    Terminal => Table::Terminals,
    Switch => Table::Switches,
    BusNameMarker => Table::BusNameMarkers,
    ReportingGroup => Table::ReportingGroups,
    PowerTransformer => Table::PowerTransformers,
    PowerTransformerEnd => Table::PowerTransformerEnds,
}

/// Identity record registering one asset version in a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Asset identity.
    pub mrid: Mrid,
    /// Commit that registered this version.
    pub commit_id: CommitId,
    /// Grid model the asset belongs to.
    pub model_id: i32,
    /// CIM class of the asset.
    pub entity_type: String,
}

impl Entity {
    /// Identity record for an asset of the given table.
    pub fn new(mrid: Mrid, model_id: i32, table: Table) -> Self {
        Self {
            mrid,
            commit_id: CommitId::UNSET,
            model_id,
            entity_type: table.entity_type().to_string(),
        }
    }

    /// Identity record for a typed record, carrying its commit stamp.
    pub fn of<T: TableRecord>(record: &T, model_id: i32) -> Self {
        Self {
            commit_id: record.commit_id(),
            ..Self::new(record.mrid(), model_id, T::TABLE)
        }
    }
}

impl Versioned for Entity {
    fn mrid(&self) -> Mrid {
        self.mrid
    }

    fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    fn is_deleted(&self) -> bool {
        false
    }
}

impl TableRecord for Entity {
    const TABLE: Table = Table::Entities;

    fn set_commit_id(&mut self, commit_id: CommitId) {
        self.commit_id = commit_id;
    }
}

/// A group of versions created by one logical operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Generated id, `None` until inserted.
    pub id: Option<CommitId>,
    /// Commit message.
    pub message: String,
    /// Author of the change.
    pub author: String,
    /// Branch the commit belongs to.
    pub branch: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Commit {
    /// New commit on the main branch, stamped with the current time.
    pub fn new(message: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
            author: author.into(),
            branch: "main".to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_identity_is_flattened() {
        let terminal = Terminal {
            identity: IdentifiedObject::named(Mrid::new(Uuid::from_u128(7)), "T1", "T", "d"),
            sequence_number: 1,
            ..Default::default()
        };

        let value = serde_json::to_value(&terminal).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("mrid"));
        assert!(object.contains_key("commit_id"));
        assert!(object.contains_key("sequence_number"));
        assert!(!object.contains_key("identity"));

        let back: Terminal = serde_json::from_value(value).unwrap();
        assert_eq!(back, terminal);
    }

    #[test]
    fn test_set_commit_id() {
        let mut node = ConnectivityNode::default();
        node.set_commit_id(CommitId::new(42));
        assert_eq!(node.commit_id(), CommitId::new(42));
        assert_eq!(ConnectivityNode::TABLE, Table::ConnectivityNodes);
    }

    #[test]
    fn test_entity_of_record() {
        let switch = Switch {
            identity: IdentifiedObject::named(Mrid::new(Uuid::from_u128(3)), "S", "S", "S"),
            ..Default::default()
        };
        let entity = Entity::of(&switch, 4);
        assert_eq!(entity.mrid, switch.mrid());
        assert_eq!(entity.model_id, 4);
        assert_eq!(entity.entity_type, "Switch");
    }
}

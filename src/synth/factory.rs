//! Constructors for synthesized topology records.
//!
//! Names are derived from a label (context name plus running index) so that
//! every generated asset can be traced back to the run that produced it.

use crate::per_unit::PerUnit;
use crate::types::{
    BusNameMarker, ConnectivityNode, IdentifiedObject, Mrid, MridSource, PowerTransformer,
    PowerTransformerEnd, ReportingGroup, Switch, Terminal, VoltageLevel, WindingConnection,
};

/// Phases carried by synthesized terminals.
pub const THREE_PHASE: &str = "ABC";

/// Transformer end resistance as a fraction of the base impedance.
const WINDING_R_FACTOR: f64 = 0.002;
/// Transformer end reactance as a fraction of the base impedance.
const WINDING_X_FACTOR: f64 = 0.1;
/// Transformer end susceptance times the base impedance.
const WINDING_B_FACTOR: f64 = 0.005;

/// Reporting group for one synthesis run.
pub fn reporting_group(
    ids: &mut dyn MridSource,
    name: impl Into<String>,
    short_name: impl Into<String>,
    description: impl Into<String>,
) -> ReportingGroup {
    ReportingGroup {
        identity: IdentifiedObject::named(ids.next_mrid(), name, short_name, description),
    }
}

/// Connectivity node held by `container`.
pub fn connectivity_node(
    ids: &mut dyn MridSource,
    label: &str,
    container: Mrid,
) -> ConnectivityNode {
    ConnectivityNode {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            format!("Connectivity Node {label}"),
            format!("CN {label}"),
            format!("Connectivity node for {label}"),
        ),
        connectivity_node_container_mrid: container,
    }
}

/// Bus name marker in `reporting_group`.
pub fn bus_name_marker(
    ids: &mut dyn MridSource,
    label: &str,
    reporting_group: Mrid,
) -> BusNameMarker {
    BusNameMarker {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            format!("Bus Name Marker for {label}"),
            format!("BNM {label}"),
            format!("Bus Name Marker for {label}"),
        ),
        priority: 0,
        reporting_group_mrid: reporting_group,
    }
}

/// Terminal joining `equipment` to `node`, named after its marker.
pub fn terminal(
    ids: &mut dyn MridSource,
    node: Mrid,
    equipment: Mrid,
    marker: &BusNameMarker,
    sequence_number: i32,
) -> Terminal {
    let marker_name = &marker.identity.name;
    Terminal {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            format!("Terminal {marker_name}"),
            format!("T {marker_name}"),
            format!("Terminal for {marker_name}"),
        ),
        sequence_number,
        phases: THREE_PHASE.to_string(),
        conducting_equipment_mrid: equipment,
        connectivity_node_mrid: node,
        bus_name_marker_mrid: marker.identity.mrid,
    }
}

/// A terminal together with the bus name marker it references.
#[derive(Debug, Clone)]
pub struct MarkedTerminal {
    /// Marker naming the terminal's bus.
    pub marker: BusNameMarker,
    /// The terminal.
    pub terminal: Terminal,
}

/// Create a bus name marker and a terminal referencing it.
pub fn marked_terminal(
    ids: &mut dyn MridSource,
    label: &str,
    reporting_group: Mrid,
    node: Mrid,
    equipment: Mrid,
    sequence_number: i32,
) -> MarkedTerminal {
    let marker = bus_name_marker(ids, label, reporting_group);
    let terminal = terminal(ids, node, equipment, &marker, sequence_number);
    MarkedTerminal { marker, terminal }
}

/// Closed switch inside `voltage_level`.
pub fn switch(ids: &mut dyn MridSource, label: &str, voltage_level: &VoltageLevel) -> Switch {
    Switch {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            format!("Switch {label}"),
            format!("Sw {label}"),
            format!("Switch {label}"),
        ),
        base_voltage_mrid: voltage_level.base_voltage_mrid,
        equipment_container_mrid: voltage_level.identity.mrid,
        normal_open: false,
        retained: false,
        rated_current: 0.0,
    }
}

/// Two-winding transformer in `substation`.
pub fn transformer(
    ids: &mut dyn MridSource,
    label: &str,
    substation: Mrid,
    base_voltage: Mrid,
) -> PowerTransformer {
    PowerTransformer {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            format!("Transformer {label}"),
            format!("Trns {label}"),
            format!("Transformer {label}"),
        ),
        base_voltage_mrid: base_voltage,
        equipment_container_mrid: substation,
    }
}

/// Inputs for one transformer winding.
#[derive(Debug, Clone, Copy)]
pub struct WindingParams<'a> {
    /// Label used in the winding's names.
    pub label: &'a str,
    /// Winding number, equal to its terminal's sequence number.
    pub end_number: i32,
    /// Terminal of the winding.
    pub terminal_mrid: Mrid,
    /// Base voltage of the winding side.
    pub base_voltage_mrid: Mrid,
    /// Owning transformer.
    pub power_transformer_mrid: Mrid,
    /// Winding connection.
    pub connection_kind: WindingConnection,
    /// Rated voltage in kV.
    pub rated_u: f64,
}

/// Transformer end with impedances derived from the rated voltage.
///
/// Rated power is the per-unit base power. With `Zbase = U² / Sbase`:
/// `R = 0.002·Zbase`, `X = 0.1·Zbase`, `G = 0` and `B = 0.005 / Zbase`.
pub fn transformer_end(
    ids: &mut dyn MridSource,
    params: &WindingParams<'_>,
    per_unit: &PerUnit,
) -> PowerTransformerEnd {
    let name = format!("Winding {}", params.label);
    let zbase = per_unit.zbase(params.rated_u);

    PowerTransformerEnd {
        identity: IdentifiedObject::named(
            ids.next_mrid(),
            name.clone(),
            format!("Wnd {}", params.label),
            name,
        ),
        end_number: params.end_number,
        terminal_mrid: params.terminal_mrid,
        base_voltage_mrid: params.base_voltage_mrid,
        power_transformer_mrid: params.power_transformer_mrid,
        connection_kind: params.connection_kind,
        rated_s: per_unit.sbase,
        rated_u: params.rated_u,
        r: WINDING_R_FACTOR * zbase,
        x: WINDING_X_FACTOR * zbase,
        g: 0.0,
        b: WINDING_B_FACTOR / zbase,
    }
}

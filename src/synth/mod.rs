//! Topology synthesis.
//!
//! Two synthesizers produce new connectivity without re-creating links that
//! already exist:
//!
//! - [`VoltageLevelSynthesizer`]: one node per equipment plus a switching
//!   layer inside one voltage level
//! - [`SubstationSynthesizer`]: switch and transformer links between the
//!   voltage levels of one substation
//!
//! Both consult a caller-owned [`ConnectivityGraph`](crate::graph::ConnectivityGraph)
//! and feed the terminals they create back into it. Their output is an
//! [`Aggregate`] ready for the [`AtomicWriter`](crate::writer::AtomicWriter).

pub mod factory;
pub mod substation;
pub mod voltage_level;

use crate::types::{
    BusNameMarker, CommitId, ConnectivityNode, Entity, PowerTransformer, PowerTransformerEnd,
    RecordBatch, ReportingGroup, Switch, TableRecord, Terminal,
};
use crate::writer::Aggregate;

pub use factory::{MarkedTerminal, WindingParams};
pub use substation::{
    ConnectableVoltageLevel, SubstationData, SubstationModel, SubstationSynthesizer,
};
pub use voltage_level::{VoltageLevelEquipment, VoltageLevelModel, VoltageLevelSynthesizer};

/// New topology records produced by one synthesis run.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Group collecting everything created in the run.
    pub reporting_group: ReportingGroup,
    /// One marker per created terminal.
    pub bus_name_markers: Vec<BusNameMarker>,
    /// Created connectivity nodes.
    pub connectivity_nodes: Vec<ConnectivityNode>,
    /// Created switches.
    pub switches: Vec<Switch>,
    /// Created transformers.
    pub power_transformers: Vec<PowerTransformer>,
    /// Created terminals.
    pub terminals: Vec<Terminal>,
    /// Created transformer windings.
    pub power_transformer_ends: Vec<PowerTransformerEnd>,
}

impl Topology {
    /// Topology collected under `reporting_group`.
    pub fn new(reporting_group: ReportingGroup) -> Self {
        Self {
            reporting_group,
            ..Default::default()
        }
    }

    /// Record a terminal and its marker.
    pub fn push_terminal(&mut self, marked: MarkedTerminal) {
        self.bus_name_markers.push(marked.marker);
        self.terminals.push(marked.terminal);
    }

    /// Number of records, reporting group included.
    pub fn record_count(&self) -> usize {
        1 + self.bus_name_markers.len()
            + self.connectivity_nodes.len()
            + self.switches.len()
            + self.power_transformers.len()
            + self.terminals.len()
            + self.power_transformer_ends.len()
    }
}

fn stamp<T: TableRecord>(records: &mut [T], commit_id: CommitId) {
    for record in records {
        record.set_commit_id(commit_id);
    }
}

fn identities_of<T: TableRecord>(records: &[T], model_id: i32, out: &mut Vec<Entity>) {
    out.extend(records.iter().map(|record| Entity::of(record, model_id)));
}

fn push_batch<T: TableRecord>(
    records: &[T],
    out: &mut Vec<RecordBatch>,
) -> Result<(), serde_json::Error> {
    if !records.is_empty() {
        out.push(RecordBatch::from_records(records)?);
    }
    Ok(())
}

impl Aggregate for Topology {
    fn assign_commit_id(&mut self, commit_id: CommitId) {
        self.reporting_group.set_commit_id(commit_id);
        stamp(&mut self.bus_name_markers, commit_id);
        stamp(&mut self.connectivity_nodes, commit_id);
        stamp(&mut self.switches, commit_id);
        stamp(&mut self.power_transformers, commit_id);
        stamp(&mut self.terminals, commit_id);
        stamp(&mut self.power_transformer_ends, commit_id);
    }

    fn identities(&self, model_id: i32) -> Vec<Entity> {
        let mut out = Vec::with_capacity(self.record_count());
        out.push(Entity::of(&self.reporting_group, model_id));
        identities_of(&self.bus_name_markers, model_id, &mut out);
        identities_of(&self.connectivity_nodes, model_id, &mut out);
        identities_of(&self.switches, model_id, &mut out);
        identities_of(&self.power_transformers, model_id, &mut out);
        identities_of(&self.terminals, model_id, &mut out);
        identities_of(&self.power_transformer_ends, model_id, &mut out);
        out
    }

    /// Reporting group, markers, nodes, switches, transformers, terminals,
    /// then windings. Empty batches are skipped.
    fn batches(&self) -> Result<Vec<RecordBatch>, serde_json::Error> {
        let mut out = Vec::with_capacity(7);
        push_batch(std::slice::from_ref(&self.reporting_group), &mut out)?;
        push_batch(&self.bus_name_markers, &mut out)?;
        push_batch(&self.connectivity_nodes, &mut out)?;
        push_batch(&self.switches, &mut out)?;
        push_batch(&self.power_transformers, &mut out)?;
        push_batch(&self.terminals, &mut out)?;
        push_batch(&self.power_transformer_ends, &mut out)?;
        Ok(out)
    }
}

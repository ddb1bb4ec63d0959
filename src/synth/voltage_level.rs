//! Switching layer inside one voltage level.
//!
//! ## Layout
//!
//! Every equipment (lines, then generators, then loads) gets its own
//! connectivity node and terminal. Each line additionally gets a tap node,
//! switched onto the line's own node and onto the node of every equipment
//! after it:
//!
//! ```text
//!           ┌── Sw ── CN(line 0)
//! tap(0) ───┼── Sw ── CN(line 1)
//!           └── Sw ── CN(gen 0)
//! ```
//!
//! With `L` lines, `G` generators and `C` loads this yields `2L + G + C`
//! nodes and `L·(L+1)/2 + L·(G+C)` switches. Generators and loads are never
//! switched to each other.

use std::collections::HashMap;

use tracing::{debug, info};

use super::factory::{self, marked_terminal};
use super::Topology;
use crate::graph::{ConnectivityGraph, DEFAULT_HOP_BOUND};
use crate::types::{
    AcLineSegment, CommitId, ConformLoad, Entity, Mrid, MridSource, RecordBatch,
    SynchronousMachine, Versioned, VoltageLevel,
};
use crate::writer::Aggregate;

/// Equipment of one voltage level.
#[derive(Debug, Clone, Default)]
pub struct VoltageLevelEquipment {
    /// The voltage level.
    pub voltage_level: VoltageLevel,
    /// Line segments ending in the voltage level.
    pub lines: Vec<AcLineSegment>,
    /// Generators in the voltage level.
    pub generators: Vec<SynchronousMachine>,
    /// Loads in the voltage level.
    pub loads: Vec<ConformLoad>,
    /// Sequence number to use for an equipment's new terminal.
    ///
    /// Set for lines whose other end already owns a terminal, so that the
    /// two ends do not both use sequence number 1.
    pub terminal_sequence_overrides: HashMap<Mrid, i32>,
}

impl VoltageLevelEquipment {
    /// Equipment of `voltage_level`, initially empty.
    pub fn new(voltage_level: VoltageLevel) -> Self {
        Self {
            voltage_level,
            ..Default::default()
        }
    }

    /// Set the line segments.
    pub fn with_lines(mut self, lines: Vec<AcLineSegment>) -> Self {
        self.lines = lines;
        self
    }

    /// Set the generators.
    pub fn with_generators(mut self, generators: Vec<SynchronousMachine>) -> Self {
        self.generators = generators;
        self
    }

    /// Set the loads.
    pub fn with_loads(mut self, loads: Vec<ConformLoad>) -> Self {
        self.loads = loads;
        self
    }

    /// Set the terminal sequence number overrides.
    pub fn with_sequence_overrides(mut self, overrides: HashMap<Mrid, i32>) -> Self {
        self.terminal_sequence_overrides = overrides;
        self
    }

    /// Equipment mrids in layout order: lines, generators, loads.
    pub fn equipment_mrids(&self) -> Vec<Mrid> {
        self.lines
            .iter()
            .map(Versioned::mrid)
            .chain(self.generators.iter().map(Versioned::mrid))
            .chain(self.loads.iter().map(Versioned::mrid))
            .collect()
    }
}

/// Records created for one voltage level.
#[derive(Debug, Clone, Default)]
pub struct VoltageLevelModel {
    /// Created topology.
    pub topology: Topology,
    /// Equipment pairs skipped because they were already connected.
    pub already_connected: usize,
}

impl Aggregate for VoltageLevelModel {
    fn assign_commit_id(&mut self, commit_id: CommitId) {
        self.topology.assign_commit_id(commit_id);
    }

    fn identities(&self, model_id: i32) -> Vec<Entity> {
        self.topology.identities(model_id)
    }

    fn batches(&self) -> Result<Vec<RecordBatch>, serde_json::Error> {
        self.topology.batches()
    }
}

/// Builds the switching layer of a voltage level.
#[derive(Debug, Clone, Copy)]
pub struct VoltageLevelSynthesizer {
    hop_bound: usize,
}

impl Default for VoltageLevelSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_HOP_BOUND)
    }
}

impl VoltageLevelSynthesizer {
    /// Synthesizer treating equipment closer than `hop_bound` edges as connected.
    pub fn new(hop_bound: usize) -> Self {
        Self { hop_bound }
    }

    /// Hop bound used for the "already connected" test.
    pub fn hop_bound(&self) -> usize {
        self.hop_bound
    }

    /// Synthesize the switching layer of `equipment`.
    ///
    /// Equipment pairs already connected in `graph` are skipped. Created
    /// terminals enter `graph` as soon as their switch exists, so a pair
    /// reached through switches placed earlier in the same run counts as
    /// connected once the hop bound exceeds the six-edge tap path.
    pub fn synthesize(
        &self,
        equipment: &VoltageLevelEquipment,
        graph: &mut ConnectivityGraph,
        ids: &mut dyn MridSource,
    ) -> VoltageLevelModel {
        let voltage_level = &equipment.voltage_level;
        let vl_mrid = voltage_level.identity.mrid;
        let name = voltage_level.identity.name.as_str();

        let group = factory::reporting_group(
            ids,
            format!("Reporting group {name}"),
            format!("RG {name}"),
            format!("Reporting group for voltage level {name}"),
        );
        let group_mrid = group.identity.mrid;
        let mut topology = Topology::new(group);

        let mut index = 0usize;
        let mut next_label = || {
            let label = format!("{name} {index}");
            index += 1;
            label
        };

        let members = equipment.equipment_mrids();
        let line_count = equipment.lines.len();

        // One node and terminal per equipment
        let mut nodes = Vec::with_capacity(members.len());
        for (k, &mrid) in members.iter().enumerate() {
            let label = next_label();
            let node = factory::connectivity_node(ids, &label, vl_mrid);
            let seq = self.sequence_number(equipment, graph, mrid, k < line_count);
            let node_mrid = node.identity.mrid;
            topology.push_terminal(marked_terminal(ids, &label, group_mrid, node_mrid, mrid, seq));
            nodes.push(node_mrid);
            topology.connectivity_nodes.push(node);
        }
        graph.add_terminals(&topology.terminals);

        let mut already_connected = 0;
        for i in 0..line_count {
            let label = next_label();
            let tap = factory::connectivity_node(ids, &label, vl_mrid);
            let tap_mrid = tap.identity.mrid;
            topology.connectivity_nodes.push(tap);

            for j in i..members.len() {
                if i != j && graph.is_connected(members[i], members[j], self.hop_bound) {
                    already_connected += 1;
                    continue;
                }

                let label = next_label();
                let sw = factory::switch(ids, &label, voltage_level);
                let sw_mrid = sw.identity.mrid;
                topology.switches.push(sw);
                for (node, seq) in [(tap_mrid, 1), (nodes[j], 2)] {
                    let marked = marked_terminal(ids, &label, group_mrid, node, sw_mrid, seq);
                    topology.push_terminal(marked);
                }
                graph.add_terminals(&topology.terminals[topology.terminals.len() - 2..]);
                debug!(line = %members[i], target = %members[j], "Switched line tap");
            }
        }

        info!(
            voltage_level = %vl_mrid,
            lines = line_count,
            generators = equipment.generators.len(),
            loads = equipment.loads.len(),
            nodes = topology.connectivity_nodes.len(),
            switches = topology.switches.len(),
            already_connected,
            "Synthesized voltage level"
        );

        VoltageLevelModel {
            topology,
            already_connected,
        }
    }

    /// Override, else the opposite end of a line's existing terminal, else 1.
    fn sequence_number(
        &self,
        equipment: &VoltageLevelEquipment,
        graph: &ConnectivityGraph,
        mrid: Mrid,
        is_line: bool,
    ) -> i32 {
        if let Some(seq) = equipment.terminal_sequence_overrides.get(&mrid) {
            return *seq;
        }
        if is_line {
            if let Some(existing) = graph.terminal_of(mrid) {
                return existing.sequence_number % 2 + 1;
            }
        }
        1
    }
}

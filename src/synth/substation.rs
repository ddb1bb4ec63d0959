//! Links between the voltage levels of one substation.
//!
//! Every connectivity node of one voltage level is linked to every
//! connectivity node of every other voltage level, unless the two are already
//! connected:
//!
//! ```text
//! CN1 ── Switch ── CN ── Transformer ── CN2        (4 edges)
//! ```
//!
//! The four new terminals are added to the graph right after each link, so a
//! later pair in the same run sees every link made before it.

use tracing::{debug, info};

use super::factory::{self, marked_terminal, WindingParams};
use super::Topology;
use crate::graph::{ConnectivityGraph, DEFAULT_HOP_BOUND};
use crate::per_unit::PerUnit;
use crate::types::{
    BaseVoltage, CommitId, ConnectivityNode, Entity, Mrid, MridSource, RecordBatch, Substation,
    Terminal, VoltageLevel, WindingConnection,
};
use crate::writer::Aggregate;

/// A voltage level with its nodes and base voltage.
#[derive(Debug, Clone, Default)]
pub struct ConnectableVoltageLevel {
    /// The voltage level.
    pub voltage_level: VoltageLevel,
    /// Its active connectivity nodes.
    pub connectivity_nodes: Vec<ConnectivityNode>,
    /// Its base voltage.
    pub base_voltage: BaseVoltage,
}

impl ConnectableVoltageLevel {
    /// Panic unless the voltage level references the supplied base voltage.
    ///
    /// A mismatch means the caller assembled the input wrongly; transformer
    /// ratings derived from it would be meaningless.
    pub fn require_consistent_voltage(&self) {
        if self.base_voltage.identity.mrid != self.voltage_level.base_voltage_mrid {
            panic!(
                "Inconsistent base voltage mrid: {} (base voltage) and {} (voltage level)",
                self.base_voltage.identity.mrid, self.voltage_level.base_voltage_mrid
            );
        }
    }

    fn nominal_voltage(&self) -> f64 {
        self.base_voltage.nominal_voltage
    }
}

/// A substation and its connectable voltage levels.
#[derive(Debug, Clone, Default)]
pub struct SubstationData {
    /// The substation.
    pub substation: Substation,
    /// Its voltage levels.
    pub voltage_levels: Vec<ConnectableVoltageLevel>,
}

/// Records created to link the voltage levels of a substation.
#[derive(Debug, Clone, Default)]
pub struct SubstationModel {
    /// Created topology.
    pub topology: Topology,
    /// Node pairs skipped because they were already connected.
    pub already_connected: usize,
}

impl Aggregate for SubstationModel {
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

/// Links voltage levels through switches and two-winding transformers.
#[derive(Debug, Clone, Copy)]
pub struct SubstationSynthesizer {
    hop_bound: usize,
    per_unit: PerUnit,
}

impl Default for SubstationSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_HOP_BOUND, PerUnit::default())
    }
}

impl SubstationSynthesizer {
    /// Synthesizer with a hop bound and a per-unit base for transformer ratings.
    pub fn new(hop_bound: usize, per_unit: PerUnit) -> Self {
        Self { hop_bound, per_unit }
    }

    /// Link every node pair across voltage levels that is not yet connected.
    ///
    /// # Panics
    ///
    /// If a voltage level's base voltage reference does not match its
    /// supplied base voltage.
    pub fn synthesize(
        &self,
        data: &SubstationData,
        graph: &mut ConnectivityGraph,
        ids: &mut dyn MridSource,
    ) -> SubstationModel {
        for level in &data.voltage_levels {
            level.require_consistent_voltage();
        }

        let substation = &data.substation.identity;
        let group = factory::reporting_group(
            ids,
            format!("{} voltage level connections", substation.name),
            format!("{} vlc", substation.name),
            "Group representing all items created to connect voltage levels",
        );
        let mut topology = Topology::new(group);
        let mut already_connected = 0;

        let levels = &data.voltage_levels;
        for (i, vl1) in levels.iter().enumerate() {
            for vl2 in &levels[i + 1..] {
                for (ii, cn1) in vl1.connectivity_nodes.iter().enumerate() {
                    for (jj, cn2) in vl2.connectivity_nodes.iter().enumerate() {
                        let (n1, n2) = (cn1.identity.mrid, cn2.identity.mrid);
                        if graph.is_connected(n1, n2, self.hop_bound) {
                            already_connected += 1;
                            continue;
                        }

                        let label = format!(
                            "{:.0} kV to {:.0} kV (CN {ii}-{jj})",
                            vl1.nominal_voltage(),
                            vl2.nominal_voltage()
                        );
                        let created = self.link(
                            &mut topology,
                            ids,
                            &label,
                            substation.mrid,
                            vl1,
                            vl2,
                            cn1,
                            cn2,
                        );
                        graph.add_terminals(created);
                        debug!(from = %n1, to = %n2, "Linked voltage levels");
                    }
                }
            }
        }

        info!(
            substation = %substation.mrid,
            voltage_levels = levels.len(),
            switches = topology.switches.len(),
            transformers = topology.power_transformers.len(),
            already_connected,
            "Synthesized substation links"
        );

        SubstationModel {
            topology,
            already_connected,
        }
    }

    /// Create one switch, node, transformer and its two windings.
    ///
    /// Returns the four terminals created for the link.
    #[allow(clippy::too_many_arguments)]
    fn link<'t>(
        &self,
        topology: &'t mut Topology,
        ids: &mut dyn MridSource,
        label: &str,
        substation: Mrid,
        vl1: &ConnectableVoltageLevel,
        vl2: &ConnectableVoltageLevel,
        cn1: &ConnectivityNode,
        cn2: &ConnectivityNode,
    ) -> &'t [Terminal] {
        let group = topology.reporting_group.identity.mrid;
        let base_voltage = vl1.voltage_level.base_voltage_mrid;
        let transformer = factory::transformer(ids, label, substation, base_voltage);
        let breaker = factory::switch(ids, label, &vl1.voltage_level);
        let switch_node = factory::connectivity_node(ids, label, vl1.voltage_level.identity.mrid);

        let (tr_mrid, sw_mrid, node_mrid) =
            (transformer.identity.mrid, breaker.identity.mrid, switch_node.identity.mrid);

        let switch_t1 = marked_terminal(ids, label, group, node_mrid, sw_mrid, 1);
        let switch_t2 = marked_terminal(ids, label, group, cn1.identity.mrid, sw_mrid, 2);
        let winding_t1 = marked_terminal(ids, label, group, node_mrid, tr_mrid, 1);
        let winding_t2 = marked_terminal(ids, label, group, cn2.identity.mrid, tr_mrid, 2);

        let end1 = factory::transformer_end(
            ids,
            &WindingParams {
                label,
                end_number: winding_t1.terminal.sequence_number,
                terminal_mrid: winding_t1.terminal.identity.mrid,
                base_voltage_mrid: vl1.voltage_level.base_voltage_mrid,
                power_transformer_mrid: tr_mrid,
                connection_kind: WindingConnection::Y,
                rated_u: vl1.nominal_voltage(),
            },
            &self.per_unit,
        );
        let end2 = factory::transformer_end(
            ids,
            &WindingParams {
                label,
                end_number: winding_t2.terminal.sequence_number,
                terminal_mrid: winding_t2.terminal.identity.mrid,
                base_voltage_mrid: vl2.voltage_level.base_voltage_mrid,
                power_transformer_mrid: tr_mrid,
                connection_kind: WindingConnection::Yn,
                rated_u: vl2.nominal_voltage(),
            },
            &self.per_unit,
        );

        topology.connectivity_nodes.push(switch_node);
        topology.switches.push(breaker);
        topology.power_transformers.push(transformer);
        topology.power_transformer_ends.extend([end1, end2]);

        let first = topology.terminals.len();
        for marked in [switch_t1, switch_t2, winding_t1, winding_t2] {
            topology.push_terminal(marked);
        }
        &topology.terminals[first..]
    }
}

//! Connectivity graph over equipment and connectivity nodes.
//!
//! Every terminal becomes one undirected, unit-weight edge between its
//! equipment and its connectivity node. Two points are "already connected"
//! when the shortest path between them is shorter than a hop bound.
//!
//! ```text
//! E1 ── CN ── Switch ── CN ── E2        (4 edges)
//! ```
//!
//! The graph is owned by one synthesis call and passed around by `&mut`;
//! it is never shared between calls.

use std::collections::HashMap;

use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::types::{Mrid, Terminal};

/// Hop bound of a node–switch–node–transformer–node path (four edges).
pub const DEFAULT_HOP_BOUND: usize = 5;

/// Undirected graph of equipment and connectivity nodes.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    terminals: Vec<Terminal>,
    index: HashMap<Mrid, NodeIndex>,
    graph: UnGraph<Mrid, ()>,
}

impl ConnectivityGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from terminal records.
    pub fn build(terminals: &[Terminal]) -> Self {
        let mut graph = Self::new();
        graph.add_terminals(terminals);
        graph
    }

    /// Extend the graph with newly created terminals.
    ///
    /// Synthesizers call this right after creating terminals so that later
    /// queries in the same run see them.
    pub fn add_terminals(&mut self, terminals: &[Terminal]) {
        for terminal in terminals {
            let node = self.node_for(terminal.connectivity_node_mrid);
            let equipment = self.node_for(terminal.conducting_equipment_mrid);
            self.graph.add_edge(node, equipment, ());
        }
        self.terminals.extend_from_slice(terminals);
    }

    fn node_for(&mut self, mrid: Mrid) -> NodeIndex {
        if let Some(index) = self.index.get(&mrid) {
            return *index;
        }
        let index = self.graph.add_node(mrid);
        self.index.insert(mrid, index);
        index
    }

    /// Shortest-path edge count between `a` and `b`.
    ///
    /// `None` when either id is unknown or no path exists.
    pub fn distance(&self, a: Mrid, b: Mrid) -> Option<usize> {
        let start = *self.index.get(&a)?;
        let goal = *self.index.get(&b)?;
        let distances = dijkstra(&self.graph, start, Some(goal), |_| 1usize);
        distances.get(&goal).copied()
    }

    /// Whether `a` and `b` are connected by a path of fewer than `max_hops` edges.
    ///
    /// Unknown ids are never connected.
    pub fn is_connected(&self, a: Mrid, b: Mrid, max_hops: usize) -> bool {
        self.distance(a, b).map(|d| d < max_hops).unwrap_or(false)
    }

    /// First terminal attached to the given equipment.
    pub fn terminal_of(&self, equipment: Mrid) -> Option<&Terminal> {
        self.terminals
            .iter()
            .find(|t| t.conducting_equipment_mrid == equipment)
    }

    /// Whether the id is a node of the graph.
    pub fn contains(&self, mrid: Mrid) -> bool {
        self.index.contains_key(&mrid)
    }

    /// All terminals the graph was built from, in insertion order.
    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    /// Number of nodes (equipment plus connectivity nodes).
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges (one per terminal).
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentifiedObject;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn id(n: u128) -> Mrid {
        Mrid::new(Uuid::from_u128(n))
    }

    fn terminal(mrid: u128, equipment: u128, node: u128, seq: i32) -> Terminal {
        Terminal {
            identity: IdentifiedObject::named(id(mrid), "T", "T", ""),
            sequence_number: seq,
            conducting_equipment_mrid: id(equipment),
            connectivity_node_mrid: id(node),
            ..Default::default()
        }
    }

    /// E1 ── CN10 ── S2 ── CN11 ── E3
    fn switched_pair() -> ConnectivityGraph {
        ConnectivityGraph::build(&[
            terminal(100, 1, 10, 1),
            terminal(101, 2, 10, 1),
            terminal(102, 2, 11, 2),
            terminal(103, 3, 11, 1),
        ])
    }

    #[test]
    fn test_build_counts() {
        let graph = switched_pair();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.contains(id(10)));
        assert!(!graph.contains(id(99)));
    }

    #[test]
    fn test_unknown_ids_are_not_connected() {
        let graph = switched_pair();
        assert!(!graph.is_connected(id(98), id(99), 100));
        assert!(!graph.is_connected(id(1), id(99), 100));
        assert!(!graph.is_connected(id(99), id(1), 100));
    }

    #[test]
    fn test_hop_bound_is_strict() {
        let graph = switched_pair();
        assert_eq!(graph.distance(id(1), id(3)), Some(4));
        assert!(graph.is_connected(id(1), id(3), 5));
        assert!(!graph.is_connected(id(1), id(3), 4));
    }

    #[test]
    fn test_disconnected_components() {
        let mut graph = switched_pair();
        graph.add_terminals(&[terminal(200, 50, 60, 1)]);
        assert_eq!(graph.distance(id(1), id(50)), None);
        assert!(!graph.is_connected(id(1), id(50), usize::MAX));
    }

    #[test]
    fn test_add_terminals_is_incremental() {
        let mut graph = switched_pair();
        assert!(!graph.is_connected(id(1), id(4), 10));

        graph.add_terminals(&[terminal(104, 4, 11, 1)]);
        assert_eq!(graph.distance(id(1), id(4)), Some(4));
        assert_eq!(graph.edge_count(), 5);
    }

    #[test]
    fn test_terminal_of_returns_first_match() {
        let graph = switched_pair();
        let t = graph.terminal_of(id(2)).unwrap();
        assert_eq!(t.sequence_number, 1);
        assert_eq!(t.connectivity_node_mrid, id(10));
        assert!(graph.terminal_of(id(42)).is_none());
    }

    proptest! {
        /// On a chain E0 ── N0 ── E1 ── N1 ── ... the distance is the index gap.
        #[test]
        fn prop_chain_distance(len in 2u128..20, a in 0u128..20, b in 0u128..20) {
            let a = a % len;
            let b = b % len;
            let mut terminals = Vec::new();
            for i in 0..len {
                terminals.push(terminal(1000 + 2 * i, i, 500 + i, 1));
                if i + 1 < len {
                    terminals.push(terminal(1001 + 2 * i, i + 1, 500 + i, 2));
                }
            }
            let graph = ConnectivityGraph::build(&terminals);
            let expected = 2 * (a.max(b) - a.min(b)) as usize;

            prop_assert_eq!(graph.distance(id(a), id(b)), Some(expected));
            prop_assert!(graph.is_connected(id(a), id(b), expected + 1));
            prop_assert!(!graph.is_connected(id(a), id(b), expected));
        }
    }
}

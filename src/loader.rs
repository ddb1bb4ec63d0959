//! Loading synthesis inputs from an [`AssetStore`].
//!
//! Every loader resolves the active, latest version of each asset before
//! handing it to a synthesizer.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::graph::ConnectivityGraph;
use crate::store::{fetch, AssetStore, Predicate, StoreError};
use crate::synth::{ConnectableVoltageLevel, SubstationData, VoltageLevelEquipment};
use crate::types::{
    AcLineSegment, BaseVoltage, ConformLoad, ConnectivityNode, Mrid, Substation,
    SynchronousMachine, Table, TableRecord, Terminal, Versioned, VoltageLevel,
};
use crate::versioned::active_latest;

/// Error type for loading synthesis inputs.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// No active version of the asset exists.
    #[error("No active {table} with mrid {mrid}")]
    NotFound {
        /// Table that was searched.
        table: Table,
        /// Requested asset.
        mrid: Mrid,
    },
    /// A voltage level references a base voltage that is not active.
    #[error("Voltage level {voltage_level} references missing base voltage {base_voltage}")]
    MissingBaseVoltage {
        /// Referencing voltage level.
        voltage_level: Mrid,
        /// Missing base voltage.
        base_voltage: Mrid,
    },
    /// Lines that already own more than one active terminal.
    #[error("The lines {} have already multiple terminals", join(.0))]
    MultipleTerminals(Vec<Mrid>),
}

fn join(mrids: &[Mrid]) -> String {
    mrids.iter().map(Mrid::to_string).collect::<Vec<_>>().join(", ")
}

/// Active, latest versions of `T` matching `predicate`.
///
/// The predicate is applied to the resolved latest version, not to the
/// history: an asset whose older version matches but whose latest version
/// was moved elsewhere is not returned.
pub async fn load_active<T, S>(store: &S, predicate: &Predicate) -> Result<Vec<T>, StoreError>
where
    T: TableRecord,
    S: AssetStore + ?Sized,
{
    let matched = fetch::<T, S>(store, predicate).await?;
    if *predicate == Predicate::All {
        return Ok(active_latest(matched));
    }

    let mrids: BTreeSet<Mrid> = matched.iter().map(Versioned::mrid).collect();
    if mrids.is_empty() {
        return Ok(Vec::new());
    }
    let history = fetch::<T, S>(store, &Predicate::mrid_in(mrids)).await?;

    let mut current = Vec::new();
    for record in active_latest(history) {
        if predicate.matches(&serde_json::to_value(&record)?) {
            current.push(record);
        }
    }
    Ok(current)
}

async fn load_one<T, S>(store: &S, mrid: Mrid) -> Result<T, LoadError>
where
    T: TableRecord,
    S: AssetStore + ?Sized,
{
    load_active::<T, S>(store, &Predicate::mrid_in([mrid]))
        .await?
        .into_iter()
        .next()
        .ok_or(LoadError::NotFound { table: T::TABLE, mrid })
}

/// Active terminals of the given equipment.
pub async fn load_terminals<S>(store: &S, equipment: &[Mrid]) -> Result<Vec<Terminal>, StoreError>
where
    S: AssetStore + ?Sized,
{
    load_active(
        store,
        &Predicate::column_in("conducting_equipment_mrid", equipment.iter().copied()),
    )
    .await
}

/// Sequence number each line's next terminal must use.
///
/// A line owning one terminal gets the other end (`seq % 2 + 1`). Lines
/// without terminals are absent from the map. Lines that already own more
/// than one terminal are reported as an error.
pub async fn target_terminal_sequence_numbers<S>(
    store: &S,
    lines: &[Mrid],
) -> Result<HashMap<Mrid, i32>, LoadError>
where
    S: AssetStore + ?Sized,
{
    let terminals = load_terminals(store, lines).await?;

    let mut targets = HashMap::new();
    let mut multiple = BTreeSet::new();
    for terminal in &terminals {
        let line = terminal.conducting_equipment_mrid;
        if targets.insert(line, terminal.sequence_number % 2 + 1).is_some() {
            multiple.insert(line);
        }
    }

    if !multiple.is_empty() {
        return Err(LoadError::MultipleTerminals(multiple.into_iter().collect()));
    }
    Ok(targets)
}

/// Lines, generators and loads contained in a voltage level.
pub async fn load_voltage_level_equipment<S>(
    store: &S,
    voltage_level: Mrid,
) -> Result<VoltageLevelEquipment, LoadError>
where
    S: AssetStore + ?Sized,
{
    let level: VoltageLevel = load_one(store, voltage_level).await?;
    let contained = Predicate::column_in("equipment_container_mrid", [voltage_level]);

    let lines: Vec<AcLineSegment> = load_active(store, &contained).await?;
    let generators: Vec<SynchronousMachine> = load_active(store, &contained).await?;
    let loads: Vec<ConformLoad> = load_active(store, &contained).await?;

    let line_mrids: Vec<Mrid> = lines.iter().map(Versioned::mrid).collect();
    let overrides = target_terminal_sequence_numbers(store, &line_mrids).await?;

    debug!(
        voltage_level = %voltage_level,
        lines = lines.len(),
        generators = generators.len(),
        loads = loads.len(),
        "Loaded voltage level equipment"
    );

    Ok(VoltageLevelEquipment::new(level)
        .with_lines(lines)
        .with_generators(generators)
        .with_loads(loads)
        .with_sequence_overrides(overrides))
}

/// Voltage levels of a substation with their nodes and base voltages.
///
/// Voltage levels are ordered by mrid.
pub async fn load_substation_data<S>(
    store: &S,
    substation: Mrid,
) -> Result<SubstationData, LoadError>
where
    S: AssetStore + ?Sized,
{
    let substation_record: Substation = load_one(store, substation).await?;
    let levels: Vec<VoltageLevel> =
        load_active(store, &Predicate::column_in("substation_mrid", [substation])).await?;

    let base_voltage_mrids: Vec<Mrid> = levels.iter().map(|vl| vl.base_voltage_mrid).collect();
    let base_voltages: HashMap<Mrid, BaseVoltage> =
        load_active::<BaseVoltage, S>(store, &Predicate::mrid_in(base_voltage_mrids))
            .await?
            .into_iter()
            .map(|bv| (bv.mrid(), bv))
            .collect();

    let mut nodes_by_level: HashMap<Mrid, Vec<ConnectivityNode>> = HashMap::new();
    let containers = levels.iter().map(Versioned::mrid);
    let nodes: Vec<ConnectivityNode> = load_active(
        store,
        &Predicate::column_in("connectivity_node_container_mrid", containers),
    )
    .await?;
    for node in nodes {
        nodes_by_level
            .entry(node.connectivity_node_container_mrid)
            .or_default()
            .push(node);
    }

    let mut voltage_levels = Vec::with_capacity(levels.len());
    for level in levels {
        let base_voltage = base_voltages
            .get(&level.base_voltage_mrid)
            .cloned()
            .ok_or(LoadError::MissingBaseVoltage {
                voltage_level: level.mrid(),
                base_voltage: level.base_voltage_mrid,
            })?;
        let connectivity_nodes = nodes_by_level.remove(&level.mrid()).unwrap_or_default();
        voltage_levels.push(ConnectableVoltageLevel {
            voltage_level: level,
            connectivity_nodes,
            base_voltage,
        });
    }

    Ok(SubstationData {
        substation: substation_record,
        voltage_levels,
    })
}

/// Graph of every active terminal in the store.
pub async fn load_graph<S>(store: &S) -> Result<ConnectivityGraph, StoreError>
where
    S: AssetStore + ?Sized,
{
    let terminals: Vec<Terminal> = load_active(store, &Predicate::All).await?;
    Ok(ConnectivityGraph::build(&terminals))
}

/// Graph of the active terminals within `hops` edges of `seeds`.
///
/// Seeds may be equipment or connectivity nodes. Each round follows the
/// terminals touching the current frontier one edge further, so any path of
/// at most `hops` edges starting at a seed is present in the result.
pub async fn build_graph_for<S>(
    store: &S,
    seeds: &[Mrid],
    hops: usize,
) -> Result<ConnectivityGraph, StoreError>
where
    S: AssetStore + ?Sized,
{
    let mut visited: HashSet<Mrid> = seeds.iter().copied().collect();
    let mut frontier: Vec<Mrid> = seeds.to_vec();
    let mut seen_terminals: HashSet<Mrid> = HashSet::new();
    let mut terminals: Vec<Terminal> = Vec::new();

    for _ in 0..hops {
        if frontier.is_empty() {
            break;
        }

        let mut touching: Vec<Terminal> = load_active(
            store,
            &Predicate::column_in("conducting_equipment_mrid", frontier.iter().copied()),
        )
        .await?;
        touching.extend(
            load_active::<Terminal, S>(
                store,
                &Predicate::column_in("connectivity_node_mrid", frontier.iter().copied()),
            )
            .await?,
        );

        let mut next = Vec::new();
        for terminal in touching {
            if !seen_terminals.insert(terminal.mrid()) {
                continue;
            }
            for end in [terminal.conducting_equipment_mrid, terminal.connectivity_node_mrid] {
                if visited.insert(end) {
                    next.push(end);
                }
            }
            terminals.push(terminal);
        }
        frontier = next;
    }

    debug!(
        seeds = seeds.len(),
        hops,
        terminals = terminals.len(),
        "Built local connectivity graph"
    );
    Ok(ConnectivityGraph::build(&terminals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAssetStore;
    use crate::types::{CommitId, IdentifiedObject};
    use uuid::Uuid;

    fn id(n: u128) -> Mrid {
        Mrid::new(Uuid::from_u128(n))
    }

    fn identity(n: u128) -> IdentifiedObject {
        IdentifiedObject::named(id(n), format!("asset {n}"), "", "")
    }

    fn level(mrid: u128, base_voltage: u128, substation: u128) -> VoltageLevel {
        VoltageLevel {
            identity: identity(mrid),
            base_voltage_mrid: id(base_voltage),
            substation_mrid: id(substation),
            ..Default::default()
        }
    }

    fn node(mrid: u128, container: u128) -> ConnectivityNode {
        ConnectivityNode {
            identity: identity(mrid),
            connectivity_node_container_mrid: id(container),
        }
    }

    fn terminal(mrid: u128, equipment: u128, node: u128, seq: i32) -> Terminal {
        Terminal {
            identity: identity(mrid),
            sequence_number: seq,
            conducting_equipment_mrid: id(equipment),
            connectivity_node_mrid: id(node),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_target_sequence_numbers() {
        let store = InMemoryAssetStore::new();
        store.seed(&[terminal(1, 100, 500, 1), terminal(2, 101, 501, 2)]).unwrap();

        let targets = target_terminal_sequence_numbers(&store, &[id(100), id(101), id(102)])
            .await
            .unwrap();

        assert_eq!(targets.get(&id(100)), Some(&2));
        assert_eq!(targets.get(&id(101)), Some(&1));
        assert_eq!(targets.get(&id(102)), None);
    }

    #[tokio::test]
    async fn test_multiple_terminals_rejected() {
        let store = InMemoryAssetStore::new();
        store.seed(&[terminal(1, 100, 500, 1), terminal(2, 100, 501, 2)]).unwrap();

        let err = target_terminal_sequence_numbers(&store, &[id(100)]).await.unwrap_err();
        match err {
            LoadError::MultipleTerminals(lines) => assert_eq!(lines, vec![id(100)]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_deleted_terminal_does_not_count() {
        let store = InMemoryAssetStore::new();
        let mut removed = terminal(2, 100, 501, 2);
        removed.identity.commit_id = CommitId::new(5);
        removed.identity.deleted = true;
        store.seed(&[terminal(1, 100, 500, 1), terminal(2, 100, 501, 2), removed]).unwrap();

        let targets = target_terminal_sequence_numbers(&store, &[id(100)]).await.unwrap();
        assert_eq!(targets.get(&id(100)), Some(&2));
    }

    #[tokio::test]
    async fn test_repointed_terminal_follows_latest_version() {
        let store = InMemoryAssetStore::new();
        let mut moved = terminal(1, 101, 501, 1);
        moved.identity.commit_id = CommitId::new(2);
        store.seed(&[terminal(1, 100, 500, 1), moved]).unwrap();

        assert!(load_terminals(&store, &[id(100)]).await.unwrap().is_empty());
        let targets = target_terminal_sequence_numbers(&store, &[id(100), id(101)])
            .await
            .unwrap();
        assert_eq!(targets.get(&id(100)), None);
        assert_eq!(targets.get(&id(101)), Some(&2));

        let stale = build_graph_for(&store, &[id(100)], 4).await.unwrap();
        assert_eq!(stale.edge_count(), 0);
        assert_eq!(stale.distance(id(100), id(500)), None);

        let current = build_graph_for(&store, &[id(501)], 4).await.unwrap();
        assert_eq!(current.edge_count(), 1);
        assert_eq!(current.distance(id(101), id(501)), Some(1));
    }

    #[tokio::test]
    async fn test_moved_line_leaves_voltage_level() {
        let store = InMemoryAssetStore::new();
        store
            .seed(&[VoltageLevel {
                identity: identity(10),
                base_voltage_mrid: id(20),
                ..Default::default()
            }])
            .unwrap();
        let mut moved = AcLineSegment {
            identity: identity(100),
            equipment_container_mrid: id(11),
            ..Default::default()
        };
        moved.identity.commit_id = CommitId::new(3);
        store
            .seed(&[
                AcLineSegment {
                    identity: identity(100),
                    equipment_container_mrid: id(10),
                    ..Default::default()
                },
                moved,
            ])
            .unwrap();

        let equipment = load_voltage_level_equipment(&store, id(10)).await.unwrap();
        assert!(equipment.lines.is_empty());
    }

    #[tokio::test]
    async fn test_load_substation_data() {
        let store = InMemoryAssetStore::new();
        store.seed(&[Substation { identity: identity(1) }]).unwrap();
        store
            .seed(&[
                BaseVoltage { identity: identity(20), nominal_voltage: 400.0 },
                BaseVoltage { identity: identity(21), nominal_voltage: 132.0 },
            ])
            .unwrap();
        store
            .seed(&[level(10, 20, 1), level(11, 21, 1), level(12, 21, 2)])
            .unwrap();
        store
            .seed(&[
                node(30, 10),
                node(31, 11),
                node(32, 11),
            ])
            .unwrap();

        let data = load_substation_data(&store, id(1)).await.unwrap();

        assert_eq!(data.voltage_levels.len(), 2);
        assert_eq!(data.voltage_levels[0].base_voltage.nominal_voltage, 400.0);
        assert_eq!(data.voltage_levels[0].connectivity_nodes.len(), 1);
        assert_eq!(data.voltage_levels[1].connectivity_nodes.len(), 2);
        data.voltage_levels.iter().for_each(ConnectableVoltageLevel::require_consistent_voltage);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = InMemoryAssetStore::new();
        assert!(matches!(
            load_substation_data(&store, id(1)).await,
            Err(LoadError::NotFound { table: Table::Substations, .. })
        ));

        store.seed(&[Substation { identity: identity(1) }]).unwrap();
        store.seed(&[level(10, 20, 1)]).unwrap();
        assert!(matches!(
            load_substation_data(&store, id(1)).await,
            Err(LoadError::MissingBaseVoltage { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_voltage_level_equipment() {
        let store = InMemoryAssetStore::new();
        store.seed(&[level(10, 20, 0)]).unwrap();
        store
            .seed(&[
                AcLineSegment {
                    identity: identity(100),
                    equipment_container_mrid: id(10),
                    ..Default::default()
                },
                AcLineSegment {
                    identity: identity(101),
                    equipment_container_mrid: id(99),
                    ..Default::default()
                },
            ])
            .unwrap();
        store
            .seed(&[SynchronousMachine {
                identity: identity(200),
                equipment_container_mrid: id(10),
                rated_s: 50.0,
            }])
            .unwrap();
        store.seed(&[terminal(1, 100, 500, 1)]).unwrap();

        let equipment = load_voltage_level_equipment(&store, id(10)).await.unwrap();

        assert_eq!(equipment.lines.len(), 1);
        assert_eq!(equipment.generators.len(), 1);
        assert!(equipment.loads.is_empty());
        assert_eq!(equipment.terminal_sequence_overrides.get(&id(100)), Some(&2));
    }

    #[tokio::test]
    async fn test_build_graph_for_limits_depth() {
        let store = InMemoryAssetStore::new();
        // Chain E1 ── N1 ── E2 ── N2 ── E3 ── N3 ── E4
        store
            .seed(&[
                terminal(1, 1, 11, 1),
                terminal(2, 2, 11, 1),
                terminal(3, 2, 12, 2),
                terminal(4, 3, 12, 1),
                terminal(5, 3, 13, 2),
                terminal(6, 4, 13, 1),
            ])
            .unwrap();

        let near = build_graph_for(&store, &[id(1)], 2).await.unwrap();
        assert_eq!(near.edge_count(), 2);
        assert_eq!(near.distance(id(1), id(2)), Some(2));
        assert!(!near.contains(id(4)));

        let full = build_graph_for(&store, &[id(1)], 6).await.unwrap();
        assert_eq!(full.edge_count(), 6);
        assert_eq!(full.distance(id(1), id(4)), Some(6));

        let everything = load_graph(&store).await.unwrap();
        assert_eq!(everything.edge_count(), 6);
    }
}

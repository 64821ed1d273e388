//! Request routing through the satellite mesh
//!
//! Routing for one tick runs in three stages:
//! 1. Attachment: each ground station of interest picks its nearest feasible
//!    satellite from the GSL set.
//! 2. Relevant-satellite shortest paths: Dijkstra over the ISL graph from
//!    every serving satellite, stopping once all higher-id serving satellites
//!    are settled. Only these pairs are ever needed, so the cost tracks
//!    active demand rather than constellation size.
//! 3. Resolution: `[g1, s1, ..., s2, g2]` for each request.
//!
//! Equal-length paths are broken towards the lexicographically smaller
//! satellite-id sequence, so every run yields the same table.

use crate::{Endpoint, Topology};
use orbital_mechanics::{GroundId, SatelliteId};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Ground station {ground} has no feasible satellite link")]
    AttachmentFailure { ground: GroundId },
    #[error("No satellite path between {from} and {to}")]
    PathResolutionFailure { from: SatelliteId, to: SatelliteId },
}

impl RoutingError {
    pub fn reason(&self) -> &'static str {
        match self {
            RoutingError::AttachmentFailure { .. } => "attachment",
            RoutingError::PathResolutionFailure { .. } => "path_resolution",
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Serving satellite of one ground station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub satellite: SatelliteId,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Attachments {
    serving: BTreeMap<GroundId, Attachment>,
    orphaned: BTreeSet<GroundId>,
}

impl Attachments {
    pub fn get(&self, ground: GroundId) -> Option<&Attachment> {
        self.serving.get(&ground)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroundId, &Attachment)> {
        self.serving.iter().map(|(g, a)| (*g, a))
    }

    /// Grounds of interest without any feasible link this tick.
    pub fn orphaned(&self) -> &BTreeSet<GroundId> {
        &self.orphaned
    }

    pub fn is_orphaned(&self, ground: GroundId) -> bool {
        self.orphaned.contains(&ground)
    }

    pub fn serving_satellites(&self) -> BTreeSet<SatelliteId> {
        self.serving.values().map(|a| a.satellite).collect()
    }

    pub fn len(&self) -> usize {
        self.serving.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serving.is_empty()
    }
}

/// Attach every ground of interest to its nearest feasible satellite.
/// Equal distances go to the lower satellite id.
pub fn attach(topology: &Topology, grounds: impl IntoIterator<Item = GroundId>) -> Attachments {
    let interest: BTreeSet<GroundId> = grounds.into_iter().collect();
    let mut serving: BTreeMap<GroundId, Attachment> = BTreeMap::new();

    for link in topology.gsl() {
        if !interest.contains(&link.ground) {
            continue;
        }
        let candidate = Attachment {
            satellite: link.satellite,
            distance_m: link.distance_m,
        };
        serving
            .entry(link.ground)
            .and_modify(|best| {
                let closer = candidate
                    .distance_m
                    .total_cmp(&best.distance_m)
                    .then(candidate.satellite.cmp(&best.satellite))
                    == Ordering::Less;
                if closer {
                    *best = candidate;
                }
            })
            .or_insert(candidate);
    }

    let orphaned = interest
        .into_iter()
        .filter(|g| !serving.contains_key(g))
        .collect();

    Attachments { serving, orphaned }
}

/// Shortest satellite path, including both end satellites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatPath {
    pub satellites: Vec<SatelliteId>,
    pub distance_m: f64,
}

impl SatPath {
    pub fn reversed(&self) -> Self {
        let mut satellites = self.satellites.clone();
        satellites.reverse();
        Self {
            satellites,
            distance_m: self.distance_m,
        }
    }
}

/// Shortest paths between relevant satellites, keyed by `(low, high)` id.
#[derive(Debug, Clone, Default)]
pub struct SatPathTable {
    paths: BTreeMap<(SatelliteId, SatelliteId), SatPath>,
}

impl SatPathTable {
    /// Path oriented from `from` to `to`. A satellite reaches itself with a
    /// zero-length path.
    pub fn get(&self, from: SatelliteId, to: SatelliteId) -> Option<SatPath> {
        match from.cmp(&to) {
            Ordering::Equal => Some(SatPath {
                satellites: vec![from],
                distance_m: 0.0,
            }),
            Ordering::Less => self.paths.get(&(from, to)).cloned(),
            Ordering::Greater => self.paths.get(&(to, from)).map(SatPath::reversed),
        }
    }

    /// Canonical entries in ascending `(low, high)` order.
    pub fn iter(&self) -> impl Iterator<Item = (SatelliteId, SatelliteId, &SatPath)> {
        self.paths.iter().map(|((a, b), p)| (*a, *b, p))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    cost: f64,
    node: NodeIndex,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl Ord for State {
    // Min-heap on cost, then on node id.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.index().cmp(&self.node.index()))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// ISL graph of one tick. Node index `i` is `SatelliteId(i)`.
pub struct SatelliteGraph {
    graph: UnGraph<SatelliteId, f64>,
}

impl SatelliteGraph {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut graph =
            UnGraph::with_capacity(topology.satellite_count(), topology.isl().len());
        for i in 0..topology.satellite_count() {
            graph.add_node(SatelliteId(i as u32));
        }
        for link in topology.isl() {
            graph.add_edge(
                NodeIndex::new(link.a.index()),
                NodeIndex::new(link.b.index()),
                link.distance_m,
            );
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All-pairs shortest paths among `relevant`. Unreachable pairs are left
    /// out; ids outside the constellation are ignored.
    pub fn shortest_paths(&self, relevant: &BTreeSet<SatelliteId>) -> SatPathTable {
        let relevant: Vec<NodeIndex> = relevant
            .iter()
            .filter(|s| s.index() < self.graph.node_count())
            .map(|s| NodeIndex::new(s.index()))
            .collect();

        let mut table = SatPathTable::default();
        for (i, &source) in relevant.iter().enumerate() {
            let targets = &relevant[i + 1..];
            if targets.is_empty() {
                break;
            }
            let (dist, prev) = self.dijkstra(source, targets);
            for &target in targets {
                if dist[target.index()].is_finite() {
                    table.paths.insert(
                        (self.graph[source], self.graph[target]),
                        SatPath {
                            satellites: self.trace(&prev, target),
                            distance_m: dist[target.index()],
                        },
                    );
                }
            }
        }

        debug!(
            "Shortest paths: {} relevant satellites, {} connected pairs",
            relevant.len(),
            table.len()
        );
        table
    }

    fn dijkstra(
        &self,
        source: NodeIndex,
        targets: &[NodeIndex],
    ) -> (Vec<f64>, Vec<Option<NodeIndex>>) {
        let n = self.graph.node_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<NodeIndex>> = vec![None; n];
        let mut settled = vec![false; n];
        let mut pending: BTreeSet<NodeIndex> = targets.iter().copied().collect();

        let mut heap = BinaryHeap::new();
        dist[source.index()] = 0.0;
        heap.push(State {
            cost: 0.0,
            node: source,
        });

        while let Some(State { cost, node }) = heap.pop() {
            if settled[node.index()] {
                continue;
            }
            settled[node.index()] = true;

            pending.remove(&node);
            if pending.is_empty() {
                break;
            }

            for edge in self.graph.edges(node) {
                let next = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if settled[next.index()] {
                    continue;
                }

                let candidate = cost + *edge.weight();
                let current = dist[next.index()];
                if candidate < current {
                    dist[next.index()] = candidate;
                    prev[next.index()] = Some(node);
                    heap.push(State {
                        cost: candidate,
                        node: next,
                    });
                } else if candidate == current {
                    if let Some(incumbent) = prev[next.index()] {
                        let tail = std::iter::once(self.graph[next]);
                        let challenger = self.trace(&prev, node).into_iter().chain(tail.clone());
                        let holder = self.trace(&prev, incumbent).into_iter().chain(tail);
                        if challenger.lt(holder) {
                            prev[next.index()] = Some(node);
                        }
                    }
                }
            }
        }

        (dist, prev)
    }

    fn trace(&self, prev: &[Option<NodeIndex>], target: NodeIndex) -> Vec<SatelliteId> {
        let mut path = vec![self.graph[target]];
        let mut cursor = target;
        while let Some(p) = prev[cursor.index()] {
            path.push(self.graph[p]);
            cursor = p;
        }
        path.reverse();
        path
    }
}

/// End-to-end path for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub hops: Vec<Endpoint>,
    pub distance_m: f64,
}

impl ResolvedPath {
    /// Consecutive endpoint pairs along the path.
    pub fn edges(&self) -> Vec<(Endpoint, Endpoint)> {
        self.hops.windows(2).map(|w| (w[0], w[1])).collect()
    }

    pub fn pipe_joined(&self) -> String {
        self.hops
            .iter()
            .map(Endpoint::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Attachments and satellite paths for one tick.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub attachments: Attachments,
    pub sat_paths: SatPathTable,
}

impl RoutingTable {
    pub fn compute(topology: &Topology, grounds: impl IntoIterator<Item = GroundId>) -> Self {
        let attachments = attach(topology, grounds);
        let relevant = attachments.serving_satellites();
        let sat_paths = SatelliteGraph::from_topology(topology).shortest_paths(&relevant);
        Self {
            attachments,
            sat_paths,
        }
    }

    pub fn resolve(&self, source: GroundId, destination: GroundId) -> Result<ResolvedPath> {
        let first = self
            .attachments
            .get(source)
            .ok_or(RoutingError::AttachmentFailure { ground: source })?;
        let last = self
            .attachments
            .get(destination)
            .ok_or(RoutingError::AttachmentFailure {
                ground: destination,
            })?;

        let sat_path = self.sat_paths.get(first.satellite, last.satellite).ok_or(
            RoutingError::PathResolutionFailure {
                from: first.satellite,
                to: last.satellite,
            },
        )?;

        let mut hops = Vec::with_capacity(sat_path.satellites.len() + 2);
        hops.push(Endpoint::Ground(source));
        hops.extend(sat_path.satellites.iter().copied().map(Endpoint::Satellite));
        hops.push(Endpoint::Ground(destination));

        Ok(ResolvedPath {
            hops,
            distance_m: first.distance_m + sat_path.distance_m + last.distance_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ConstellationShape, LinkingPolicy, TopologyBuilder};
    use crate::{GslLink, IslLink};
    use orbital_mechanics::limits::LinkLimits;
    use orbital_mechanics::walker::WalkerDelta;
    use orbital_mechanics::{ConstellationModel, EarthModel, GeodeticPosition, EARTH_RADIUS_M};
    use proptest::prelude::*;

    fn sat(i: u32) -> SatelliteId {
        SatelliteId(i)
    }

    fn gnd(i: usize) -> GroundId {
        GroundId::from_index(i).unwrap()
    }

    fn isl(a: u32, b: u32, d: f64) -> IslLink {
        IslLink {
            a: sat(a),
            b: sat(b),
            distance_m: d,
        }
    }

    fn gsl(g: usize, s: u32, d: f64) -> GslLink {
        GslLink {
            ground: gnd(g),
            satellite: sat(s),
            distance_m: d,
        }
    }

    /// Ring 0-1-2-3-4-5-0 with unit hops, satellite 6 isolated.
    fn ring_topology(gsl_links: Vec<GslLink>) -> Topology {
        Topology::new(
            7,
            vec![
                isl(0, 1, 1.0),
                isl(1, 2, 1.0),
                isl(2, 3, 1.0),
                isl(3, 4, 1.0),
                isl(4, 5, 1.0),
                isl(5, 0, 1.0),
            ],
            gsl_links,
        )
    }

    #[test]
    fn test_attach_picks_nearest() {
        let topology = ring_topology(vec![gsl(0, 3, 900.0), gsl(0, 1, 400.0), gsl(1, 2, 700.0)]);
        let attachments = attach(&topology, [gnd(0), gnd(1)]);
        assert_eq!(attachments.get(gnd(0)).unwrap().satellite, sat(1));
        assert_eq!(attachments.get(gnd(0)).unwrap().distance_m, 400.0);
        assert_eq!(attachments.get(gnd(1)).unwrap().satellite, sat(2));
        assert!(attachments.orphaned().is_empty());
    }

    #[test]
    fn test_attach_tie_prefers_lower_id() {
        let topology = ring_topology(vec![gsl(0, 4, 500.0), gsl(0, 2, 500.0)]);
        let attachments = attach(&topology, [gnd(0)]);
        assert_eq!(attachments.get(gnd(0)).unwrap().satellite, sat(2));
    }

    #[test]
    fn test_attach_ignores_grounds_not_of_interest() {
        let topology = ring_topology(vec![gsl(0, 1, 400.0), gsl(1, 2, 700.0)]);
        let attachments = attach(&topology, [gnd(1)]);
        assert_eq!(attachments.len(), 1);
        assert!(attachments.get(gnd(0)).is_none());
        assert!(!attachments.is_orphaned(gnd(0)));
    }

    #[test]
    fn test_orphaned_ground() {
        let topology = ring_topology(vec![gsl(0, 1, 400.0)]);
        let table = RoutingTable::compute(&topology, [gnd(0), gnd(1)]);

        assert!(table.attachments.get(gnd(1)).is_none());
        assert!(table.attachments.is_orphaned(gnd(1)));
        assert_eq!(
            table.resolve(gnd(0), gnd(1)),
            Err(RoutingError::AttachmentFailure { ground: gnd(1) })
        );
        assert_eq!(
            table.resolve(gnd(1), gnd(0)),
            Err(RoutingError::AttachmentFailure { ground: gnd(1) })
        );
    }

    #[test]
    fn test_disconnected_satellites() {
        let topology = ring_topology(vec![gsl(0, 0, 400.0), gsl(1, 6, 500.0)]);
        let table = RoutingTable::compute(&topology, [gnd(0), gnd(1)]);
        assert!(table.sat_paths.is_empty());
        assert_eq!(
            table.resolve(gnd(0), gnd(1)),
            Err(RoutingError::PathResolutionFailure {
                from: sat(0),
                to: sat(6)
            })
        );
    }

    #[test]
    fn test_resolve_full_path() {
        let topology = ring_topology(vec![gsl(0, 1, 400.0), gsl(1, 3, 600.0)]);
        let table = RoutingTable::compute(&topology, [gnd(0), gnd(1)]);

        let path = table.resolve(gnd(0), gnd(1)).unwrap();
        assert_eq!(path.pipe_joined(), "-1|1|2|3|-2");
        assert_eq!(path.distance_m, 400.0 + 2.0 + 600.0);
        assert_eq!(path.edges().len(), 4);

        let back = table.resolve(gnd(1), gnd(0)).unwrap();
        assert_eq!(back.pipe_joined(), "-2|3|2|1|-1");
        assert_eq!(back.distance_m, path.distance_m);
    }

    #[test]
    fn test_resolve_same_satellite() {
        let topology = ring_topology(vec![gsl(0, 4, 400.0), gsl(1, 4, 300.0)]);
        let table = RoutingTable::compute(&topology, [gnd(0), gnd(1)]);
        let path = table.resolve(gnd(0), gnd(1)).unwrap();
        assert_eq!(path.pipe_joined(), "-1|4|-2");
        assert_eq!(path.distance_m, 700.0);
    }

    #[test]
    fn test_equal_paths_prefer_lower_ids() {
        // 0 -> 3 is two hops either way around the ring; 0-1-2-3 beats 0-5-4-3.
        let topology = Topology::new(
            6,
            vec![
                isl(0, 5, 1.0),
                isl(5, 4, 1.0),
                isl(4, 3, 1.0),
                isl(0, 1, 1.0),
                isl(1, 2, 1.0),
                isl(2, 3, 1.0),
            ],
            vec![],
        );
        let graph = SatelliteGraph::from_topology(&topology);
        let table = graph.shortest_paths(&[sat(0), sat(3)].into_iter().collect());
        let path = table.get(sat(0), sat(3)).unwrap();
        assert_eq!(path.satellites, vec![sat(0), sat(1), sat(2), sat(3)]);
        assert_eq!(
            table.get(sat(3), sat(0)).unwrap().satellites,
            vec![sat(3), sat(2), sat(1), sat(0)]
        );
    }

    #[test]
    fn test_only_relevant_pairs_computed() {
        let topology = ring_topology(vec![]);
        let graph = SatelliteGraph::from_topology(&topology);
        let relevant: BTreeSet<SatelliteId> =
            [sat(0), sat(2), sat(4), sat(99)].into_iter().collect();
        let table = graph.shortest_paths(&relevant);
        let pairs: Vec<(SatelliteId, SatelliteId)> = table.iter().map(|(a, b, _)| (a, b)).collect();
        assert_eq!(pairs, vec![(sat(0), sat(2)), (sat(0), sat(4)), (sat(2), sat(4))]);
        assert_eq!(table.get(sat(0), sat(4)).unwrap().distance_m, 2.0);
        assert_eq!(table.get(sat(0), sat(0)).unwrap().satellites, vec![sat(0)]);
    }

    fn walker_table(
        planes: u32,
        nodes: u32,
        time: f64,
        grounds: &[(f64, f64)],
    ) -> (Topology, RoutingTable) {
        let walker = WalkerDelta {
            planes,
            nodes_per_plane: nodes,
            phasing: 1,
            semi_major_axis_m: EARTH_RADIUS_M + 550_000.0,
            inclination_deg: 53.0,
        };
        let mut model = ConstellationModel::new(walker.clone(), EarthModel::default()).unwrap();
        let mut ids = Vec::new();
        for &(lat, lon) in grounds {
            let location = GeodeticPosition::new(lat, lon).unwrap();
            ids.push(model.add_ground(&location).unwrap());
        }
        let limits =
            LinkLimits::for_shell(walker.semi_major_axis_m, EARTH_RADIUS_M, 100_000.0, 10.0).unwrap();
        let shape = ConstellationShape::from_walker(&walker);
        let topology = TopologyBuilder::new(shape, LinkingPolicy::default())
            .unwrap()
            .build_snapshot(&model.positions_at(time), &limits)
            .unwrap();
        let table = RoutingTable::compute(&topology, ids);
        (topology, table)
    }

    const CITIES: [(f64, f64); 8] = [
        (52.5, 13.4),
        (40.7, -74.0),
        (-33.9, 151.2),
        (35.7, 139.7),
        (-23.5, -46.6),
        (1.35, 103.8),
        (30.0, 31.2),
        (19.4, -99.1),
    ];

    #[test]
    fn test_walker_paths_use_isl_links() {
        let (topology, table) = walker_table(12, 20, 0.0, &CITIES);
        let links: BTreeSet<(SatelliteId, SatelliteId)> = topology
            .isl()
            .iter()
            .map(|l| (l.a.min(l.b), l.a.max(l.b)))
            .collect();
        for (_, _, path) in table.sat_paths.iter() {
            for hop in path.satellites.windows(2) {
                assert!(links.contains(&(hop[0].min(hop[1]), hop[0].max(hop[1]))));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_symmetry_and_triangle(time in 0.0f64..6_000.0) {
            let (_, table) = walker_table(12, 20, time, &CITIES);
            let relevant = table.attachments.serving_satellites();

            for &i in &relevant {
                for &j in &relevant {
                    let (Some(ij), Some(ji)) = (table.sat_paths.get(i, j), table.sat_paths.get(j, i)) else {
                        continue;
                    };
                    prop_assert_eq!(ij.distance_m, ji.distance_m);
                    let mut reversed = ji.satellites.clone();
                    reversed.reverse();
                    prop_assert_eq!(&ij.satellites, &reversed);

                    for &k in &relevant {
                        if let (Some(ik), Some(jk)) = (table.sat_paths.get(i, k), table.sat_paths.get(j, k)) {
                            prop_assert!(ik.distance_m <= ij.distance_m + jk.distance_m + 1e-6);
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_resolved_distance_is_sum(time in 0.0f64..6_000.0) {
            let (_, table) = walker_table(12, 20, time, &CITIES);
            let grounds: Vec<GroundId> = (0..CITIES.len()).map(gnd).collect();

            for &g1 in &grounds {
                for &g2 in &grounds {
                    let Ok(path) = table.resolve(g1, g2) else { continue };
                    let a1 = table.attachments.get(g1).unwrap();
                    let a2 = table.attachments.get(g2).unwrap();
                    let sats = table.sat_paths.get(a1.satellite, a2.satellite).unwrap();
                    prop_assert_eq!(path.distance_m, a1.distance_m + sats.distance_m + a2.distance_m);
                    prop_assert_eq!(path.hops.first(), Some(&Endpoint::Ground(g1)));
                    prop_assert_eq!(path.hops.last(), Some(&Endpoint::Ground(g2)));
                    prop_assert_eq!(path.hops.len(), sats.satellites.len() + 2);
                }
            }
        }
    }
}

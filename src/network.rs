use crate::error::NetworkError;
use crate::math::Point2d;
use crate::road::{Road, POINT_EPSILON};
use crate::{RoadId, RoadSet};
use cgmath::prelude::*;
use itertools::{iproduct, Itertools};
use log::{debug, info, warn};
use pathfinding::directed::dijkstra::dijkstra;
use slotmap::SecondaryMap;
use smallvec::SmallVec;

/// Road lengths are scaled by this before being used as integer path costs.
const COST_SCALE: f64 = 1000.0;

/// Entries whose directions have a dot product below this face each other.
const OPPOSING_DOT: f64 = -0.99;

/// The kind of route a path takes through a junction, inferred from how
/// its length ranks among the other paths from the same entry road.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
    RightTurn,
    Straight,
    LeftTurn,
    UTurn,
}

impl RouteKind {
    /// All route kinds, shortest first.
    pub const ALL: [RouteKind; 4] = [
        Self::RightTurn,
        Self::Straight,
        Self::LeftTurn,
        Self::UTurn,
    ];

    /// The kind of the path at `rank` among the sorted paths of one entry.
    /// Any paths beyond the fourth are treated as u-turns.
    fn from_rank(rank: usize) -> Self {
        Self::ALL[usize::min(rank, 3)]
    }

    /// The relative likelihood that a new vehicle takes a route of this kind.
    pub fn spawn_weight(self) -> f64 {
        match self {
            Self::RightTurn | Self::Straight | Self::LeftTurn => 0.3,
            Self::UTurn => 0.1,
        }
    }
}

/// A route from an entry road to an exit road.
#[derive(Clone, Debug)]
pub struct Path {
    roads: SmallVec<[RoadId; 8]>,
    length: f64,
    kind: RouteKind,
}

impl Path {
    /// The roads along the path, from entry to exit.
    pub fn roads(&self) -> &[RoadId] {
        &self.roads
    }

    /// The total length of the roads along the path.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The kind of route the path takes.
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// The road the path starts on.
    pub fn entry(&self) -> RoadId {
        self.roads[0]
    }

    /// The road the path ends on.
    pub fn exit(&self) -> RoadId {
        self.roads[self.roads.len() - 1]
    }
}

/// A network of roads joined end to start.
#[derive(Clone, Default)]
pub struct Network {
    /// The roads in the network.
    roads: RoadSet,
    /// Whether each road (row) feeds into each other road (column),
    /// indexed by insertion order.
    adjacency: Vec<Vec<bool>>,
    /// The roads vehicles can enter the network on.
    entries: Vec<RoadId>,
    /// The roads vehicles can leave the network from.
    exits: Vec<RoadId>,
    /// The shortest path between every connected entry and exit,
    /// sorted by the number of roads along it.
    paths: Vec<Path>,
}

impl Network {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds a network from the given road segments and finds its paths.
    pub fn build(segments: &[(Point2d, Point2d)]) -> Result<Self, NetworkError> {
        let mut network = Self::new();
        network.add_and_calibrate(segments)?;
        if network.find_paths().is_empty() {
            return Err(NetworkError::NoPaths);
        }
        Ok(network)
    }

    /// Adds road segments to the network, splits any roads which cross,
    /// then reconnects the network and finds its entries and exits.
    ///
    /// Any previously found paths are discarded.
    pub fn add_and_calibrate(&mut self, segments: &[(Point2d, Point2d)]) -> Result<(), NetworkError> {
        let mut roads = self
            .roads
            .values()
            .map(|road| (road.start(), road.end()))
            .chain(segments.iter().copied())
            .filter_map(|(start, end)| {
                let road = Road::new(start, end);
                if road.is_none() {
                    warn!("Skipping zero-length road at {:?}", start);
                }
                road
            })
            .collect::<Vec<_>>();

        split_crossings(&mut roads);

        let mut unique: Vec<Road> = Vec::with_capacity(roads.len());
        for road in roads {
            if unique.contains(&road) {
                debug!("Skipping duplicate road {:?} -> {:?}", road.start(), road.end());
            } else {
                unique.push(road);
            }
        }
        if unique.is_empty() {
            return Err(NetworkError::Empty);
        }

        self.roads = RoadSet::with_key();
        for road in unique {
            self.roads.insert_with_key(|id| {
                let mut road = road;
                road.set_id(id);
                road
            });
        }
        self.paths.clear();
        self.connect();

        info!(
            "Calibrated network: {} roads, {} entries, {} exits",
            self.roads.len(),
            self.entries.len(),
            self.exits.len()
        );
        Ok(())
    }

    /// Links every road to the roads starting where it ends, then finds
    /// the entry and exit roads from the adjacency matrix.
    fn connect(&mut self) {
        let ids = self.roads.keys().collect::<Vec<_>>();
        let n = ids.len();

        self.adjacency = vec![vec![false; n]; n];
        for (i, j) in iproduct!(0..n, 0..n) {
            let (a, b) = (&self.roads[ids[i]], &self.roads[ids[j]]);
            if a.end() == b.start() && !a.is_reverse_of(b) {
                self.adjacency[i][j] = true;
                self.roads[ids[i]].add_child(ids[j]);
                self.roads[ids[j]].add_parent(ids[i]);
            }
        }

        // A road with no parents has an empty column; one with no children an empty row.
        self.entries = (0..ids.len())
            .filter(|j| self.adjacency.iter().all(|row| !row[*j]))
            .map(|j| ids[j])
            .collect();
        self.exits = (0..ids.len())
            .filter(|i| self.adjacency[*i].iter().all(|linked| !linked))
            .map(|i| ids[i])
            .collect();
    }

    /// Finds the shortest path from every entry to every exit it can reach.
    ///
    /// The paths are sorted by the number of roads along them, and each is
    /// assigned a [RouteKind] by its rank among the paths from the same entry.
    pub fn find_paths(&mut self) -> &[Path] {
        let mut paths = vec![];
        for (entry, exit) in self.entries.iter().cartesian_product(self.exits.iter()) {
            match self.shortest_path(*entry, *exit) {
                Some(path) => paths.push(path),
                None => debug!("No route from {:?} to {:?}", entry, exit),
            }
        }

        paths.sort_by_key(|path| path.roads.len());

        let mut ranks = SecondaryMap::<RoadId, usize>::new();
        for path in &mut paths {
            let rank = ranks.get(path.entry()).copied().unwrap_or(0);
            ranks.insert(path.entry(), rank + 1);
            path.kind = RouteKind::from_rank(rank);
        }

        info!("Found {} paths", paths.len());
        self.paths = paths;
        &self.paths
    }

    /// Finds the shortest path between two roads by total length, if there is one.
    fn shortest_path(&self, entry: RoadId, exit: RoadId) -> Option<Path> {
        let (roads, _) = dijkstra(&entry, |id| successors(*id, &self.roads), |id| *id == exit)?;
        Some(Path {
            length: roads.iter().map(|id| self.roads[*id].length()).sum(),
            roads: roads.into_iter().collect(),
            kind: RouteKind::RightTurn,
        })
    }

    /// Groups the entry roads into signal phases: entries facing each other
    /// share a phase, and any entry without an opposite has one to itself.
    pub fn signal_phases(&self) -> Vec<SmallVec<[RoadId; 2]>> {
        let mut phases: Vec<SmallVec<[RoadId; 2]>> = vec![];
        for entry in &self.entries {
            let dir = self.roads[*entry].direction();
            let partner = phases.iter_mut().find(|phase| {
                phase.len() == 1 && self.roads[phase[0]].direction().dot(dir) < OPPOSING_DOT
            });
            match partner {
                Some(phase) => phase.push(*entry),
                None => phases.push(smallvec::smallvec![*entry]),
            }
        }
        phases
    }

    /// Gets a reference to the road with the given ID.
    pub fn road(&self, id: RoadId) -> &Road {
        &self.roads[id]
    }

    /// Gets the road with the given ID, if it is in the network.
    pub fn get_road(&self, id: RoadId) -> Option<&Road> {
        self.roads.get(id)
    }

    /// Returns an iterator over all the roads in the network.
    pub fn iter_roads(&self) -> impl Iterator<Item = &Road> {
        self.roads.values()
    }

    /// The roads vehicles can enter the network on.
    pub fn entries(&self) -> &[RoadId] {
        &self.entries
    }

    /// The roads vehicles can leave the network from.
    pub fn exits(&self) -> &[RoadId] {
        &self.exits
    }

    /// Whether the end of road `from` joins the start of road `to`.
    pub fn is_adjacent(&self, from: RoadId, to: RoadId) -> bool {
        self.roads
            .get(from)
            .map(|road| road.children().contains(&to))
            .unwrap_or(false)
    }

    /// The paths through the network, in order of the number of roads along them.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// The paths of the given kind along with their indices into [Self::paths].
    pub fn paths_in(&self, kind: RouteKind) -> impl Iterator<Item = (usize, &Path)> {
        self.paths
            .iter()
            .enumerate()
            .filter(move |(_, path)| path.kind == kind)
    }

    pub(crate) fn roads(&self) -> &RoadSet {
        &self.roads
    }

    pub(crate) fn roads_mut(&mut self) -> &mut RoadSet {
        &mut self.roads
    }
}

/// Splits roads at the points where they cross until no two roads cross
/// except at their ends. New roads are checked against all others.
fn split_crossings(roads: &mut Vec<Road>) {
    loop {
        let mut split = false;
        for (i, j) in (0..roads.len()).tuple_combinations() {
            let Some(point) = roads[i].intersects(&roads[j]) else {
                continue;
            };
            // Reuse an existing endpoint so that the pieces join up exactly
            let point = [&roads[i], &roads[j]]
                .iter()
                .flat_map(|road| [road.start(), road.end()])
                .find(|p| p.distance(point) <= POINT_EPSILON)
                .unwrap_or(point);
            for k in [i, j] {
                if let Some(tail) = roads[k].split(point) {
                    debug!("Split road at {:?}", point);
                    roads.push(tail);
                    split = true;
                }
            }
        }
        if !split {
            break;
        }
    }
}

/// The roads reachable from the end of a road, and the cost of driving along them.
fn successors(road_id: RoadId, roads: &RoadSet) -> impl Iterator<Item = (RoadId, u64)> + '_ {
    roads[road_id].children().iter().map(move |id| {
        let cost = (COST_SCALE * roads[*id].length()).round() as u64;
        (*id, cost)
    })
}

/// The canonical four-way junction: two two-way roads crossing at right angles
/// in the middle of a `size` by `size` square, with each lane `lane_offset`
/// from the centre line. Traffic drives on the right.
pub fn junction_layout(size: f64, lane_offset: f64) -> Vec<(Point2d, Point2d)> {
    let (lo, hi) = (0.5 * size - lane_offset, 0.5 * size + lane_offset);
    vec![
        // Westbound
        (Point2d::new(size, lo), Point2d::new(0.0, lo)),
        // Eastbound
        (Point2d::new(0.0, hi), Point2d::new(size, hi)),
        // Southbound
        (Point2d::new(lo, 0.0), Point2d::new(lo, size)),
        // Northbound
        (Point2d::new(hi, size), Point2d::new(hi, 0.0)),
    ]
}

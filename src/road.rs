use crate::math::{heading, line_intersection, rot90, Point2d, Vector2d};
use crate::util::Interval;
use crate::{RoadId, VehicleId, VehicleSet};
use cgmath::prelude::*;
use smallvec::SmallVec;

/// A road is full while a vehicle is closer than this to its start, in units.
const CLEARANCE: f64 = 50.0;

/// Split points closer than this to an endpoint are treated as that endpoint.
pub(crate) const POINT_EPSILON: f64 = 1e-6;

/// The range of line parameters that lie on a segment, with a little slack
/// so that segments meeting at a shared point always register as intersecting.
const ON_SEGMENT: Interval<f64> = Interval::new(-1e-9, 1.0 + 1e-9);

/// A straight, directed road segment carrying a single lane of traffic.
#[derive(Clone, Debug)]
pub struct Road {
    /// The road ID, assigned when the network is finalized.
    id: RoadId,
    /// The start point.
    start: Point2d,
    /// The end point.
    end: Point2d,
    /// The distance between `start` and `end`.
    length: f64,
    /// A unit vector from `start` towards `end`.
    dir: Vector2d,
    /// Whether vehicles may proceed past the end of the road.
    green: bool,
    /// The roads which start where this one ends.
    children: SmallVec<[RoadId; 4]>,
    /// The roads which end where this one starts.
    parents: SmallVec<[RoadId; 4]>,
    /// The vehicles on the road, in order of arrival.
    vehicles: Vec<VehicleId>,
}

impl Road {
    /// Creates a new road, or `None` if the points coincide.
    pub fn new(start: Point2d, end: Point2d) -> Option<Self> {
        let length = start.distance(end);
        if !(length > POINT_EPSILON) {
            return None;
        }
        Some(Self {
            id: RoadId::default(),
            start,
            end,
            length,
            dir: (end - start) / length,
            green: true,
            children: SmallVec::new(),
            parents: SmallVec::new(),
            vehicles: vec![],
        })
    }

    /// Gets the road's ID.
    pub fn id(&self) -> RoadId {
        self.id
    }

    /// The start point of the road.
    pub fn start(&self) -> Point2d {
        self.start
    }

    /// The end point of the road.
    pub fn end(&self) -> Point2d {
        self.end
    }

    /// The length of the road.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The heading of the road in radians. See [crate::math::heading].
    pub fn heading(&self) -> f64 {
        heading(self.dir)
    }

    /// A unit vector pointing from the start of the road to its end.
    pub fn direction(&self) -> Vector2d {
        self.dir
    }

    /// Whether the signal at the end of the road allows vehicles to proceed.
    pub fn is_green(&self) -> bool {
        self.green
    }

    /// The roads which start where this one ends.
    pub fn children(&self) -> &[RoadId] {
        &self.children
    }

    /// The roads which end where this one starts.
    pub fn parents(&self) -> &[RoadId] {
        &self.parents
    }

    /// Whether vehicles can enter the network on this road.
    pub fn is_entry(&self) -> bool {
        self.parents.is_empty()
    }

    /// Whether vehicles can leave the network at the end of this road.
    pub fn is_exit(&self) -> bool {
        self.children.is_empty()
    }

    /// The vehicles currently on the road, in order of arrival.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The four corners of the road when drawn with the given width.
    pub fn outline(&self, width: f64) -> [Point2d; 4] {
        let offset = rot90(self.dir) * (0.5 * width);
        [
            self.start + offset,
            self.start - offset,
            self.end - offset,
            self.end + offset,
        ]
    }

    /// Finds the point at which this road crosses another.
    ///
    /// A point shared by the ends of both roads counts as a crossing.
    /// Parallel roads never cross, and neither does a road with itself.
    pub fn intersects(&self, other: &Road) -> Option<Point2d> {
        if self == other {
            return None;
        }
        let (t, u) = line_intersection(self.start, self.end, other.start, other.end)?;
        if ON_SEGMENT.contains(t) && ON_SEGMENT.contains(u) {
            Some(self.start + t.clamp(0.0, 1.0) * (self.end - self.start))
        } else {
            None
        }
    }

    /// Whether the point coincides with the start or end of the road.
    pub fn has_endpoint(&self, point: Point2d) -> bool {
        self.start.distance(point) <= POINT_EPSILON || self.end.distance(point) <= POINT_EPSILON
    }

    /// Shortens the road so it ends at `point`, and returns a new road
    /// covering the rest of its length before the split.
    ///
    /// Splitting at either endpoint would leave a zero-length road, and
    /// splitting beyond either end would reverse it, so both do nothing
    /// and return `None`.
    pub fn split(&mut self, point: Point2d) -> Option<Road> {
        let along = (point - self.start).dot(self.dir);
        if self.has_endpoint(point) || !(along > 0.0 && along < self.length) {
            return None;
        }
        let tail = Road::new(point, self.end)?;
        self.end = point;
        self.length = self.start.distance(point);
        Some(tail)
    }

    /// Finds the vehicles too close to the start of the road to let another one in.
    pub fn vehicles_near_start<'a>(
        &'a self,
        vehicles: &'a VehicleSet,
    ) -> impl Iterator<Item = VehicleId> + 'a {
        self.vehicles
            .iter()
            .copied()
            .filter(move |id| vehicles[*id].position().distance(self.start) < CLEARANCE)
    }

    /// Whether a vehicle is too close to the start of the road to let another one in.
    pub fn is_full(&self, vehicles: &VehicleSet) -> bool {
        self.vehicles_near_start(vehicles).next().is_some()
    }

    /// Whether `other` drives the same stretch of tarmac in the opposite direction.
    pub(crate) fn is_reverse_of(&self, other: &Road) -> bool {
        self.start == other.end && self.end == other.start
    }

    pub(crate) fn set_id(&mut self, id: RoadId) {
        self.id = id;
    }

    pub(crate) fn set_green(&mut self, green: bool) {
        self.green = green;
    }

    /// Adds a successor road.
    pub(crate) fn add_child(&mut self, road_id: RoadId) {
        self.children.push(road_id);
    }

    /// Adds a predecessor road.
    pub(crate) fn add_parent(&mut self, road_id: RoadId) {
        self.parents.push(road_id);
    }

    /// Appends a vehicle to the road, making it the most recent arrival.
    pub(crate) fn insert_vehicle(&mut self, id: VehicleId) {
        self.vehicles.push(id);
    }

    /// Removes the vehicle with the given ID from the road.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(idx) = self.vehicles.iter().rposition(|v| *v == id) {
            self.vehicles.remove(idx);
        }
    }
}

impl PartialEq for Road {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

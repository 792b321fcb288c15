use self::acceleration::{AccelerationModel, ModelParams};
use crate::debug::debug_point;
use crate::emissions::{DrivingMode, Pollutant};
use crate::error::SimulationError;
use crate::math::{heading, Point2d, Vector2d};
use crate::{RoadId, RoadSet, VehicleId, VehicleSet};
use cgmath::prelude::*;
use smallvec::SmallVec;
use std::cell::Cell;

mod acceleration;

/// A vehicle yields to traffic on a green entry road closer than this to its end, in units.
const YIELD_DISTANCE: f64 = 80.0;

/// An RGB display color.
pub type Color = [u8; 3];

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The acceleration model
    acc: AccelerationModel,
    /// The velocity in units/s.
    vel: f64,
    /// The acceleration applied in the last integration, in units/s<sup>2</sup>.
    applied_acc: f64,
    /// The vehicle's route, from its entry road to its exit road.
    route: SmallVec<[RoadId; 8]>,
    /// The index into `route` of the road the vehicle is on.
    index: usize,
    /// The distance travelled along the current road.
    pos: f64,
    /// The fraction of the current road travelled, from 0 at its start to 1 at its end.
    progress: f64,
    /// The world space coordinates of the vehicle.
    world_pos: Point2d,
    /// A world space unit vector along the vehicle's heading.
    world_dir: Vector2d,
    /// The display color.
    color: Color,
    /// The nearest vehicle ahead along the route, as of the last update.
    leader: Cell<Option<VehicleId>>,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleAttributes {
    /// The desired speed, in units/s.
    pub max_speed: f64,
    /// The maximum acceleration, in units/s<sup>2</sup>.
    pub max_acc: f64,
    /// The comfortable deceleration, a positive number in units/s<sup>2</sup>.
    pub max_brake: f64,
    /// The desired time gap to the vehicle ahead, in seconds.
    pub reaction_time: f64,
    /// The exponent of the free road acceleration term.
    pub delta: f64,
    /// The distance to an obstacle at which the vehicle stops dead, in units.
    pub min_gap: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            max_acc: 0.73 * 4.0,
            max_brake: 1.67 * 4.0,
            reaction_time: 1.6,
            delta: 4.0,
            min_gap: 45.0,
        }
    }
}

impl VehicleAttributes {
    /// Checks that every attribute is positive and finite.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let fields = [
            ("max_speed", self.max_speed),
            ("max_acc", self.max_acc),
            ("max_brake", self.max_brake),
            ("reaction_time", self.reaction_time),
            ("delta", self.delta),
            ("min_gap", self.min_gap),
        ];
        match fields.iter().find(|(_, value)| !(value.is_finite() && *value > 0.0)) {
            Some((name, value)) => Err(SimulationError::Config(format!(
                "vehicle {} must be positive, got {}",
                name, value
            ))),
            None => Ok(()),
        }
    }
}

/// What happened to a vehicle when it was advanced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The vehicle is still on the same road.
    Stayed,
    /// The vehicle left one road for the next on its route.
    Entered { from: RoadId, to: RoadId },
    /// The vehicle drove off the end of its route.
    Completed { from: RoadId },
}

/// The nearest vehicle ahead of another along its route.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Leader {
    pub id: VehicleId,
    /// The distance along the route to the leader.
    pub dist: f64,
    /// The leader's velocity.
    pub vel: f64,
}

impl Vehicle {
    /// Creates a new vehicle. It isn't on any road until [Vehicle::set_location] is called.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes, color: Color) -> Self {
        Self {
            id,
            acc: AccelerationModel::new(&ModelParams {
                max_velocity: attributes.max_speed,
                max_acceleration: attributes.max_acc,
                max_braking: attributes.max_brake,
                reaction_time: attributes.reaction_time,
                delta: attributes.delta,
                min_gap: attributes.min_gap,
            }),
            vel: 0.0,
            applied_acc: 0.0,
            route: SmallVec::new(),
            index: 0,
            pos: 0.0,
            progress: 0.0,
            world_pos: Point2d::new(0.0, 0.0),
            world_dir: Vector2d::new(1.0, 0.0),
            color,
            leader: Cell::new(None),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The ID of the road the vehicle is currently travelling on.
    pub fn road_id(&self) -> RoadId {
        self.route[self.index]
    }

    /// The vehicle's route, from its entry road to its exit road.
    pub fn route(&self) -> &[RoadId] {
        &self.route
    }

    /// The index into [Vehicle::route] of the road the vehicle is on.
    pub fn route_index(&self) -> usize {
        self.index
    }

    /// The distance travelled along the current road.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The fraction of the current road travelled.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The coordinates in world space of the vehicle.
    pub fn position(&self) -> Point2d {
        self.world_pos
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        self.world_dir
    }

    /// The vehicle's heading in radians. See [crate::math::heading].
    pub fn heading(&self) -> f64 {
        heading(self.world_dir)
    }

    /// The vehicle's velocity in units/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The vehicle's desired velocity in units/s.
    pub fn max_vel(&self) -> f64 {
        self.acc.max_vel()
    }

    /// The acceleration applied to the vehicle in the last step, in units/s<sup>2</sup>.
    pub fn acc(&self) -> f64 {
        self.applied_acc
    }

    /// The vehicle's display color.
    pub fn color(&self) -> Color {
        self.color
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }

    /// What the vehicle is doing, for the purposes of its emissions.
    pub fn driving_mode(&self) -> DrivingMode {
        DrivingMode::classify(self.vel, self.applied_acc)
    }

    /// The rate at which the vehicle is emitting the given pollutant, in mg/s.
    pub fn emission_rate(&self, pollutant: Pollutant) -> f64 {
        pollutant.rates().rate(self.driving_mode())
    }

    /// The vehicle's leader as of the last update, which may since have left the simulation.
    pub(crate) fn cached_leader(&self) -> Option<VehicleId> {
        self.leader.get()
    }

    /// Sets the desired velocity of the vehicle.
    pub(crate) fn set_max_vel(&mut self, max_vel: f64) {
        self.acc.set_max_vel(max_vel);
        self.vel = f64::min(self.vel, max_vel);
    }

    /// Places the vehicle `pos` along the first road of `route`, travelling at `vel`.
    pub(crate) fn set_location(&mut self, route: &[RoadId], pos: f64, vel: f64, roads: &RoadSet) {
        self.route = route.iter().copied().collect();
        self.index = 0;
        self.pos = pos;
        self.vel = vel.clamp(0.0, self.acc.max_vel());
        self.applied_acc = 0.0;
        self.leader.set(None);
        self.update_coords(roads);
    }

    /// Recomputes the vehicle's world coordinates and progress from its position along its road.
    fn update_coords(&mut self, roads: &RoadSet) {
        let road = &roads[self.road_id()];
        self.progress = self.pos / road.length();
        self.world_pos = road.start() + self.pos * road.direction();
        self.world_dir = road.direction();
    }

    /// Finds the nearest vehicle ahead along the vehicle's route.
    ///
    /// On the current road, that is the closest vehicle further along it,
    /// with ties going to the earlier arrival. Failing that, it is the vehicle
    /// closest to the start of the first later road on the route which has any.
    pub(crate) fn find_leader(&self, roads: &RoadSet, vehicles: &VehicleSet) -> Option<Leader> {
        let road = &roads[self.road_id()];
        let my_idx = road.vehicles().iter().position(|id| *id == self.id);

        let same_road = road
            .vehicles()
            .iter()
            .enumerate()
            .filter(|(idx, id)| {
                let pos = vehicles[**id].pos;
                **id != self.id && (pos > self.pos || (pos == self.pos && Some(*idx) < my_idx))
            })
            .map(|(_, id)| &vehicles[*id])
            .min_by(|a, b| a.pos.total_cmp(&b.pos));
        if let Some(leader) = same_road {
            return Some(Leader {
                id: leader.id,
                dist: leader.pos - self.pos,
                vel: leader.vel,
            });
        }

        let mut dist = road.length() - self.pos;
        for road_id in &self.route[self.index + 1..] {
            let road = &roads[*road_id];
            let nearest = road
                .vehicles()
                .iter()
                .map(|id| &vehicles[*id])
                .min_by(|a, b| a.pos.total_cmp(&b.pos));
            if let Some(leader) = nearest {
                return Some(Leader {
                    id: leader.id,
                    dist: dist + leader.pos,
                    vel: leader.vel,
                });
            }
            dist += road.length();
        }
        None
    }

    /// Determines whether the vehicle must stop at the end of its current road.
    ///
    /// It must if the light is red, if the next road on its route is full
    /// of vehicles other than its leader, or if it is about to merge into the
    /// path of traffic coming off a green entry road.
    pub(crate) fn must_wait(
        &self,
        roads: &RoadSet,
        vehicles: &VehicleSet,
        leader: Option<VehicleId>,
    ) -> bool {
        let road = &roads[self.road_id()];
        if !road.is_green() {
            return true;
        }
        let Some(next_id) = self.route.get(self.index + 1) else {
            return false;
        };
        let next = &roads[*next_id];

        if next
            .vehicles_near_start(vehicles)
            .any(|id| id != self.id && Some(id) != leader)
        {
            return true;
        }

        // Traffic let through by the lights has right of way over traffic already in the junction
        !road.is_entry()
            && next
                .parents()
                .iter()
                .filter(|id| **id != road.id())
                .map(|id| &roads[*id])
                .filter(|parent| parent.is_entry() && parent.is_green())
                .any(|parent| {
                    parent.vehicles().iter().any(|id| {
                        vehicles[*id].position().distance(parent.end()) < YIELD_DISTANCE
                    })
                })
    }

    /// Computes the vehicle's acceleration for the coming step from the current
    /// state of the network. Nothing is moved until [Vehicle::integrate].
    pub(crate) fn update_acceleration(&self, roads: &RoadSet, vehicles: &VehicleSet) {
        self.acc.reset(self.vel);

        let leader = self.find_leader(roads, vehicles);
        self.leader.set(leader.map(|l| l.id));
        if let Some(leader) = leader {
            self.acc.follow_vehicle(leader.dist, self.vel, leader.vel);
        }

        if self.must_wait(roads, vehicles, leader.map(|l| l.id)) {
            let road = &roads[self.road_id()];
            self.acc.stop_at_line(road.length() - self.pos, self.vel);
            debug_point("stop line", road.end());
        }
    }

    /// Integrates the vehicle's velocity and position.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64) {
        let (vel, acc) = self.acc.integrate(self.vel, dt);
        self.vel = vel;
        self.applied_acc = acc;
        self.pos += vel * dt;
    }

    /// Updates the vehicle's coordinates after integrating, moving it onto the
    /// start of the next road on its route once it passes the end of the current one.
    ///
    /// # Panics
    /// If the vehicle has already completed its route.
    pub(crate) fn advance(&mut self, roads: &RoadSet) -> Advance {
        assert!(
            self.index < self.route.len(),
            "advanced a vehicle which has completed its route"
        );
        let from = self.road_id();
        let length = roads[from].length();
        if self.pos / length <= 1.0 {
            self.update_coords(roads);
            return Advance::Stayed;
        }

        self.index += 1;
        match self.route.get(self.index) {
            Some(to) => {
                let to = *to;
                self.pos = 0.0;
                self.update_coords(roads);
                Advance::Entered { from, to }
            }
            None => {
                self.progress = 1.0;
                self.world_pos = roads[from].end();
                Advance::Completed { from }
            }
        }
    }
}

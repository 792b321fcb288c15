use crate::config::SimulationConfig;
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::debug::debug_line;
use crate::emissions::{EmissionGrid, Pollutant};
use crate::error::{NetworkError, SimulationError};
use crate::light::{LightState, TrafficLight, CLEARANCE_SECS};
use crate::math::Point2d;
use crate::network::{junction_layout, Network, RouteKind};
use crate::road::Road;
use crate::vehicle::{Advance, Color, Vehicle};
use crate::{RoadId, VehicleId, VehicleSet};
use arrayvec::ArrayVec;
use log::{debug, info, trace};
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;
use smallvec::SmallVec;

/// The side length of the square that [Simulation::junction] is laid out in.
const JUNCTION_SIZE: f64 = 500.0;

/// The distance of each lane of [Simulation::junction] from the centre line of its road.
const LANE_OFFSET: f64 = 20.0;

/// The range of factors applied to the desired speed by [Simulation::randomise_max_speeds].
const SPEED_FACTOR_RANGE: (f64, f64) = (0.75, 1.25);

/// A traffic simulation of a signalised road network,
/// tracking the emissions of the vehicles driving through it.
#[derive(Clone)]
pub struct Simulation {
    /// The simulation parameters.
    config: SimulationConfig,
    /// The road network.
    network: Network,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The traffic lights at the ends of the entry roads.
    light: TrafficLight,
    /// The emissions accumulated for each tracked pollutant.
    emissions: Vec<(Pollutant, EmissionGrid)>,
    /// The source of randomness for spawning vehicles.
    rng: StdRng,
    /// The current frame of simulation.
    frame: usize,
    /// The number of vehicles added so far.
    spawned: usize,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a new simulation of the network formed by the given road segments.
    pub fn new(
        config: SimulationConfig,
        segments: &[(Point2d, Point2d)],
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let network = Network::build(segments)?;
        Self::with_network(config, network)
    }

    /// Creates a new simulation of the canonical four-way junction. See [junction_layout].
    pub fn junction(config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::new(config, &junction_layout(JUNCTION_SIZE, LANE_OFFSET))
    }

    /// Creates a new simulation of a network which has already been built.
    pub fn with_network(config: SimulationConfig, network: Network) -> Result<Self, SimulationError> {
        config.validate()?;
        if network.paths().is_empty() {
            return Err(NetworkError::NoPaths.into());
        }

        let light = TrafficLight::new(network.signal_phases(), config.light_duration, config.fps);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let grid = &config.grid;
        let emissions = config
            .pollutants
            .iter()
            .map(|p| (*p, EmissionGrid::new(grid.width, grid.height, grid.cell_size, grid.radius)))
            .collect();

        info!(
            "Created simulation with {} signal phases of {}s",
            light.phases().len(),
            config.light_duration
        );

        let mut sim = Self {
            config,
            network,
            vehicles: VehicleSet::with_key(),
            light,
            emissions,
            rng,
            frame: 0,
            spawned: 0,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        };
        sim.update_lights();
        Ok(sim)
    }

    /// Advances the simulation by one frame.
    pub fn tick(&mut self) {
        self.update_lights();
        self.apply_accelerations();
        self.integrate();
        self.advance_vehicles();
        self.spawn_vehicles();
        self.light.step();
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The simulated time elapsed in seconds.
    pub fn time(&self) -> f64 {
        self.frame as f64 * self.config.dt()
    }

    /// The length of a frame in seconds.
    pub fn dt(&self) -> f64 {
        self.config.dt()
    }

    /// The simulation parameters.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The road network.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The traffic lights.
    pub fn light(&self) -> &TrafficLight {
        &self.light
    }

    /// Returns an iterator over all the roads in the simulation.
    pub fn iter_roads(&self) -> impl Iterator<Item = &Road> {
        self.network.iter_roads()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it's still in the simulation.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Gets a reference to the road with the given ID.
    pub fn get_road(&self, road_id: RoadId) -> &Road {
        self.network.road(road_id)
    }

    /// The number of vehicles in the simulation.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// The number of vehicles added to the simulation so far, including those that have left.
    pub fn vehicles_spawned(&self) -> usize {
        self.spawned
    }

    /// The total mass of a pollutant emitted so far in mg, if it's being tracked.
    pub fn emission_total(&self, pollutant: Pollutant) -> Option<f64> {
        self.emission_grid(pollutant).map(|grid| grid.total())
    }

    /// The emissions grid of a pollutant, if it's being tracked.
    pub fn emission_grid(&self, pollutant: Pollutant) -> Option<&EmissionGrid> {
        self.emissions
            .iter()
            .find(|(p, _)| *p == pollutant)
            .map(|(_, grid)| grid)
    }

    /// The total mass emitted so far of each tracked pollutant, in mg.
    pub fn emission_totals(&self) -> impl Iterator<Item = (Pollutant, f64)> + '_ {
        self.emissions.iter().map(|(p, grid)| (*p, grid.total()))
    }

    /// Gets the vehicle ahead of the given one, if it's still ahead of it on its route.
    pub fn leader_of(&self, vehicle_id: VehicleId) -> Option<VehicleId> {
        let vehicle = self.vehicles.get(vehicle_id)?;
        let leader_id = vehicle.cached_leader()?;
        let leader = self.vehicles.get(leader_id)?;
        vehicle.route()[vehicle.route_index()..]
            .contains(&leader.road_id())
            .then_some(leader_id)
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Changes the length of each signal phase.
    pub fn set_light_duration(&mut self, light_duration: f64) -> Result<(), SimulationError> {
        let mut config = self.config.clone();
        config.light_duration = light_duration;
        config.validate()?;
        self.config = config;
        self.light.set_duration(light_duration, self.config.fps);
        debug!("Light duration set to {}s (clearance {}s)", light_duration, CLEARANCE_SECS);
        Ok(())
    }

    /// Changes the chance of trying to spawn a vehicle each frame, as a percentage.
    pub fn set_car_gen_prob(&mut self, car_gen_prob: f64) -> Result<(), SimulationError> {
        let mut config = self.config.clone();
        config.car_gen_prob = car_gen_prob;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Tries to add a vehicle at the start of a randomly chosen path.
    ///
    /// A [RouteKind] is picked according to [RouteKind::spawn_weight], then a path
    /// of that kind is picked uniformly. Returns `None` without adding a vehicle
    /// if the first road of the path is full.
    pub fn spawn_vehicle(&mut self) -> Option<VehicleId> {
        let kinds = RouteKind::ALL
            .into_iter()
            .filter(|kind| self.network.paths_in(*kind).next().is_some())
            .collect::<ArrayVec<RouteKind, 4>>();
        let weights = WeightedIndex::new(kinds.iter().map(|kind| kind.spawn_weight())).ok()?;
        let kind = kinds[weights.sample(&mut self.rng)];

        let candidates = self
            .network
            .paths_in(kind)
            .map(|(idx, _)| idx)
            .collect::<SmallVec<[usize; 8]>>();
        let path = &self.network.paths()[*candidates.choose(&mut self.rng)?];

        if self.network.road(path.entry()).is_full(&self.vehicles) {
            trace!("Spawn refused: road {:?} is full", path.entry());
            return None;
        }
        let route = path.roads().iter().copied().collect::<SmallVec<[RoadId; 8]>>();
        Some(self.insert_vehicle(&route, 0.0, self.config.vehicle.max_speed))
    }

    /// Adds a vehicle at the start of the given route, travelling at its desired speed.
    /// Unlike [Simulation::spawn_vehicle], this doesn't check whether the first road is full.
    pub fn add_vehicle(&mut self, route: &[RoadId]) -> Result<VehicleId, SimulationError> {
        self.add_vehicle_at(route, 0.0, self.config.vehicle.max_speed)
    }

    /// Adds a vehicle `pos` along the first road of the given route, travelling at `vel`.
    pub fn add_vehicle_at(
        &mut self,
        route: &[RoadId],
        pos: f64,
        vel: f64,
    ) -> Result<VehicleId, SimulationError> {
        self.check_route(route)?;
        let length = self.network.road(route[0]).length();
        if !(0.0..=length).contains(&pos) {
            return Err(SimulationError::OffRoad { pos, length });
        }
        Ok(self.insert_vehicle(route, pos, vel))
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, vehicle_id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(vehicle_id) {
            self.network.roads_mut()[vehicle.road_id()].remove_vehicle(vehicle_id);
        }
    }

    /// Randomly scales the desired speed of each vehicle by a factor sampled
    /// from a normal distribution with a mean of 1 and standard deviation of `stddev`.
    pub fn randomise_max_speeds(&mut self, stddev: f64) -> Result<(), SimulationError> {
        if !(stddev >= 0.0 && stddev.is_finite()) {
            return Err(SimulationError::Config(format!(
                "speed deviation must be a non-negative number, got {}",
                stddev
            )));
        }
        let distr = rand_distr::Normal::new(1.0, stddev).map_err(|err| {
            SimulationError::Config(format!("invalid speed deviation {}: {}", stddev, err))
        })?;
        let (min, max) = SPEED_FACTOR_RANGE;
        for vehicle in self.vehicles.values_mut() {
            let factor = distr.sample(&mut self.rng).clamp(min, max);
            vehicle.set_max_vel(self.config.vehicle.max_speed * factor);
        }
        Ok(())
    }

    /// Checks that a route is a non-empty chain of connected roads in the network.
    fn check_route(&self, route: &[RoadId]) -> Result<(), SimulationError> {
        if route.is_empty() {
            return Err(SimulationError::EmptyRoute);
        }
        if let Some(id) = route.iter().find(|id| self.network.get_road(**id).is_none()) {
            return Err(SimulationError::UnknownRoad(*id));
        }
        match route
            .windows(2)
            .position(|pair| !self.network.is_adjacent(pair[0], pair[1]))
        {
            Some(idx) => Err(SimulationError::DisjointRoute { index: idx + 1 }),
            None => Ok(()),
        }
    }

    /// Adds a vehicle to a route which is known to be valid.
    fn insert_vehicle(&mut self, route: &[RoadId], pos: f64, vel: f64) -> VehicleId {
        let attributes = self.config.vehicle;
        let color: Color = [self.rng.gen(), self.rng.gen(), self.rng.gen()];
        let roads = self.network.roads();
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            let mut vehicle = Vehicle::new(id, &attributes, color);
            vehicle.set_location(route, pos, vel, roads);
            vehicle
        });
        self.network.roads_mut()[route[0]].insert_vehicle(vehicle_id);
        self.spawned += 1;
        trace!("Spawned vehicle {:?} on road {:?}", vehicle_id, route[0]);
        vehicle_id
    }

    /// Shows the current signal phase on the roads.
    fn update_lights(&mut self) {
        let roads = self.network.roads_mut();
        for (road_id, state) in self.light.get_states() {
            roads[road_id].set_green(state == LightState::Green);
        }
    }

    /// Calculates the accelerations of the vehicles from the state at the start of the frame.
    fn apply_accelerations(&mut self) {
        let roads = self.network.roads();
        for vehicle in self.vehicles.values() {
            vehicle.update_acceleration(roads, &self.vehicles);
            if let Some(leader) = vehicle.cached_leader() {
                debug_line("leader", vehicle.position(), self.vehicles[leader].position());
            }
        }
    }

    /// Integrates the velocities and positions of all vehicles.
    fn integrate(&mut self) {
        let dt = self.config.dt();
        for vehicle in self.vehicles.values_mut() {
            vehicle.integrate(dt);
        }
    }

    /// Moves vehicles which have passed the end of their road onto their next road,
    /// removes those which have completed their route, and records everyone's emissions.
    fn advance_vehicles(&mut self) {
        let dt = self.config.dt();
        let mut entered = vec![];
        let mut completed = vec![];

        for (vehicle_id, vehicle) in &mut self.vehicles {
            match vehicle.advance(self.network.roads()) {
                Advance::Stayed => {}
                Advance::Entered { from, to } => entered.push((vehicle_id, from, to)),
                Advance::Completed { from } => completed.push((vehicle_id, from)),
            }
            for (pollutant, grid) in &mut self.emissions {
                grid.deposit(vehicle.position(), vehicle.emission_rate(*pollutant) * dt);
            }
        }

        let roads = self.network.roads_mut();
        for (vehicle_id, from, to) in entered {
            roads[from].remove_vehicle(vehicle_id);
            roads[to].insert_vehicle(vehicle_id);
        }
        for (vehicle_id, from) in completed {
            roads[from].remove_vehicle(vehicle_id);
            self.vehicles.remove(vehicle_id);
            trace!("Vehicle {:?} completed its route", vehicle_id);
        }
    }

    /// Rolls for a new vehicle.
    fn spawn_vehicles(&mut self) {
        if self.rng.gen::<f64>() * 100.0 < self.config.car_gen_prob {
            self.spawn_vehicle();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::emissions::DrivingMode;
    use assert_approx_eq::assert_approx_eq;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            car_gen_prob: 0.0,
            seed: Some(1),
            ..Default::default()
        }
    }

    fn single_road() -> Simulation {
        let segment = (Point2d::new(0.0, 0.0), Point2d::new(300.0, 0.0));
        Simulation::new(quiet_config(), &[segment]).unwrap()
    }

    #[test]
    fn junction_lights_start_on_first_phase() {
        let sim = Simulation::junction(quiet_config()).unwrap();
        assert_eq!(sim.iter_roads().count(), 12);
        let entries = sim.network().entries();
        let green = entries.iter().filter(|id| sim.get_road(**id).is_green()).count();
        assert_eq!(green, 2);
        assert!(sim
            .iter_roads()
            .filter(|road| !road.is_entry())
            .all(|road| road.is_green()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            fps: 0,
            ..Default::default()
        };
        assert!(matches!(
            Simulation::junction(config),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn routes_are_checked() {
        let mut sim = Simulation::junction(quiet_config()).unwrap();
        assert_eq!(sim.add_vehicle(&[]), Err(SimulationError::EmptyRoute));

        let path = sim.network().paths().last().unwrap().roads().to_vec();
        let mut disjoint = path.clone();
        disjoint.swap(1, 2);
        assert_eq!(
            sim.add_vehicle(&disjoint),
            Err(SimulationError::DisjointRoute { index: 1 })
        );

        let length = sim.get_road(path[0]).length();
        assert!(matches!(
            sim.add_vehicle_at(&path, length + 1.0, 0.0),
            Err(SimulationError::OffRoad { .. })
        ));

        let id = sim.add_vehicle(&path).unwrap();
        assert_eq!(sim.get_vehicle(id).unwrap().route(), &path[..]);
        assert_approx_eq!(sim.get_vehicle(id).unwrap().vel(), 50.0);
        assert_eq!(sim.vehicles_spawned(), 1);
    }

    #[test]
    fn spawn_is_refused_on_full_road() {
        let mut sim = single_road();
        let route = sim.network().paths()[0].roads().to_vec();
        sim.add_vehicle_at(&route, 10.0, 0.0).unwrap();
        assert_eq!(sim.spawn_vehicle(), None);
        assert_eq!(sim.vehicle_count(), 1);

        let id = sim.iter_vehicles().next().unwrap().id();
        sim.remove_vehicle(id);
        assert!(sim.get_road(route[0]).vehicles().is_empty());
        assert!(sim.spawn_vehicle().is_some());
        assert_eq!(sim.vehicles_spawned(), 2);
    }

    /// Spawns `n` vehicles one at a time, removing each straight away so that
    /// no entry fills up, and counts the kinds of route they were given.
    fn count_spawned_kinds(sim: &mut Simulation, n: usize) -> [usize; 4] {
        let mut counts = [0; 4];
        for _ in 0..n {
            let id = sim.spawn_vehicle().unwrap();
            let route = sim.get_vehicle(id).unwrap().route().to_vec();
            let path = sim
                .network()
                .paths()
                .iter()
                .find(|path| path.roads() == &route[..])
                .unwrap();
            let idx = RouteKind::ALL.iter().position(|kind| *kind == path.kind()).unwrap();
            counts[idx] += 1;
            sim.remove_vehicle(id);
        }
        counts
    }

    #[test]
    fn spawned_routes_follow_kind_weights() {
        let mut sim = Simulation::junction(quiet_config()).unwrap();
        let n = 20_000;
        let counts = count_spawned_kinds(&mut sim, n);
        for (kind, count) in RouteKind::ALL.into_iter().zip(counts) {
            assert_approx_eq!(count as f64 / n as f64, kind.spawn_weight(), 0.02);
        }
        assert_eq!(sim.vehicles_spawned(), n);
    }

    #[test]
    fn spawn_weights_cover_only_present_kinds() {
        let p = Point2d::new;
        let segments = [
            (p(0.0, 250.0), p(500.0, 250.0)),
            (p(500.0, 250.0), p(0.0, 250.0)),
            (p(250.0, 0.0), p(250.0, 500.0)),
            (p(250.0, 500.0), p(250.0, 0.0)),
        ];
        let mut sim = Simulation::new(quiet_config(), &segments).unwrap();
        assert_eq!(sim.network().paths_in(RouteKind::UTurn).count(), 0);

        let n = 6000;
        let counts = count_spawned_kinds(&mut sim, n);
        assert_eq!(counts[3], 0);
        for count in &counts[..3] {
            assert_approx_eq!(*count as f64 / n as f64, 1.0 / 3.0, 0.03);
        }
    }

    #[test]
    fn completed_vehicles_are_removed() {
        let mut sim = single_road();
        let route = sim.network().paths()[0].roads().to_vec();
        let id = sim.add_vehicle_at(&route, 299.0, 50.0).unwrap();
        sim.tick();
        assert!(sim.get_vehicle(id).is_none());
        assert!(sim.get_road(route[0]).vehicles().is_empty());
        assert!(sim.emission_total(Pollutant::CO2).unwrap() > 0.0);
    }

    #[test]
    fn leader_is_forgotten_when_removed() {
        let mut sim = single_road();
        let route = sim.network().paths()[0].roads().to_vec();
        let front = sim.add_vehicle_at(&route, 200.0, 10.0).unwrap();
        let back = sim.add_vehicle_at(&route, 50.0, 10.0).unwrap();
        sim.tick();
        assert_eq!(sim.leader_of(back), Some(front));
        assert_eq!(sim.leader_of(front), None);

        sim.remove_vehicle(front);
        assert_eq!(sim.leader_of(back), None);
    }

    #[test]
    fn emissions_follow_driving_mode() {
        let mut sim = single_road();
        let route = sim.network().paths()[0].roads().to_vec();
        let id = sim.add_vehicle_at(&route, 0.0, 0.0).unwrap();
        sim.tick();
        assert_eq!(sim.get_vehicle(id).unwrap().driving_mode(), DrivingMode::Idle);
        assert_approx_eq!(sim.emission_total(Pollutant::CO2).unwrap(), 1.7 * sim.dt());
        assert_eq!(sim.emission_total(Pollutant::NOx), None);
    }

    #[test]
    fn max_speeds_are_randomised_within_bounds() {
        let mut sim = single_road();
        let route = sim.network().paths()[0].roads().to_vec();
        for pos in [0.0, 100.0, 200.0] {
            sim.add_vehicle_at(&route, pos, 50.0).unwrap();
        }
        sim.randomise_max_speeds(0.5).unwrap();
        for vehicle in sim.iter_vehicles() {
            assert!(vehicle.max_vel() >= 37.5 && vehicle.max_vel() <= 62.5);
            assert!(vehicle.vel() <= vehicle.max_vel());
        }
        assert!(sim.randomise_max_speeds(-1.0).is_err());
    }

    #[test]
    fn settings_are_validated() {
        let mut sim = single_road();
        assert!(sim.set_light_duration(3.0).is_err());
        assert!(sim.set_light_duration(20.0).is_ok());
        assert_approx_eq!(sim.config().light_duration, 20.0);
        assert!(sim.set_car_gen_prob(150.0).is_err());
        assert!(sim.set_car_gen_prob(50.0).is_ok());
    }
}

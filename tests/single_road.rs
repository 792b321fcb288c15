//! Tests that involve the simulation of vehicles on a single road.

use traffic_emissions::{math::Point2d, RoadId, Simulation, SimulationConfig};

/// A configuration which never spawns vehicles and keeps the first phase green for a long time.
fn config() -> SimulationConfig {
    SimulationConfig {
        light_duration: 1000.0,
        car_gen_prob: 0.0,
        seed: Some(7),
        ..Default::default()
    }
}

fn road_sim(length: f64) -> (Simulation, Vec<RoadId>) {
    let segment = (Point2d::new(0.0, 0.0), Point2d::new(length, 0.0));
    let sim = Simulation::new(config(), &[segment]).unwrap();
    let route = sim.network().paths()[0].roads().to_vec();
    (sim, route)
}

/// Test that a vehicle pulling away from rest moves forward every frame.
#[test]
fn vehicle_drives_forward() {
    let (mut sim, route) = road_sim(300.0);
    let veh = sim.add_vehicle_at(&route, 0.0, 0.0).unwrap();
    assert_eq!(sim.dt(), 1.0 / 30.0);

    let mut pos = sim.get_vehicle(veh).unwrap().pos();
    for _ in 0..30 {
        sim.tick();
        let next_pos = sim.get_vehicle(veh).unwrap().pos();
        assert!(next_pos > pos);
        pos = next_pos;
    }
    let vel = sim.get_vehicle(veh).unwrap().vel();
    assert!(vel > 0.0 && vel < 50.0);
}

/// Test that a vehicle on an open road approaches its desired speed.
#[test]
fn vehicle_approaches_max_speed() {
    let (mut sim, route) = road_sim(100_000.0);
    let veh = sim.add_vehicle_at(&route, 0.0, 0.0).unwrap();

    let mut vel = 0.0;
    for _ in 0..(60 * 30) {
        sim.tick();
        let next_vel = sim.get_vehicle(veh).unwrap().vel();
        assert!(next_vel >= vel && next_vel <= 50.0);
        vel = next_vel;
    }
    assert!(vel > 49.5);
}

/// Test that a vehicle too close to the one ahead stops immediately.
#[test]
fn vehicle_stops_behind_close_leader() {
    let (mut sim, route) = road_sim(300.0);
    let leader = sim.add_vehicle_at(&route, 100.0, 0.0).unwrap();
    let follower = sim.add_vehicle_at(&route, 70.0, 20.0).unwrap();

    sim.tick();
    assert_eq!(sim.get_vehicle(follower).unwrap().vel(), 0.0);
    assert_eq!(sim.get_vehicle(follower).unwrap().acc(), 0.0);
    assert_eq!(sim.leader_of(follower), Some(leader));
}

/// Test that a vehicle sharing its position with an earlier arrival stops dead,
/// while the earlier arrival drives on as if it were alone.
#[test]
fn vehicle_at_zero_gap_stops_dead() {
    let (mut sim, route) = road_sim(300.0);
    let first = sim.add_vehicle_at(&route, 100.0, 20.0).unwrap();
    let second = sim.add_vehicle_at(&route, 100.0, 20.0).unwrap();

    for _ in 0..30 {
        sim.tick();
        let (a, b) = (
            sim.get_vehicle(first).unwrap(),
            sim.get_vehicle(second).unwrap(),
        );
        assert_eq!(b.vel(), 0.0);
        assert_eq!(b.acc(), 0.0);
        assert_eq!(b.pos(), 100.0);
        assert!(a.acc().is_finite() && a.acc() > 0.0);
        assert!(a.vel() > 20.0 && a.vel() <= a.max_vel());
    }
    assert_eq!(sim.leader_of(second), Some(first));
    assert_eq!(sim.leader_of(first), None);
}

/// Test that a follower never overtakes its leader.
#[test]
fn follower_keeps_its_distance() {
    let (mut sim, route) = road_sim(2000.0);
    let leader = sim.add_vehicle_at(&route, 200.0, 10.0).unwrap();
    let follower = sim.add_vehicle_at(&route, 0.0, 50.0).unwrap();

    for _ in 0..(30 * 30) {
        sim.tick();
        let (l, f) = (
            sim.get_vehicle(leader).unwrap(),
            sim.get_vehicle(follower).unwrap(),
        );
        assert!(f.pos() < l.pos());
        assert!(f.vel() >= 0.0 && f.vel() <= f.max_vel());
    }
}

/// Two parallel roads, so that one of them is always held at red.
fn red_road_sim() -> (Simulation, RoadId) {
    let sim = Simulation::new(
        config(),
        &[
            (Point2d::new(0.0, 0.0), Point2d::new(300.0, 0.0)),
            (Point2d::new(0.0, 100.0), Point2d::new(300.0, 100.0)),
        ],
    )
    .unwrap();
    let red = sim
        .network()
        .entries()
        .iter()
        .copied()
        .find(|id| !sim.get_road(*id).is_green())
        .unwrap();
    (sim, red)
}

/// Test that a vehicle close to a red light stops dead and stays stopped.
#[test]
fn vehicle_stops_at_red_light() {
    let (mut sim, red) = red_road_sim();
    let veh = sim.add_vehicle_at(&[red], 260.0, 20.0).unwrap();

    sim.tick();
    let pos = sim.get_vehicle(veh).unwrap().pos();
    assert_eq!(sim.get_vehicle(veh).unwrap().vel(), 0.0);

    for _ in 0..100 {
        sim.tick();
        assert_eq!(sim.get_vehicle(veh).unwrap().vel(), 0.0);
        assert_eq!(sim.get_vehicle(veh).unwrap().pos(), pos);
    }
}

/// Test that a vehicle approaching a red light at speed never runs it.
#[test]
fn vehicle_brakes_for_red_light() {
    let (mut sim, red) = red_road_sim();
    let veh = sim.add_vehicle_at(&[red], 0.0, 50.0).unwrap();

    for _ in 0..(40 * 30) {
        sim.tick();
        let vehicle = sim.get_vehicle(veh).unwrap();
        assert!(vehicle.pos() < 300.0);
        assert!(vehicle.vel() >= 0.0 && vehicle.vel() <= 50.0);
    }
    assert!(sim.get_vehicle(veh).unwrap().has_stopped());
}

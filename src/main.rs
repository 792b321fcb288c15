use std::time::Instant;

use traffic_emissions::{Pollutant, Simulation, SimulationConfig};

fn main() {
    let config = SimulationConfig {
        seed: Some(0),
        ..Default::default()
    };
    let dt = config.dt();
    let mut sim = match Simulation::junction(config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("Could not create simulation: {}", err);
            std::process::exit(1);
        }
    };

    println!("Simulating...");
    let num_frames = 1000;
    for _ in 0..10 {
        let start = Instant::now();
        for _ in 0..num_frames {
            sim.tick();
        }
        let frame = start.elapsed() / num_frames;
        println!(
            "Avg. frame: {:?} --> {:.0}x speedup ({} vehs, {} spawned, {:.1} mg CO2)",
            frame,
            dt / frame.as_secs_f64(),
            sim.vehicle_count(),
            sim.vehicles_spawned(),
            sim.emission_total(Pollutant::CO2).unwrap_or_default(),
        )
    }
}

use crate::emissions::Pollutant;
use crate::error::SimulationError;
use crate::light::CLEARANCE_SECS;
use crate::vehicle::VehicleAttributes;

/// The parameters of a simulation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    /// The number of frames per simulated second.
    pub fps: usize,
    /// The length of each signal phase in seconds, including the all-red clearance.
    pub light_duration: f64,
    /// The chance of trying to spawn a vehicle each frame, as a percentage.
    pub car_gen_prob: f64,
    /// The attributes given to spawned vehicles.
    pub vehicle: VehicleAttributes,
    /// The pollutants to track.
    pub pollutants: Vec<Pollutant>,
    /// The emissions grid.
    pub grid: GridConfig,
    /// The random seed, or `None` to seed from system entropy.
    pub seed: Option<u64>,
}

/// The extent and resolution of the emissions grid.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridConfig {
    pub width: f64,
    pub height: f64,
    /// The side length of a cell.
    pub cell_size: f64,
    /// How many cells away from the emitting cell a deposit spreads.
    pub radius: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            light_duration: 8.0,
            car_gen_prob: 10.0 / 9.0,
            vehicle: VehicleAttributes::default(),
            pollutants: vec![Pollutant::CO2],
            grid: GridConfig::default(),
            seed: None,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 500.0,
            cell_size: 5.0,
            radius: 3,
        }
    }
}

impl SimulationConfig {
    /// The length of a frame in seconds.
    pub fn dt(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Checks that the configuration describes a runnable simulation.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let fail = |msg: String| -> Result<(), SimulationError> { Err(SimulationError::Config(msg)) };

        if self.fps == 0 {
            return fail("fps must be at least 1".into());
        }
        if !self.light_duration.is_finite() || self.light_duration <= CLEARANCE_SECS {
            return fail(format!(
                "light duration must be longer than the {}s clearance, got {}",
                CLEARANCE_SECS, self.light_duration
            ));
        }
        if !(0.0..=100.0).contains(&self.car_gen_prob) {
            return fail(format!(
                "car generation probability must be a percentage, got {}",
                self.car_gen_prob
            ));
        }
        if self.pollutants.is_empty() {
            return fail("at least one pollutant must be tracked".into());
        }
        let grid = &self.grid;
        if !(grid.cell_size > 0.0 && grid.width > 0.0 && grid.height > 0.0) {
            return fail(format!(
                "grid dimensions must be positive, got {}x{} at cell size {}",
                grid.width, grid.height, grid.cell_size
            ));
        }
        self.vehicle.validate()
    }
}

pub use cgmath;
pub use config::{GridConfig, SimulationConfig};
pub use emissions::{DrivingMode, EmissionGrid, EmissionRates, Pollutant};
pub use error::{NetworkError, SimulationError};
pub use light::{LightState, TrafficLight};
pub use network::{junction_layout, Network, Path, RouteKind};
pub use road::Road;
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{Color, Vehicle, VehicleAttributes};

mod config;
mod debug;
mod emissions;
mod error;
mod light;
pub mod math;
mod network;
mod road;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Road].
    pub struct RoadId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type RoadSet = SlotMap<RoadId, Road>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;

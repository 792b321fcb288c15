//! Error types for network construction and simulation setup.

use crate::RoadId;
use thiserror::Error;

/// Errors raised while building a road network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network contains no roads of non-zero length")]
    Empty,

    #[error("no entry road can reach an exit road")]
    NoPaths,
}

/// Errors raised while configuring a simulation or adding vehicles to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("route is empty")]
    EmptyRoute,

    #[error("road {0:?} not found in network")]
    UnknownRoad(RoadId),

    #[error("route is not contiguous: road {index} does not follow the road before it")]
    DisjointRoute { index: usize },

    #[error("position {pos} lies outside the first road of the route (length {length})")]
    OffRoad { pos: f64, length: f64 },
}

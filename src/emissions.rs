//! Tailpipe emission rates and their spatial accumulation.
//!
//! Rates are in mg/s and follow the on-road measurements of Frey et al.,
//! "On-Road Measurements of Vehicle Tailpipe Emissions".

use crate::math::Point2d;
use itertools::iproduct;
use smallvec::SmallVec;

/// Vehicles slower than this are idling, in units/s.
const IDLE_SPEED: f64 = 10.0;

/// Accelerations within this distance of zero count as cruising, in units/s<sup>2</sup>.
const CRUISE_ACC: f64 = 0.1;

/// A pollutant emitted by vehicles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pollutant {
    /// Nitrogen oxides.
    NOx,
    /// Hydrocarbons.
    HC,
    /// Carbon monoxide.
    CO,
    /// Carbon dioxide.
    CO2,
}

/// Emission rates for each [DrivingMode], in mg/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionRates {
    pub idle: f64,
    pub accel: f64,
    pub decel: f64,
    pub cruise: f64,
}

/// What a vehicle is doing, as far as its emissions are concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrivingMode {
    Idle,
    Accelerating,
    Decelerating,
    Cruising,
}

impl Pollutant {
    /// All the pollutants, in declaration order.
    pub const ALL: [Pollutant; 4] = [Self::NOx, Self::HC, Self::CO, Self::CO2];

    /// The emission rates of the pollutant.
    pub const fn rates(self) -> EmissionRates {
        let [idle, accel, decel, cruise] = match self {
            Self::NOx => [0.06, 1.4, 0.52, 1.1],
            Self::HC => [0.25, 1.0, 0.36, 0.6],
            Self::CO => [1.5, 23.0, 5.5, 11.0],
            Self::CO2 => [1.7, 6.4, 2.6, 4.1],
        };
        EmissionRates {
            idle,
            accel,
            decel,
            cruise,
        }
    }
}

impl EmissionRates {
    /// The emission rate in the given driving mode, in mg/s.
    pub fn rate(&self, mode: DrivingMode) -> f64 {
        match mode {
            DrivingMode::Idle => self.idle,
            DrivingMode::Accelerating => self.accel,
            DrivingMode::Decelerating => self.decel,
            DrivingMode::Cruising => self.cruise,
        }
    }
}

impl DrivingMode {
    /// Classifies a vehicle by its speed and acceleration.
    pub fn classify(vel: f64, acc: f64) -> Self {
        if vel < IDLE_SPEED {
            Self::Idle
        } else if acc > CRUISE_ACC {
            Self::Accelerating
        } else if acc < -CRUISE_ACC {
            Self::Decelerating
        } else {
            Self::Cruising
        }
    }
}

/// Accumulates emitted mass on a regular grid of square cells.
///
/// Each deposit is spread over the square of cells within `radius` of the
/// cell containing the emission point, weighted by `1 / (1 + d)` where `d`
/// is the Manhattan distance in cells. Weights are normalised over the cells
/// inside the grid, so no mass is ever lost off the edge.
#[derive(Clone, Debug)]
pub struct EmissionGrid {
    cols: usize,
    rows: usize,
    cell_size: f64,
    radius: usize,
    /// The mass in each cell in mg, row-major.
    cells: Vec<f64>,
    /// The running total of all deposited mass in mg.
    total: f64,
}

impl EmissionGrid {
    /// Creates an empty grid covering `width` by `height` units from the origin.
    pub fn new(width: f64, height: f64, cell_size: f64, radius: usize) -> Self {
        let cols = usize::max((width / cell_size).ceil() as usize, 1);
        let rows = usize::max((height / cell_size).ceil() as usize, 1);
        Self {
            cols,
            rows,
            cell_size,
            radius,
            cells: vec![0.0; cols * rows],
            total: 0.0,
        }
    }

    /// The number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The side length of a cell in units.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// The mass in the given cell in mg.
    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.cells[row * self.cols + col]
    }

    /// The mass in every cell in mg, row by row.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    /// The total mass deposited so far in mg.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Finds the cell containing the point, clamped to the grid.
    pub fn cell_at(&self, point: Point2d) -> (usize, usize) {
        let clamp = |x: f64, n: usize| (x / self.cell_size).floor().clamp(0.0, (n - 1) as f64) as usize;
        (clamp(point.x, self.cols), clamp(point.y, self.rows))
    }

    /// Spreads `mass` mg around the given point.
    pub fn deposit(&mut self, point: Point2d, mass: f64) {
        if !(mass > 0.0) || !mass.is_finite() {
            return;
        }

        let (col, row) = self.cell_at(point);
        let r = self.radius as isize;
        let cells = iproduct!(-r..=r, -r..=r)
            .filter_map(|(dy, dx)| {
                let x = usize::try_from(col as isize + dx).ok().filter(|x| *x < self.cols)?;
                let y = usize::try_from(row as isize + dy).ok().filter(|y| *y < self.rows)?;
                let weight = 1.0 / (1 + dx.unsigned_abs() + dy.unsigned_abs()) as f64;
                Some((y * self.cols + x, weight))
            })
            .collect::<SmallVec<[_; 64]>>();

        let norm: f64 = cells.iter().map(|(_, w)| w).sum();
        for (idx, weight) in cells {
            self.cells[idx] += mass * weight / norm;
        }
        self.total += mass;
    }

    /// Empties the grid.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0.0);
        self.total = 0.0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn classification() {
        assert_eq!(DrivingMode::classify(0.0, 2.0), DrivingMode::Idle);
        assert_eq!(DrivingMode::classify(9.9, -3.0), DrivingMode::Idle);
        assert_eq!(DrivingMode::classify(30.0, 0.5), DrivingMode::Accelerating);
        assert_eq!(DrivingMode::classify(30.0, -0.5), DrivingMode::Decelerating);
        assert_eq!(DrivingMode::classify(30.0, 0.0), DrivingMode::Cruising);
        assert_eq!(DrivingMode::classify(30.0, 0.1), DrivingMode::Cruising);
        assert_eq!(DrivingMode::classify(30.0, -0.1), DrivingMode::Cruising);
    }

    #[test]
    fn rates() {
        let co2 = Pollutant::CO2.rates();
        assert_eq!(co2.rate(DrivingMode::Idle), 1.7);
        assert_eq!(co2.rate(DrivingMode::Accelerating), 6.4);
        assert_eq!(Pollutant::CO.rates().accel, 23.0);
        assert_eq!(Pollutant::NOx.rates().idle, 0.06);
        assert_eq!(Pollutant::HC.rates().cruise, 0.6);
    }

    #[test]
    fn point_emission_spreads_to_neighbours() {
        let mut grid = EmissionGrid::new(500.0, 500.0, 5.0, 1);
        grid.deposit(Point2d::new(250.0, 250.0), 100.0);

        let (col, row) = grid.cell_at(Point2d::new(250.0, 250.0));
        assert_eq!((col, row), (50, 50));

        let nonzero = grid.cells().iter().filter(|m| **m > 0.0).count();
        assert_eq!(nonzero, 9);
        for (c, r) in iproduct!(col - 1..=col + 1, row - 1..=row + 1) {
            assert!(grid.get(c, r) > 0.0);
        }

        // Centre, then edges, then corners
        assert!(grid.get(col, row) > grid.get(col + 1, row));
        assert!(grid.get(col + 1, row) > grid.get(col + 1, row + 1));
        assert_approx_eq!(grid.get(col + 1, row), grid.get(col, row - 1));

        assert_approx_eq!(grid.total(), 100.0);
        assert_approx_eq!(grid.cells().iter().sum::<f64>(), grid.total());
    }

    #[test]
    fn mass_is_kept_at_edges() {
        let mut grid = EmissionGrid::new(100.0, 100.0, 10.0, 3);
        grid.deposit(Point2d::new(0.0, 0.0), 10.0);
        grid.deposit(Point2d::new(-50.0, 500.0), 10.0);
        assert_approx_eq!(grid.cells().iter().sum::<f64>(), 20.0);
        assert_approx_eq!(grid.total(), 20.0);
        assert!(grid.get(0, 9) > 0.0);

        grid.clear();
        assert_eq!(grid.total(), 0.0);
        assert!(grid.cells().iter().all(|m| *m == 0.0));
    }
}

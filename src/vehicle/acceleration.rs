use std::cell::Cell;

/// The acceleration model of a vehicle: a variant of the intelligent driver model
/// which brings the vehicle to an immediate stop when it gets too close to an obstacle.
///
/// Call [AccelerationModel::reset] at the start of each update, then apply
/// each constraint on the vehicle. The most restrictive constraint wins.
#[derive(Clone, Debug)]
pub struct AccelerationModel {
    max_vel: f64,
    max_acc: f64,
    max_brake: f64,
    reaction: f64,
    delta: f64,
    min_gap: f64,
    acc: Cell<f64>,
    stop: Cell<bool>,
}

/// The parameters of the acceleration model.
pub struct ModelParams {
    /// The desired velocity in units/s.
    pub max_velocity: f64,
    /// The maximum acceleration in units/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration in units/s<sup>2</sup>, a positive number.
    pub max_braking: f64,
    /// The desired time gap to the vehicle ahead in seconds.
    pub reaction_time: f64,
    /// The exponent of the free road term.
    pub delta: f64,
    /// The distance to an obstacle at which the vehicle stops dead, in units.
    pub min_gap: f64,
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    pub fn new(params: &ModelParams) -> Self {
        AccelerationModel {
            max_vel: params.max_velocity,
            max_acc: params.max_acceleration,
            max_brake: params.max_braking,
            reaction: params.reaction_time,
            delta: params.delta,
            min_gap: params.min_gap,
            acc: Cell::new(params.max_acceleration),
            stop: Cell::new(false),
        }
    }

    /// The desired velocity in units/s.
    pub fn max_vel(&self) -> f64 {
        self.max_vel
    }

    /// Sets the desired velocity.
    pub fn set_max_vel(&mut self, max_vel: f64) {
        self.max_vel = max_vel;
    }

    /// Resets the acceleration model to free road driving. Use at the start of an update.
    pub fn reset(&self, vel: f64) {
        self.acc.set(self.free_acc(vel));
        self.stop.set(false);
    }

    /// Gets the current acceleration of the vehicle.
    pub fn acc(&self) -> f64 {
        if self.stop.get() {
            0.0
        } else {
            self.acc.get()
        }
    }

    /// Whether a constraint has brought the vehicle to a dead stop.
    pub fn is_stopping(&self) -> bool {
        self.stop.get()
    }

    /// Stops the vehicle dead.
    pub fn emergency_stop(&self) {
        self.stop.set(true);
    }

    /// The acceleration on an empty road.
    pub fn free_acc(&self, vel: f64) -> f64 {
        self.max_acc * (1.0 - (vel / self.max_vel).powf(self.delta))
    }

    /// The gap the vehicle would like to keep to an obstacle moving at `their_vel`.
    pub fn desired_gap(&self, my_vel: f64, their_vel: f64) -> f64 {
        let factor = 1.0 / (2.0 * (self.max_acc * self.max_brake).sqrt());
        self.min_gap + my_vel * self.reaction + my_vel * (my_vel - their_vel) * factor
    }

    /// Calculates the acceleration needed to follow the vehicle ahead.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the vehicle ahead.
    /// * `my_vel` - The velocity of the simulated vehicle.
    /// * `their_vel` - The vehicle ahead's velocity.
    pub fn follow_vehicle(&self, net_dist: f64, my_vel: f64, their_vel: f64) {
        // Also catches NaN distances
        if !(net_dist >= self.min_gap) {
            return self.emergency_stop();
        }
        let term = self.desired_gap(my_vel, their_vel) / net_dist;
        let acc = self.free_acc(my_vel) - self.max_acc * term * term;
        self.acc.set(f64::min(self.acc.get(), acc));
    }

    /// Calculates the acceleration needed to stop before a stop line.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the stop line.
    /// * `my_vel` - The velocity of the simulated vehicle.
    pub fn stop_at_line(&self, net_dist: f64, my_vel: f64) {
        self.follow_vehicle(net_dist, my_vel, 0.0);
    }

    /// Integrates the velocity over a time step, keeping it within `[0, max_vel]`.
    ///
    /// # Returns
    /// The new velocity and the acceleration that was applied.
    pub fn integrate(&self, vel: f64, dt: f64) -> (f64, f64) {
        if self.is_stopping() {
            return (0.0, 0.0);
        }
        let acc = self.acc();
        let vel = (vel + acc * dt).clamp(0.0, self.max_vel);
        (vel, acc)
    }
}

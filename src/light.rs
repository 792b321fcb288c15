use crate::RoadId;
use smallvec::SmallVec;

/// The time all entries are held red between phases, in seconds.
pub const CLEARANCE_SECS: f64 = 4.0;

/// A set of coordinated traffic lights cycling through signal phases.
///
/// Each phase is shown for a fixed number of frames. During the last
/// [CLEARANCE_SECS] of every phase all of the lights are red.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The entry roads released by each phase.
    phases: Vec<SmallVec<[RoadId; 2]>>,
    /// The length of each phase in frames, including the clearance.
    cycle: usize,
    /// The all-red clearance at the end of each phase in frames.
    clearance: usize,
    /// The number of frames elapsed.
    frame: usize,
}

/// The state of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LightState {
    Red,
    Green,
}

impl TrafficLight {
    /// Creates a traffic light which gives each phase `light_duration`
    /// seconds at the given frame rate.
    pub fn new(phases: Vec<SmallVec<[RoadId; 2]>>, light_duration: f64, fps: usize) -> Self {
        let mut light = Self {
            phases,
            cycle: 0,
            clearance: (CLEARANCE_SECS * fps as f64).round() as usize,
            frame: 0,
        };
        light.set_duration(light_duration, fps);
        light
    }

    /// Changes the length of each phase. The schedule carries on from the current frame.
    pub fn set_duration(&mut self, light_duration: f64, fps: usize) {
        let cycle = (light_duration * fps as f64).round() as usize;
        self.cycle = usize::max(cycle, self.clearance + 1);
    }

    /// Advances the traffic light timing by one frame.
    pub fn step(&mut self) {
        self.frame += 1;
    }

    /// The phase whose turn it is, or `None` during the all-red clearance
    /// or if there are no phases at all.
    pub fn active_phase(&self) -> Option<usize> {
        if self.phases.is_empty() || self.since() >= self.cycle - self.clearance {
            return None;
        }
        Some((self.frame / self.cycle) % self.phases.len())
    }

    /// The number of frames since the current phase began.
    pub fn since(&self) -> usize {
        self.frame % self.cycle
    }

    /// The phases, in the order they are shown.
    pub fn phases(&self) -> &[SmallVec<[RoadId; 2]>] {
        &self.phases
    }

    /// Iterates over every controlled road along with its current state.
    pub fn get_states(&self) -> impl Iterator<Item = (RoadId, LightState)> + '_ {
        let active = self.active_phase();
        self.phases.iter().enumerate().flat_map(move |(idx, phase)| {
            let state = if Some(idx) == active {
                LightState::Green
            } else {
                LightState::Red
            };
            phase.iter().map(move |road| (*road, state))
        })
    }

    /// The current state of the light at the end of the given road.
    /// Roads which are not controlled by the light are always green.
    pub fn state_of(&self, road: RoadId) -> LightState {
        self.get_states()
            .find(|(id, _)| *id == road)
            .map(|(_, state)| state)
            .unwrap_or(LightState::Green)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::SlotMap;
    use smallvec::smallvec;

    fn roads() -> [RoadId; 4] {
        let mut set = SlotMap::<RoadId, ()>::with_key();
        [(); 4].map(|_| set.insert(()))
    }

    #[test]
    fn phases_alternate_with_clearance() {
        let [a, b, c, d] = roads();
        let mut light = TrafficLight::new(vec![smallvec![a, b], smallvec![c, d]], 8.0, 30);

        // 8 s phases at 30 fps, the last 4 s of each all red
        let mut states = vec![];
        for _ in 0..(4 * 240) {
            states.push((light.state_of(a), light.state_of(c)));
            light.step();
        }
        use LightState::*;
        assert_eq!(states[0], (Green, Red));
        assert_eq!(states[119], (Green, Red));
        assert_eq!(states[120], (Red, Red));
        assert_eq!(states[239], (Red, Red));
        assert_eq!(states[240], (Red, Green));
        assert_eq!(states[359], (Red, Green));
        assert_eq!(states[360], (Red, Red));
        assert_eq!(states[480], (Green, Red));

        // Never both green
        assert!(states.iter().all(|s| *s != (Green, Green)));
        assert_eq!(light.state_of(a), light.state_of(b));
    }

    #[test]
    fn uncontrolled_roads_are_green() {
        let [a, b, c, _] = roads();
        let light = TrafficLight::new(vec![smallvec![a], smallvec![b]], 8.0, 30);
        assert_eq!(light.state_of(c), LightState::Green);
        assert_eq!(light.get_states().count(), 2);
    }

    #[test]
    fn short_durations_keep_a_green_frame() {
        let [a, ..] = roads();
        let light = TrafficLight::new(vec![smallvec![a]], 1.0, 30);
        assert_eq!(light.active_phase(), Some(0));

        let empty = TrafficLight::new(vec![], 8.0, 30);
        assert_eq!(empty.active_phase(), None);
    }
}

//! Bent-pipe relay: every satellite drains straight to a ground station,
//! never via another satellite. Satellites with no visible ground station
//! get an empty target list and simply buffer (and eventually drop).

use crate::Strategy;
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub struct BentPipe {
    rng: StdRng,
}

impl BentPipe {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Strategy for BentPipe {
    fn set_targets(&mut self, satellites: &mut [Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {
        for sat in satellites.iter_mut() {
            if sat.gsl_connections.is_empty() {
                sat.target_ids = Vec::new();
                continue;
            }
            let mut targets = sat.gsl_connections.clone();
            targets.shuffle(&mut self.rng);
            sat.target_ids = targets;
        }
    }

    fn learn(&mut self, _satellites: &[Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {}

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "bent-pipe"
    }
}

//! Uniform-random ordering over every ISL/GSL neighbour.

use crate::Strategy;
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;
use rand::seq::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub struct RandomStrategy {
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Strategy for RandomStrategy {
    fn set_targets(&mut self, satellites: &mut [Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {
        for sat in satellites.iter_mut() {
            let mut targets = sat.available_targets();
            targets.shuffle(&mut self.rng);
            sat.target_ids = targets;
        }
    }

    fn learn(&mut self, _satellites: &[Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {}

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "random"
    }
}

//! UCB1 over each satellite's own neighbour set: chooses targets by
//! ascending upper-confidence-adjusted cost (lower is better since cost is
//! being minimised), forcing untried actions to the front.

use crate::Strategy;
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;
use std::collections::HashMap;

const UNCERTAINTY_FACTOR: f64 = 1.0;
const COUNTER_CAP: u64 = 10_000_000_000;

#[derive(Default)]
pub struct Ucb1 {
    /// `sat_id -> target_id -> (avg_cost, selection_count)`
    cost_estimates: HashMap<u32, HashMap<u32, (f64, u64)>>,
}

impl Ucb1 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for Ucb1 {
    fn set_targets(&mut self, satellites: &mut [Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {
        for sat in satellites.iter_mut() {
            let table = self.cost_estimates.entry(sat.id).or_default();
            let total_selections: u64 = table.values().map(|&(_, n)| n).sum();

            let mut scored: Vec<(u32, f64)> = Vec::new();
            for target_id in sat.available_targets() {
                let entry = table.entry(target_id).or_insert((0.0, 0));
                let (avg_cost, n) = *entry;
                let score = if n > 0 {
                    avg_cost - UNCERTAINTY_FACTOR * (2.0 * (total_selections as f64).ln() / n as f64).sqrt()
                } else {
                    f64::NEG_INFINITY
                };
                scored.push((target_id, score));
            }

            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            sat.target_ids = scored.into_iter().map(|(id, _)| id).collect();
        }
    }

    fn learn(&mut self, satellites: &[Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {
        for sat in satellites {
            if sat.cost <= 0.0 {
                continue;
            }
            let Some(&target_id) = sat.target_ids.first() else { continue };
            let table = self.cost_estimates.entry(sat.id).or_default();
            let entry = table.entry(target_id).or_insert((0.0, 0));
            let (old_estimate, n) = *entry;
            entry.0 = (n as f64 * old_estimate + sat.cost) / (n as f64 + 1.0);
            if n <= COUNTER_CAP {
                entry.1 = n + 1;
            }
        }
    }

    fn reset(&mut self) {
        self.cost_estimates.clear();
    }

    fn name(&self) -> &str {
        "ucb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_time::EcefPosition;

    #[test]
    fn untried_actions_are_forced_to_the_front() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.isl_connections = vec![1, 2];
        let mut satellites = vec![sat];

        let mut strategy = Ucb1::new();
        let now = SimTime::parse("2023-01-01 00:00:00").unwrap();
        strategy.set_targets(&mut satellites, &[], now);

        assert_eq!(satellites[0].target_ids.len(), 2);
    }

    #[test]
    fn learn_updates_only_the_first_target() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.isl_connections = vec![1, 2];
        sat.target_ids = vec![1, 2];
        sat.cost = 10.0;
        let satellites = vec![sat];

        let mut strategy = Ucb1::new();
        strategy.learn(&satellites, &[], SimTime::parse("2023-01-01 00:00:00").unwrap());

        let table = &strategy.cost_estimates[&0];
        assert_eq!(table[&1], (10.0, 1));
        assert!(!table.contains_key(&2));
    }

    #[test]
    fn reset_clears_learned_table() {
        let mut strategy = Ucb1::new();
        strategy.cost_estimates.insert(0, HashMap::from([(1, (5.0, 3))]));
        strategy.reset();
        assert!(strategy.cost_estimates.is_empty());
    }
}

//! Tabular Q-learning: per-satellite, per-(state, action) value table updated
//! from `-cost` as a reward, with epsilon-greedy action selection that decays
//! every step.

use crate::Strategy;
use constellation_nodes::{satellite_isl_capacity, Groundstation, Satellite};
use constellation_time::SimTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

const ALPHA: f64 = 0.15;
const GAMMA: f64 = 0.90;
const EPSILON_MIN: f64 = 0.02;
const EPSILON_DECAY: f64 = 0.9995;
const EPSILON_INITIAL: f64 = 0.15;

/// `(ISL-degree bin, GSL-degree bin, min-GSL-distance bin, best-ISL-capacity
/// bin, hour-of-day bin)`.
type StateKey = (u8, u8, u8, u8, u8);

pub struct QLearning {
    rng: StdRng,
    epsilon: f64,
    q: HashMap<u32, HashMap<(StateKey, u32), f64>>,
    last_state: HashMap<u32, StateKey>,
    last_action: HashMap<u32, u32>,
}

impl QLearning {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            epsilon: EPSILON_INITIAL,
            q: HashMap::new(),
            last_state: HashMap::new(),
            last_action: HashMap::new(),
        }
    }

    fn q_value(&self, sat_id: u32, state: StateKey, action: u32) -> f64 {
        self.q
            .get(&sat_id)
            .and_then(|table| table.get(&(state, action)))
            .copied()
            .unwrap_or(0.0)
    }

    fn set_q_value(&mut self, sat_id: u32, state: StateKey, action: u32, value: f64) {
        self.q.entry(sat_id).or_default().insert((state, action), value);
    }

    fn available_actions(sat: &Satellite) -> Vec<u32> {
        let mut seen = HashSet::new();
        sat.available_targets().into_iter().filter(|a| seen.insert(*a)).collect()
    }

    fn state_key(sat: &Satellite, satellites: &[Satellite], groundstations: &[Groundstation], current_time: SimTime) -> StateKey {
        let n_sat = satellites.len();
        (
            bin_deg_isl(sat.isl_connections.len()),
            bin_deg_gsl(sat.gsl_connections.len()),
            bin_min_gsl_distance(sat, groundstations, n_sat),
            bin_best_isl_capacity(sat, satellites),
            (current_time.hour() / 4) as u8,
        )
    }

    fn argmax(&self, sat_id: u32, state: StateKey, actions: &[u32]) -> u32 {
        let mut sorted = actions.to_vec();
        sorted.sort_unstable();
        let mut best_action = sorted[0];
        let mut best_q = f64::NEG_INFINITY;
        for &a in &sorted {
            let q = self.q_value(sat_id, state, a);
            if q > best_q {
                best_q = q;
                best_action = a;
            }
        }
        best_action
    }

    fn rank_by_q(&self, sat_id: u32, state: StateKey, actions: &[u32], chosen_first: u32) -> Vec<u32> {
        let mut scored: Vec<(u32, f64)> = actions.iter().map(|&a| (a, self.q_value(sat_id, state, a))).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        let mut ranked: Vec<u32> = scored.into_iter().map(|(a, _)| a).collect();
        if let Some(pos) = ranked.iter().position(|&a| a == chosen_first) {
            ranked.remove(pos);
            ranked.insert(0, chosen_first);
        }
        ranked
    }
}

fn bin_deg_isl(deg: usize) -> u8 {
    if deg == 0 {
        0
    } else if deg <= 2 {
        1
    } else if deg <= 4 {
        2
    } else {
        3
    }
}

fn bin_deg_gsl(deg: usize) -> u8 {
    if deg == 0 {
        0
    } else if deg == 1 {
        1
    } else {
        2
    }
}

fn bin_min_gsl_distance(sat: &Satellite, groundstations: &[Groundstation], n_sat: usize) -> u8 {
    if sat.gsl_connections.is_empty() {
        return 9;
    }
    let min_dist_m = sat
        .gsl_connections
        .iter()
        .map(|&gs_id| sat.position.distance_to(&groundstations[gs_id as usize - n_sat].position))
        .fold(f64::INFINITY, f64::min);
    let d_km = min_dist_m / 1000.0;
    (d_km / 1000.0).floor().clamp(0.0, 8.0) as u8
}

fn bin_best_isl_capacity(sat: &Satellite, satellites: &[Satellite]) -> u8 {
    if sat.isl_connections.is_empty() {
        return 0;
    }
    let best_cap = sat
        .isl_connections
        .iter()
        .map(|&nb_id| satellite_isl_capacity(sat, &satellites[nb_id as usize]).max(0.0))
        .fold(0.0, f64::max);
    let cap_gbps = best_cap / 1e9;
    if cap_gbps <= 0.0 {
        0
    } else if cap_gbps <= 0.5 {
        1
    } else if cap_gbps <= 1.0 {
        2
    } else if cap_gbps <= 2.0 {
        3
    } else {
        4
    }
}

impl Strategy for QLearning {
    fn set_targets(&mut self, satellites: &mut [Satellite], groundstations: &[Groundstation], current_time: SimTime) {
        for i in 0..satellites.len() {
            let actions = Self::available_actions(&satellites[i]);
            if actions.is_empty() {
                satellites[i].target_ids = Vec::new();
                continue;
            }

            let state = Self::state_key(&satellites[i], satellites, groundstations, current_time);
            let sat_id = satellites[i].id;

            let action = if self.rng.gen::<f64>() < self.epsilon {
                actions[self.rng.gen_range(0..actions.len())]
            } else {
                self.argmax(sat_id, state, &actions)
            };

            let ranked = self.rank_by_q(sat_id, state, &actions, action);
            satellites[i].target_ids = ranked;

            self.last_state.insert(sat_id, state);
            self.last_action.insert(sat_id, action);
        }

        self.epsilon = (self.epsilon * EPSILON_DECAY).max(EPSILON_MIN);
    }

    fn learn(&mut self, satellites: &[Satellite], groundstations: &[Groundstation], current_time: SimTime) {
        for sat in satellites {
            if sat.cost == 0.0 {
                continue;
            }
            let Some(&s_prev) = self.last_state.get(&sat.id) else { continue };
            let Some(&a_prev) = self.last_action.get(&sat.id) else { continue };

            let reward = -sat.cost;
            let s_next = Self::state_key(sat, satellites, groundstations, current_time);
            let next_actions = Self::available_actions(sat);
            let q_next_max = if next_actions.is_empty() {
                0.0
            } else {
                next_actions
                    .iter()
                    .map(|&a| self.q_value(sat.id, s_next, a))
                    .fold(f64::NEG_INFINITY, f64::max)
            };

            let q_old = self.q_value(sat.id, s_prev, a_prev);
            let q_new = (1.0 - ALPHA) * q_old + ALPHA * (reward + GAMMA * q_next_max);
            self.set_q_value(sat.id, s_prev, a_prev, q_new);
        }
    }

    fn reset(&mut self) {
        self.q.clear();
        self.last_state.clear();
        self.last_action.clear();
    }

    fn name(&self) -> &str {
        "q_learning"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_time::EcefPosition;

    #[test]
    fn satellite_with_no_actions_gets_empty_targets() {
        let mut satellites = vec![Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0))];
        let mut strategy = QLearning::new(1);
        strategy.set_targets(&mut satellites, &[], SimTime::parse("2023-01-01 00:00:00").unwrap());
        assert!(satellites[0].target_ids.is_empty());
    }

    #[test]
    fn learn_moves_q_value_toward_negative_cost() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.isl_connections = vec![1];
        let mut satellites = vec![sat, Satellite::new(1, EcefPosition::new(7_100_000.0, 0.0, 0.0))];

        let mut strategy = QLearning::new(1);
        let now = SimTime::parse("2023-01-01 00:00:00").unwrap();
        strategy.set_targets(&mut satellites, &[], now);
        satellites[0].cost = 50.0;
        strategy.learn(&satellites, &[], now);

        let state = strategy.last_state[&0];
        let action = strategy.last_action[&0];
        let q = strategy.q_value(0, state, action);
        assert!(q < 0.0);
    }

    #[test]
    fn epsilon_decays_after_each_set_targets_call() {
        let mut satellites = vec![Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0))];
        let mut strategy = QLearning::new(1);
        let before = strategy.epsilon;
        strategy.set_targets(&mut satellites, &[], SimTime::parse("2023-01-01 00:00:00").unwrap());
        assert!(strategy.epsilon < before);
    }
}

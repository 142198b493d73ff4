//! K-best-neighbours variant of Dijkstra: every satellite keeps its `K`
//! shortest-total-distance predecessors toward any ground station, not just
//! the single best one.

use crate::Strategy;
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const K: usize = 4;

struct HeapEntry(f64, u32);
impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.partial_cmp(&self.0).unwrap_or(Ordering::Equal)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Inserts `(distance, id)` into a candidate list kept sorted ascending and
/// capped at `K`, replacing an existing entry for the same id if the new
/// distance is shorter. Returns whether the list's best entry improved.
fn admit_candidate(list: &mut Vec<(f64, u32)>, id: u32, distance: f64) -> bool {
    let worst = list.last().map(|&(d, _)| d);
    let admits = list.len() < K || worst.map(|w| distance < w).unwrap_or(true);
    if !admits {
        return false;
    }
    let best_before = list.first().map(|&(d, _)| d);

    if let Some(existing) = list.iter_mut().find(|(_, eid)| *eid == id) {
        if distance < existing.0 {
            existing.0 = distance;
        }
    } else {
        list.push((distance, id));
    }
    list.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    if list.len() > K {
        list.truncate(K);
    }

    best_before.map(|b| distance < b).unwrap_or(true)
}

#[derive(Default)]
pub struct Gounder;

impl Gounder {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for Gounder {
    fn set_targets(&mut self, satellites: &mut [Satellite], groundstations: &[Groundstation], _current_time: SimTime) {
        let n_sat = satellites.len();
        let mut neighbours: Vec<Vec<(f64, u32)>> = vec![Vec::new(); n_sat];
        let mut heap = BinaryHeap::new();

        for sat in satellites.iter() {
            for &gs_id in &sat.gsl_connections {
                let gs_index = gs_id as usize - n_sat;
                let distance = sat.position.distance_to(&groundstations[gs_index].position);
                admit_candidate(&mut neighbours[sat.id as usize], gs_id, distance);
            }
            if let Some(&(shortest, _)) = neighbours[sat.id as usize].first() {
                heap.push(HeapEntry(shortest, sat.id));
            }
        }

        while let Some(HeapEntry(current_distance, current_id)) = heap.pop() {
            let worst = neighbours[current_id as usize].last().map(|&(d, _)| d).unwrap_or(f64::INFINITY);
            if current_distance > worst {
                continue;
            }
            let current = &satellites[current_id as usize];
            for &neighbour_id in &current.isl_connections {
                let distance = current_distance + current.position.distance_to(&satellites[neighbour_id as usize].position);
                if admit_candidate(&mut neighbours[neighbour_id as usize], current_id, distance) {
                    heap.push(HeapEntry(distance, neighbour_id));
                }
            }
        }

        for sat in satellites.iter_mut() {
            sat.target_ids = neighbours[sat.id as usize].iter().map(|&(_, id)| id).collect();
        }
    }

    fn learn(&mut self, _satellites: &[Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {}

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "gounder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_time::EcefPosition;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn keeps_at_most_k_predecessors_ordered_by_total_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let groundstations: Vec<Groundstation> = (5..5 + 6)
            .map(|id| Groundstation::new(id, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng))
            .collect();

        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.gsl_connections = (5..5 + 6).collect();
        let mut satellites = vec![sat];

        let mut strategy = Gounder::new();
        strategy.set_targets(&mut satellites, &groundstations, SimTime::parse("2023-01-01 00:00:00").unwrap());

        assert_eq!(satellites[0].target_ids.len(), K);
    }

    #[test]
    fn relay_satellite_keeps_predecessor_chain() {
        let mut a = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        a.gsl_connections = vec![2];
        a.isl_connections = vec![1];
        let mut b = Satellite::new(1, EcefPosition::new(7_100_000.0, 0.0, 0.0));
        b.isl_connections = vec![0];

        let mut satellites = vec![a, b];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let groundstations = vec![Groundstation::new(2, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng)];

        let mut strategy = Gounder::new();
        strategy.set_targets(&mut satellites, &groundstations, SimTime::parse("2023-01-01 00:00:00").unwrap());

        assert_eq!(satellites[1].target_ids, vec![0]);
    }
}

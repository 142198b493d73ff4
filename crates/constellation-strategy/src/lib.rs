//! The routing strategy contract and its seven implementations.
//!
//! Every strategy sees the same two calls per step: `set_targets` writes
//! `target_ids` on every satellite, `learn` updates whatever internal table
//! the strategy keeps from the `cost` the evaluator just wrote onto each
//! satellite. Nothing outside a strategy's own `learn`/`set_targets` ever
//! touches its tables — one instance belongs to one worker for the whole run.

use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;

pub mod bent_pipe;
pub mod dijkstra;
pub mod gounder;
pub mod q_learning;
pub mod random_strategy;
pub mod tile_coded_ucb;
pub mod ucb;

pub use bent_pipe::BentPipe;
pub use dijkstra::Dijkstra;
pub use gounder::Gounder;
pub use q_learning::QLearning;
pub use random_strategy::RandomStrategy;
pub use tile_coded_ucb::{ContextAxes, TileCodedUcb};
pub use ucb::Ucb1;

/// Common contract every routing strategy implements.
pub trait Strategy {
    /// Writes `target_ids` on every satellite, in the order the propagator
    /// should try them.
    fn set_targets(&mut self, satellites: &mut [Satellite], groundstations: &[Groundstation], current_time: SimTime);

    /// Updates internal estimators from each satellite's `cost`, as computed
    /// for the step that just finished.
    fn learn(&mut self, satellites: &[Satellite], groundstations: &[Groundstation], current_time: SimTime);

    /// Clears any learned state, returning the strategy to its initial
    /// condition. Not invoked by the per-step orchestration; exposed for
    /// between-repetition resets.
    fn reset(&mut self);

    /// Stable identifier used in output records and log lines.
    fn name(&self) -> &str;
}

/// Dijkstra predecessor distances from every satellite to the nearest ground
/// station reachable via GSL, then ISL relaxation outward. Shared by
/// [`Dijkstra`], [`Gounder`]'s K-best variant, and the tile-coded UCB
/// `dijkstra`/`order`/`total_distance` context features.
pub(crate) fn dijkstra_predecessors(
    satellites: &[Satellite],
    groundstations: &[Groundstation],
) -> (Vec<f64>, Vec<Option<u32>>) {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;

    let n_sat = satellites.len();
    let mut distances = vec![f64::INFINITY; n_sat];
    let mut previous: Vec<Option<u32>> = vec![None; n_sat];

    #[derive(PartialEq)]
    struct HeapEntry(f64, u32);
    impl Eq for HeapEntry {}
    impl Ord for HeapEntry {
        fn cmp(&self, other: &Self) -> Ordering {
            // Reversed so `BinaryHeap` (a max-heap) pops the smallest distance.
            other.0.partial_cmp(&self.0).unwrap_or(Ordering::Equal)
        }
    }
    impl PartialOrd for HeapEntry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut heap = BinaryHeap::new();

    for sat in satellites {
        for &gs_id in &sat.gsl_connections {
            let gs_index = gs_id as usize - n_sat;
            let gs = &groundstations[gs_index];
            let initial_distance = sat.position.distance_to(&gs.position);
            if initial_distance < distances[sat.id as usize] {
                distances[sat.id as usize] = initial_distance;
                previous[sat.id as usize] = Some(gs_id);
            }
        }
        if distances[sat.id as usize].is_finite() {
            heap.push(HeapEntry(distances[sat.id as usize], sat.id));
        }
    }

    while let Some(HeapEntry(current_distance, current_id)) = heap.pop() {
        if current_distance > distances[current_id as usize] {
            continue;
        }
        let current = &satellites[current_id as usize];
        for &neighbour_id in &current.isl_connections {
            let distance = current_distance + current.position.distance_to(&satellites[neighbour_id as usize].position);
            if distance < distances[neighbour_id as usize] {
                distances[neighbour_id as usize] = distance;
                previous[neighbour_id as usize] = Some(current_id);
                heap.push(HeapEntry(distance, neighbour_id));
            }
        }
    }

    (distances, previous)
}

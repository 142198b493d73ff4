//! Single-shortest-path routing: every satellite's sole target is its
//! Dijkstra predecessor on the shortest path to any ground station, by
//! Euclidean distance.

use crate::{dijkstra_predecessors, Strategy};
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::SimTime;

#[derive(Default)]
pub struct Dijkstra;

impl Dijkstra {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for Dijkstra {
    fn set_targets(&mut self, satellites: &mut [Satellite], groundstations: &[Groundstation], _current_time: SimTime) {
        let (_, previous) = dijkstra_predecessors(satellites, groundstations);
        for sat in satellites.iter_mut() {
            sat.target_ids = match previous[sat.id as usize] {
                Some(pred) => vec![pred],
                None => Vec::new(),
            };
        }
    }

    fn learn(&mut self, _satellites: &[Satellite], _groundstations: &[Groundstation], _current_time: SimTime) {}

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "dijkstra"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_nodes::Groundstation;
    use constellation_time::EcefPosition;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn relay_satellite_targets_its_predecessor_not_the_ground_station_directly() {
        let mut a = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        a.gsl_connections = vec![2];
        a.isl_connections = vec![1];
        let mut b = Satellite::new(1, EcefPosition::new(7_100_000.0, 0.0, 0.0));
        b.isl_connections = vec![0];

        let mut satellites = vec![a, b];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let groundstations = vec![Groundstation::new(2, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng)];

        let mut strategy = Dijkstra::new();
        strategy.set_targets(&mut satellites, &groundstations, SimTime::parse("2023-01-01 00:00:00").unwrap());

        assert_eq!(satellites[0].target_ids, vec![2]);
        assert_eq!(satellites[1].target_ids, vec![0]);
    }

    #[test]
    fn unreachable_satellite_gets_empty_targets() {
        let mut satellites = vec![Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0))];
        let mut strategy = Dijkstra::new();
        strategy.set_targets(&mut satellites, &[], SimTime::parse("2023-01-01 00:00:00").unwrap());
        assert!(satellites[0].target_ids.is_empty());
    }
}

//! Per-step topology builder: assigns ground-station links to the nearest
//! satellites that can see each ground station, at most
//! `ANTENNAS_PER_GROUNDSTATION` per station. ISL neighbour lists are given
//! directly by the input data and are not rebuilt here.

use constellation_nodes::{Groundstation, Satellite};

pub const ANTENNAS_PER_GROUNDSTATION: usize = 8;

/// Clears every satellite's `gsl_connections` and reassigns each ground
/// station to its `antennas_per_groundstation` nearest visible satellites,
/// nearest first, ties broken by satellite id.
pub fn assign_gsl_connections(
    satellites: &mut [Satellite],
    groundstations: &[Groundstation],
    antennas_per_groundstation: usize,
) {
    for sat in satellites.iter_mut() {
        sat.gsl_connections.clear();
    }

    for gs in groundstations {
        let mut candidates: Vec<(f64, u32)> = satellites
            .iter()
            .filter(|sat| sat.visible_groundstations.contains(&gs.id))
            .map(|sat| (sat.position.distance_to(&gs.position), sat.id))
            .collect();

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

        for &(_, sat_id) in candidates.iter().take(antennas_per_groundstation) {
            satellites[sat_id as usize].gsl_connections.push(gs.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_time::EcefPosition;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sat(id: u32, dist: f64, gs_id: u32) -> Satellite {
        let mut s = Satellite::new(id, EcefPosition::new(7_000_000.0 + dist, 0.0, 0.0));
        s.visible_groundstations = vec![gs_id];
        s
    }

    #[test]
    fn assigns_nearest_k_satellites_to_each_groundstation() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let gs = Groundstation::new(10, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng);

        let mut satellites: Vec<Satellite> = (0..5)
            .map(|i| sat(i, (i as f64) * 100_000.0, 10))
            .collect();

        assign_gsl_connections(&mut satellites, &[gs], 3);

        let assigned: Vec<u32> = satellites
            .iter()
            .filter(|s| s.gsl_connections.contains(&10))
            .map(|s| s.id)
            .collect();
        assert_eq!(assigned, vec![0, 1, 2]);
    }

    #[test]
    fn invisible_satellites_are_never_assigned() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let gs = Groundstation::new(10, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng);
        let mut out_of_view = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        out_of_view.visible_groundstations = vec![];

        let mut satellites = vec![out_of_view];
        assign_gsl_connections(&mut satellites, &[gs], 8);
        assert!(satellites[0].gsl_connections.is_empty());
    }

    #[test]
    fn clears_stale_assignments_before_reassigning() {
        let mut satellites = vec![Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0))];
        satellites[0].gsl_connections = vec![99];
        assign_gsl_connections(&mut satellites, &[], 8);
        assert!(satellites[0].gsl_connections.is_empty());
    }
}

//! Tile-coded contextual UCB: like [`crate::Ucb1`], but each (satellite,
//! target) estimator is keyed by a multi-grid tiling over a configurable set
//! of context features instead of a single global estimate.
//!
//! Grids are offset from each other by a fraction of a bin width so that
//! nearby contexts land in overlapping, not identical, tiles — the standard
//! tile-coding generalisation trick. All `G` grids for one (satellite,
//! target) pair share a single tile table; a context produced by grid `g`
//! and a context produced by grid `g'` are distinguished because the grid
//! offset is folded into the tile's integer coordinate before lookup.

use crate::{dijkstra_predecessors, Strategy};
use constellation_nodes::{Groundstation, Satellite};
use constellation_time::{EcefPosition, SimTime};
use std::collections::HashMap;

const UNCERTAINTY_FACTOR: f64 = 1.0;
const COUNTER_CAP: u64 = 10_000_000_000;
const DATA_PRECISION_BASE: f64 = 30.0;
const TIME_PRECISION_SECONDS: f64 = 3600.0;
const TOTAL_DISTANCE_PRECISION_M: f64 = 1_000_000.0;
const ELEVATION_PRECISION_M: f64 = 10_000.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// `(distance, data, local_time, utc_time, dijkstra, order, total_distance,
/// elevation)` tile coordinates. A context is shared by every grid whose
/// offset happens to fold to the same integer coordinate for a given axis.
type TileContext = [i64; 8];

/// Which context axes feed the tiling. Disabled axes are still computed (as
/// zero) rather than omitted, so the tuple shape never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAxes {
    pub distance: bool,
    pub data: bool,
    pub local_time: bool,
    pub utc_time: bool,
    pub dijkstra: bool,
    pub order: bool,
    pub total_distance: bool,
    pub elevation: bool,
}

impl ContextAxes {
    /// The strategy's default: distance only.
    pub fn distance_only() -> Self {
        Self { distance: true, ..Default::default() }
    }
}

fn tile_cell(transformed: f64, grid: usize, total_grids: usize) -> i64 {
    let offset = grid as f64 / total_grids as f64;
    let k = (transformed + offset).trunc() as i64;
    k * total_grids as i64 - grid as i64
}

fn node_position(id: u32, n_sat: usize, satellites: &[Satellite], groundstations: &[Groundstation]) -> EcefPosition {
    if (id as usize) < n_sat {
        satellites[id as usize].position
    } else {
        groundstations[id as usize - n_sat].position
    }
}

pub struct TileCodedUcb {
    contexts: ContextAxes,
    distance_precision: f64,
    no_of_grids: usize,
    name: String,
    /// `sat_id -> target_id -> tile -> (avg_cost, selection_count)`
    tiles: HashMap<u32, HashMap<u32, HashMap<TileContext, (f64, u64)>>>,
}

impl TileCodedUcb {
    pub fn new(contexts: ContextAxes, distance_precision: f64, no_of_grids: usize) -> Self {
        Self {
            contexts,
            distance_precision: distance_precision * no_of_grids as f64,
            no_of_grids,
            name: format!("tile_coded_ucb_{:07}_{}", distance_precision as i64, no_of_grids),
            tiles: HashMap::new(),
        }
    }

    fn time_axes(&self, sat: &Satellite, current_time: SimTime) -> (f64, f64) {
        use chrono::Timelike;
        if !self.contexts.local_time && !self.contexts.utc_time {
            return (0.0, 0.0);
        }
        let dt = current_time.inner();
        let minute_second = dt.minute() as f64 * 60.0 + dt.second() as f64;
        let utc_seconds = dt.hour() as f64 * 3600.0 + minute_second;
        let local_hour = constellation_time::local_hour(dt.hour(), sat.position.longitude_deg());
        let local_seconds = local_hour as f64 * 3600.0 + minute_second;
        (
            if self.contexts.local_time { local_seconds / TIME_PRECISION_SECONDS } else { 0.0 },
            if self.contexts.utc_time { utc_seconds / TIME_PRECISION_SECONDS } else { 0.0 },
        )
    }

    fn data_axis(&self, sat: &Satellite) -> f64 {
        if !self.contexts.data {
            return 0.0;
        }
        (sat.generation_rate + 1.0).ln() / DATA_PRECISION_BASE.ln()
    }

    fn elevation_axis(&self, sat: &Satellite) -> f64 {
        if !self.contexts.elevation {
            return 0.0;
        }
        let p = sat.position;
        (p.x.powi(2) + p.y.powi(2) + p.z.powi(2) - EARTH_RADIUS_M) / ELEVATION_PRECISION_M
    }

    fn contexts_for_target(
        &self,
        sat: &Satellite,
        target_position: EcefPosition,
        data_t: f64,
        t_t: f64,
        u_t: f64,
        elev_t: f64,
        total_distance: f64,
        is_dijkstra_pred: bool,
        is_order_first: bool,
    ) -> Vec<TileContext> {
        let distance_t = if self.contexts.distance {
            sat.position.distance_to(&target_position) / self.distance_precision
        } else {
            0.0
        };
        let total_distance_t = if self.contexts.total_distance {
            total_distance / TOTAL_DISTANCE_PRECISION_M
        } else {
            0.0
        };
        let dijkstra = (self.contexts.dijkstra && is_dijkstra_pred) as i64;
        let order = (self.contexts.order && is_order_first) as i64;

        (0..self.no_of_grids)
            .map(|g| {
                [
                    tile_cell(distance_t, g, self.no_of_grids),
                    tile_cell(data_t, g, self.no_of_grids),
                    tile_cell(t_t, g, self.no_of_grids),
                    tile_cell(u_t, g, self.no_of_grids),
                    dijkstra,
                    order,
                    tile_cell(total_distance_t, g, self.no_of_grids),
                    tile_cell(elev_t, g, self.no_of_grids),
                ]
            })
            .collect()
    }

    /// Shortest-path distance from every node (satellite or ground station)
    /// to the nearest ground station, plus each satellite's Dijkstra
    /// predecessor. Ground stations get distance 0; unreachable satellites
    /// get a large sentinel distance rather than infinity, matching the
    /// reference implementation.
    fn distances_and_predecessors(
        satellites: &[Satellite],
        groundstations: &[Groundstation],
    ) -> (Vec<f64>, Vec<Option<u32>>) {
        let n_sat = satellites.len();
        let (sat_distances, previous) = dijkstra_predecessors(satellites, groundstations);
        let mut distances_all = vec![0.0; n_sat + groundstations.len()];
        for i in 0..n_sat {
            distances_all[i] = if sat_distances[i].is_finite() { sat_distances[i] } else { 1e8 };
        }
        (distances_all, previous)
    }

    fn order_first_target(
        sat: &Satellite,
        distances_all: &[f64],
        n_sat: usize,
        satellites: &[Satellite],
        groundstations: &[Groundstation],
    ) -> Option<u32> {
        let mut targets = sat.available_targets();
        targets.sort_by(|&a, &b| {
            let da = distances_all[a as usize] + sat.position.distance_to(&node_position(a, n_sat, satellites, groundstations));
            let db = distances_all[b as usize] + sat.position.distance_to(&node_position(b, n_sat, satellites, groundstations));
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        targets.first().copied()
    }

    fn update_tile(&mut self, sat_id: u32, target_id: u32, contexts: &[TileContext], cost: f64) {
        for context in contexts {
            let entry = self
                .tiles
                .entry(sat_id)
                .or_default()
                .entry(target_id)
                .or_default()
                .entry(*context)
                .or_insert((0.0, 0));
            let (old_estimate, n) = *entry;
            entry.0 = (n as f64 * old_estimate + cost) / (n as f64 + 1.0);
            if n <= COUNTER_CAP {
                entry.1 = n + 1;
            }
        }
    }
}

impl Strategy for TileCodedUcb {
    fn set_targets(&mut self, satellites: &mut [Satellite], groundstations: &[Groundstation], current_time: SimTime) {
        let n_sat = satellites.len();
        let (distances_all, previous) = Self::distances_and_predecessors(satellites, groundstations);

        for i in 0..n_sat {
            let sat_id = satellites[i].id;
            let available = satellites[i].available_targets();
            if available.is_empty() {
                satellites[i].target_ids = Vec::new();
                continue;
            }

            let data_t = self.data_axis(&satellites[i]);
            let elev_t = self.elevation_axis(&satellites[i]);
            let (t_t, u_t) = self.time_axes(&satellites[i], current_time);
            let order_first = Self::order_first_target(&satellites[i], &distances_all, n_sat, satellites, groundstations);
            let predecessor = previous[sat_id as usize];

            let mut total_selections = vec![0u64; self.no_of_grids];
            let mut per_target: Vec<(u32, Vec<(f64, u64)>)> = Vec::with_capacity(available.len());

            for &target_id in &available {
                let target_position = node_position(target_id, n_sat, satellites, groundstations);
                let total_distance = distances_all[target_id as usize] + satellites[i].position.distance_to(&target_position);
                let contexts = self.contexts_for_target(
                    &satellites[i],
                    target_position,
                    data_t,
                    t_t,
                    u_t,
                    elev_t,
                    total_distance,
                    predecessor == Some(target_id),
                    order_first == Some(target_id),
                );

                let mut grid_values = Vec::with_capacity(self.no_of_grids);
                for (g, context) in contexts.iter().enumerate() {
                    let entry = *self
                        .tiles
                        .entry(sat_id)
                        .or_default()
                        .entry(target_id)
                        .or_default()
                        .entry(*context)
                        .or_insert((0.0, 0));
                    total_selections[g] += entry.1;
                    grid_values.push(entry);
                }
                per_target.push((target_id, grid_values));
            }

            let mut scored: Vec<(u32, f64)> = per_target
                .into_iter()
                .map(|(target_id, grid_values)| {
                    let mut score = 0.0;
                    for (g, &(avg, n)) in grid_values.iter().enumerate() {
                        if n == 0 {
                            return (target_id, f64::NEG_INFINITY);
                        }
                        score += avg - UNCERTAINTY_FACTOR * (2.0 * (total_selections[g] as f64).ln() / n as f64).sqrt();
                    }
                    (target_id, score / self.no_of_grids as f64)
                })
                .collect();

            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            satellites[i].target_ids = scored.into_iter().map(|(id, _)| id).collect();
        }
    }

    fn learn(&mut self, satellites: &[Satellite], groundstations: &[Groundstation], current_time: SimTime) {
        let n_sat = satellites.len();
        let (distances_all, previous) = Self::distances_and_predecessors(satellites, groundstations);

        for sat in satellites {
            if sat.cost <= 0.0 {
                continue;
            }
            let Some(&target_id) = sat.target_ids.first() else { continue };

            let target_position = node_position(target_id, n_sat, satellites, groundstations);
            let total_distance = distances_all[target_id as usize] + sat.position.distance_to(&target_position);
            let order_first = Self::order_first_target(sat, &distances_all, n_sat, satellites, groundstations);
            let data_t = self.data_axis(sat);
            let elev_t = self.elevation_axis(sat);
            let (t_t, u_t) = self.time_axes(sat, current_time);

            let contexts = self.contexts_for_target(
                sat,
                target_position,
                data_t,
                t_t,
                u_t,
                elev_t,
                total_distance,
                previous[sat.id as usize] == Some(target_id),
                order_first == Some(target_id),
            );

            self.update_tile(sat.id, target_id, &contexts, sat.cost);
        }
    }

    fn reset(&mut self) {
        self.tiles.clear();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn untried_target_is_scored_as_negative_infinity_then_selected() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.isl_connections = vec![1];
        let mut satellites = vec![sat, Satellite::new(1, EcefPosition::new(7_100_000.0, 0.0, 0.0))];

        let mut strategy = TileCodedUcb::new(ContextAxes::distance_only(), 180_000.0, 5);
        strategy.set_targets(&mut satellites, &[], SimTime::parse("2023-01-01 00:00:00").unwrap());

        assert_eq!(satellites[0].target_ids, vec![1]);
    }

    #[test]
    fn learn_lowers_estimate_toward_observed_cost() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.gsl_connections = vec![1];
        let groundstations = vec![Groundstation::new(1, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng)];
        let mut satellites = vec![sat];

        let mut strategy = TileCodedUcb::new(ContextAxes::distance_only(), 180_000.0, 5);
        let now = SimTime::parse("2023-01-01 00:00:00").unwrap();
        strategy.set_targets(&mut satellites, &groundstations, now);
        satellites[0].target_ids = vec![1];
        satellites[0].cost = 42.0;
        strategy.learn(&satellites, &groundstations, now);

        let tile = strategy.tiles.get(&0).and_then(|t| t.get(&1));
        assert!(tile.is_some_and(|t| !t.is_empty()));
    }
}

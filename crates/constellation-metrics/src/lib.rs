//! Per-node metric derivation (drop rate, delay, cost) and aggregate
//! per-step statistics, computed from the streams the propagator just
//! built. None of these functions mutate streams themselves.

use constellation_nodes::{Groundstation, IncomingSource, Satellite};
use constellation_time::EcefPosition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum tolerable end-to-end delay; a stream exceeding it counts as
/// dropped.
pub const TTL_MS: f64 = 200.0;
const SPEED_OF_LIGHT_M_PER_MS: f64 = 299_792.458;

fn generation_rate_of(sat: &Satellite) -> f64 {
    sat.incoming_streams
        .get(&IncomingSource::Generation)
        .and_then(|v| v.first())
        .map(|s| s.rate)
        .unwrap_or(0.0)
}

/// Per-source drop rate: `1 - delivered/generated`, 0 if nothing was
/// generated. `delivered` is summed from every ground station's core
/// outgoing bucket, grouped by the stream's originating satellite.
pub fn update_drop_rates(satellites: &mut [Satellite], groundstations: &[Groundstation]) {
    let mut delivered = vec![0.0f64; satellites.len()];
    for gs in groundstations {
        for stream in &gs.outgoing_core {
            let source = stream.source() as usize;
            if let Some(slot) = delivered.get_mut(source) {
                *slot += stream.rate;
            }
        }
    }

    for sat in satellites.iter_mut() {
        let gen = generation_rate_of(sat);
        sat.drop_rate = if gen == 0.0 {
            0.0
        } else {
            1.0 - delivered[sat.id as usize] / gen
        };
    }
}

/// Local (single-hop) drop rate: share of a satellite's total incoming rate
/// that it failed to forward onward this step.
pub fn update_local_drop_rate(sat: &mut Satellite) {
    let incoming: f64 = sat.incoming_streams.values().flatten().map(|s| s.rate).sum();
    sat.local_drop_rate = if incoming > 0.0 {
        let outgoing: f64 = sat.outgoing_streams.values().flatten().map(|s| s.rate).sum();
        1.0 - outgoing / incoming
    } else {
        0.0
    };
    sat.incoming_data = incoming;
}

fn node_position(id: u32, n_sat: usize, satellites: &[Satellite], groundstations: &[Groundstation]) -> EcefPosition {
    if (id as usize) < n_sat {
        satellites[id as usize].position
    } else {
        groundstations[id as usize - n_sat].position
    }
}

fn node_buffer_level(id: u32, n_sat: usize, satellites: &[Satellite], groundstations: &[Groundstation]) -> f64 {
    if (id as usize) < n_sat {
        satellites[id as usize].buffer_level
    } else {
        groundstations[id as usize - n_sat].buffer_level
    }
}

fn node_outgoing_traffic(id: u32, n_sat: usize, satellites: &[Satellite], groundstations: &[Groundstation]) -> f64 {
    if (id as usize) < n_sat {
        satellites[id as usize]
            .outgoing_streams
            .values()
            .flatten()
            .map(|s| s.rate)
            .sum()
    } else {
        groundstations[id as usize - n_sat]
            .outgoing_core
            .iter()
            .map(|s| s.rate)
            .sum()
    }
}

/// Per-source delay: rate-weighted mean, over every delivered stream from
/// that source, of propagation delay (distance/speed-of-light, summed over
/// hops) plus per-hop queuing delay (`buffer_level / outgoing_traffic`)
/// where a hop is buffered. Also fills `delays_per_outgoing_link`.
pub fn update_delays(satellites: &mut [Satellite], groundstations: &[Groundstation]) {
    let n_sat = satellites.len();
    let mut streams_per_satellite: Vec<Vec<constellation_nodes::Stream>> = vec![Vec::new(); n_sat];
    for gs in groundstations {
        for stream in &gs.outgoing_core {
            let source = stream.source() as usize;
            if source < n_sat {
                streams_per_satellite[source].push(stream.clone());
            }
        }
    }

    // Snapshot every node's position/buffer/outgoing-traffic before touching
    // `satellites` mutably below; each stream's path can reference any node,
    // including satellites other than the one currently being updated.
    let positions: Vec<EcefPosition> = (0..n_sat as u32)
        .map(|id| node_position(id, n_sat, satellites, groundstations))
        .chain((0..groundstations.len() as u32).map(|id| node_position(n_sat as u32 + id, n_sat, satellites, groundstations)))
        .collect();
    let buffer_levels: Vec<f64> = (0..n_sat as u32)
        .map(|id| node_buffer_level(id, n_sat, satellites, groundstations))
        .chain((0..groundstations.len() as u32).map(|id| node_buffer_level(n_sat as u32 + id, n_sat, satellites, groundstations)))
        .collect();
    let outgoing_traffic: Vec<f64> = (0..n_sat as u32)
        .map(|id| node_outgoing_traffic(id, n_sat, satellites, groundstations))
        .chain((0..groundstations.len() as u32).map(|id| node_outgoing_traffic(n_sat as u32 + id, n_sat, satellites, groundstations)))
        .collect();

    for i in 0..n_sat {
        let gen = generation_rate_of(&satellites[i]);
        let mut delay = 0.0;
        let mut per_link: HashMap<u32, Vec<(f64, f64)>> = HashMap::new();

        for stream in &streams_per_satellite[i] {
            let path = &stream.path;
            let traffic = stream.rate;
            let mut stream_delay = 0.0;

            for &node_id in path.iter() {
                let buffer_level = buffer_levels[node_id as usize];
                if buffer_level > 0.0 {
                    let traffic_out = outgoing_traffic[node_id as usize];
                    if traffic_out > 0.0 {
                        stream_delay += buffer_level / traffic_out;
                    }
                }
            }

            for j in 0..path.len().saturating_sub(1) {
                let current = positions[path[j] as usize];
                let next = positions[path[j + 1] as usize];
                stream_delay += current.distance_to(&next) / SPEED_OF_LIGHT_M_PER_MS;
            }

            if let Some(link) = path.get(1).copied() {
                per_link.entry(link).or_default().push((traffic, stream_delay));
            }

            if gen > 0.0 {
                delay += (traffic * stream_delay) / gen;
            }
        }

        let mut delays_per_outgoing_link = HashMap::new();
        for &target in &satellites[i].target_ids {
            let value = match per_link.get(&target) {
                Some(entries) => {
                    let weighted: f64 = entries.iter().map(|(t, d)| t * d).sum();
                    let total: f64 = entries.iter().map(|(t, _)| t).sum();
                    weighted / total
                }
                None => TTL_MS,
            };
            delays_per_outgoing_link.insert(target, value);
        }

        satellites[i].delay = delay;
        satellites[i].delays_per_outgoing_link = delays_per_outgoing_link;
    }
}

/// Clamps delay/drop-rate against the TTL and derives `cost`.
pub fn compute_cost(sat: &mut Satellite) {
    if sat.delay >= TTL_MS {
        sat.drop_rate = 1.0;
        sat.delay = TTL_MS;
    }
    sat.cost = sat.drop_rate * TTL_MS + (1.0 - sat.drop_rate) * sat.delay;
}

/// Rate-weighted mean hop count over every stream that reached a ground
/// station's core bucket this step.
pub fn average_hops(groundstations: &[Groundstation]) -> f64 {
    let mut weighted_hops = 0.0;
    let mut delivered_rate = 0.0;
    for gs in groundstations {
        for stream in &gs.outgoing_core {
            weighted_hops += stream.hop_count() as f64 * stream.rate;
            delivered_rate += stream.rate;
        }
    }
    if delivered_rate > 0.0 {
        weighted_hops / delivered_rate
    } else {
        0.0
    }
}

/// Aggregate per-step record, per the external evaluation schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub avg_delay: f64,
    pub drop_rate: f64,
    pub generation_rate: f64,
    pub throughput: f64,
    pub avg_hops: f64,
    pub main_link_out_share: f64,
    pub cost: f64,
}

pub fn aggregate_step_metrics(satellites: &[Satellite], groundstations: &[Groundstation]) -> StepMetrics {
    let sum_gen: f64 = satellites.iter().map(|s| s.generation_rate).sum();
    let sum_gen_drop: f64 = satellites.iter().map(|s| s.generation_rate * s.drop_rate).sum();
    let sum_gen_delivered: f64 = satellites
        .iter()
        .map(|s| s.generation_rate * (1.0 - s.drop_rate))
        .sum();
    let sum_gen_delivered_delay: f64 = satellites
        .iter()
        .map(|s| s.generation_rate * (1.0 - s.drop_rate) * s.delay)
        .sum();

    let drop_rate = if sum_gen > 0.0 { sum_gen_drop / sum_gen } else { 0.0 };
    let avg_delay = if sum_gen_delivered > 0.0 {
        sum_gen_delivered_delay / sum_gen_delivered
    } else {
        0.0
    };
    let throughput = (1.0 - drop_rate) * sum_gen;
    let avg_hops = average_hops(groundstations);

    let mut shares = Vec::new();
    for sat in satellites {
        let total: f64 = sat.outgoing_streams.values().flatten().map(|s| s.rate).sum();
        if total > 0.0 {
            if let Some(&first_target) = sat.target_ids.first() {
                let first_rate: f64 = sat
                    .outgoing_streams
                    .get(&first_target)
                    .map(|streams| streams.iter().map(|s| s.rate).sum())
                    .unwrap_or(0.0);
                shares.push(first_rate / total);
            }
        }
    }
    let main_link_out_share = if shares.is_empty() {
        0.0
    } else {
        shares.iter().sum::<f64>() / shares.len() as f64
    };

    let cost = drop_rate * TTL_MS + (1.0 - drop_rate) * avg_delay;

    StepMetrics {
        avg_delay,
        drop_rate,
        generation_rate: sum_gen,
        throughput,
        avg_hops,
        main_link_out_share,
        cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_nodes::Stream;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gs_with_delivery(id: u32, path: Vec<u32>, rate: f64) -> Groundstation {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut gs = Groundstation::new(id, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng);
        gs.outgoing_core = vec![Stream::new(path, rate)];
        gs
    }

    #[test]
    fn drop_rate_is_zero_for_fully_delivered_source() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.generation_rate = 1e9;
        sat.incoming_streams.insert(
            IncomingSource::Generation,
            vec![Stream::new(vec![0], 1e9)],
        );
        let mut satellites = vec![sat];
        let groundstations = vec![gs_with_delivery(1, vec![0, 1], 1e9)];

        update_drop_rates(&mut satellites, &groundstations);
        assert!((satellites[0].drop_rate).abs() < 1e-9);
    }

    #[test]
    fn cost_clamps_to_ttl_when_delay_exceeds_it() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.delay = 500.0;
        sat.drop_rate = 0.0;
        compute_cost(&mut sat);
        assert_eq!(sat.drop_rate, 1.0);
        assert_eq!(sat.delay, TTL_MS);
        assert_eq!(sat.cost, TTL_MS);
    }

    #[test]
    fn average_hops_counts_physical_hops_only() {
        let groundstations = vec![gs_with_delivery(1, vec![0, 1], 10.0)];
        assert_eq!(average_hops(&groundstations), 1.0);

        let groundstations_relay = vec![gs_with_delivery(2, vec![0, 1, 2], 10.0)];
        assert_eq!(average_hops(&groundstations_relay), 2.0);
    }
}

//! The flow propagator: builds, from each satellite's ordered `target_ids`,
//! the set of per-path streams that actually reach the core network,
//! honouring per-link capacity and loop-freedom.
//!
//! This is a straight FIFO work-queue walk, not a solver: the propagator
//! introduces no randomness of its own (link-capacity draws delegate to
//! `constellation-linkphysics`, whose caller supplies the RNG), and its
//! only control input is the order of `target_ids` that strategies set.

use constellation_linkphysics::AttenuationTable;
use constellation_nodes::{satellite_gsl_capacity, satellite_isl_capacity, Groundstation, IncomingSource, Satellite, Stream};
use rand::Rng;
use std::collections::{HashSet, VecDeque};

/// Hard cap on stream-creation events per step, bounding worst-case
/// pathological recirculation. Hitting it is non-fatal: the step's metrics
/// are derived from whatever streams exist at that point.
pub const ITERATION_CAP: u64 = 100_000;

/// Safety margin applied to physical link capacity inside the propagator,
/// independent of the ceiling `outgoing_throughputs` already carries.
const CAPACITY_MARGIN: f64 = 0.9;

fn is_satellite(id: u32, n_satellites: usize) -> bool {
    (id as usize) < n_satellites
}

/// Runs one step's worth of traffic propagation. Resets every node's
/// incoming/outgoing stream buckets, seeds satellite generation, then drains
/// the FIFO work queue until empty or `ITERATION_CAP` is hit.
pub fn propagate_streams<R: Rng + ?Sized>(
    satellites: &mut [Satellite],
    groundstations: &mut [Groundstation],
    attenuation: &AttenuationTable,
    rng: &mut R,
) {
    let n_sat = satellites.len();

    for sat in satellites.iter_mut() {
        sat.incoming_streams.clear();
        sat.outgoing_streams.clear();
    }
    for gs in groundstations.iter_mut() {
        gs.incoming_streams.clear();
        gs.outgoing_core.clear();
    }

    for sat in satellites.iter_mut() {
        if sat.generation_rate > 0.0 {
            sat.incoming_streams.insert(
                IncomingSource::Generation,
                vec![Stream::new(vec![sat.id], sat.generation_rate)],
            );
        }
    }

    let mut queue: VecDeque<u32> = (0..n_sat as u32).collect();
    let mut queued: HashSet<u32> = queue.iter().copied().collect();
    let mut kill_counter: u64 = 0;

    while let Some(node_id) = queue.pop_front() {
        queued.remove(&node_id);

        if kill_counter > ITERATION_CAP {
            tracing::warn!(
                "flow propagator iteration cap ({}) exceeded; emitting partial results",
                ITERATION_CAP
            );
            break;
        }

        if is_satellite(node_id, n_sat) {
            process_satellite(
                node_id,
                satellites,
                groundstations,
                n_sat,
                attenuation,
                rng,
                &mut queue,
                &mut queued,
                &mut kill_counter,
            );
        } else {
            process_groundstation(node_id, n_sat, satellites, groundstations);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_satellite<R: Rng + ?Sized>(
    node_id: u32,
    satellites: &mut [Satellite],
    groundstations: &mut [Groundstation],
    n_sat: usize,
    attenuation: &AttenuationTable,
    rng: &mut R,
    queue: &mut VecDeque<u32>,
    queued: &mut HashSet<u32>,
    kill_counter: &mut u64,
) {
    let node_idx = node_id as usize;
    let target_ids = satellites[node_idx].target_ids.clone();

    let mut remaining_streams: Vec<Stream> = satellites[node_idx]
        .incoming_streams
        .values()
        .flatten()
        .cloned()
        .collect();

    for target in target_ids {
        let (eligible, blocked): (Vec<Stream>, Vec<Stream>) = remaining_streams
            .into_iter()
            .partition(|s| !s.contains(target));

        let total_r: f64 = eligible.iter().map(|s| s.rate).sum();
        if total_r == 0.0 {
            remaining_streams = blocked;
            remaining_streams.extend(eligible);
            break;
        }

        let target_idx = target as usize;
        let physical_capacity = if is_satellite(target, n_sat) {
            satellite_isl_capacity(&satellites[node_idx], &satellites[target_idx])
        } else {
            let gs_index = target_idx - n_sat;
            satellite_gsl_capacity(&satellites[node_idx], &groundstations[gs_index], gs_index, attenuation, rng)
                .unwrap_or(0.0)
        };
        let capacity = CAPACITY_MARGIN * physical_capacity;

        let link_capacity = satellites[node_idx]
            .outgoing_throughputs
            .get(&target)
            .copied()
            .unwrap_or(0.0);

        let new_traffic = link_capacity.min(capacity).min(total_r);
        let s_new = new_traffic / total_r;
        let s_cc = (capacity / total_r).min(1.0);

        let new_streams: Vec<Stream> = eligible
            .iter()
            .map(|s| {
                let mut path = s.path.clone();
                path.push(target);
                Stream::new(path, s_new * s.rate)
            })
            .collect();

        let mut next_remaining = blocked;
        if s_cc < 1.0 {
            for s in &eligible {
                next_remaining.push(Stream::new(s.path.clone(), (1.0 - s_cc) * s.rate));
            }
        }
        remaining_streams = next_remaining;

        *kill_counter += eligible.len() as u64;

        let old_streams = if is_satellite(target, n_sat) {
            satellites[target_idx]
                .incoming_streams
                .get(&IncomingSource::Node(node_id))
                .cloned()
        } else {
            groundstations[target_idx - n_sat]
                .incoming_streams
                .get(&node_id)
                .cloned()
        }
        .unwrap_or_default();

        if is_satellite(target, n_sat) {
            satellites[target_idx]
                .incoming_streams
                .insert(IncomingSource::Node(node_id), new_streams.clone());
        } else {
            groundstations[target_idx - n_sat]
                .incoming_streams
                .insert(node_id, new_streams.clone());
        }
        satellites[node_idx]
            .outgoing_streams
            .insert(target, new_streams.clone());

        if new_streams != old_streams && new_traffic >= 1.0 && !queued.contains(&target) {
            queue.push_back(target);
            queued.insert(target);
        }
    }
}

fn process_groundstation(node_id: u32, n_sat: usize, satellites: &[Satellite], groundstations: &mut [Groundstation]) {
    let _ = satellites;
    let gs = &mut groundstations[node_id as usize - n_sat];

    let remaining_streams: Vec<Stream> = gs.incoming_streams.values().flatten().cloned().collect();
    let total_r: f64 = remaining_streams.iter().map(|s| s.rate).sum();

    gs.outgoing_core = if total_r > 0.0 {
        let new_traffic = gs.outgoing_throughput.min(total_r);
        let share = new_traffic / total_r;
        remaining_streams
            .into_iter()
            .map(|s| Stream::new(s.path, share * s.rate))
            .collect()
    } else {
        Vec::new()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_time::EcefPosition;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn make_gs(id: u32) -> Groundstation {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        Groundstation::new(id, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng)
    }

    #[test]
    fn direct_gsl_delivers_all_traffic_under_capacity() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.generation_rate = 1e9;
        sat.gsl_connections = vec![1];
        sat.target_ids = vec![1];
        sat.outgoing_throughputs.insert(1, 1e10);

        let mut satellites = vec![sat];
        let mut groundstations = vec![make_gs(1)];
        let attenuation = AttenuationTable::new(vec![vec![0.1; 10]], 20.0, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        propagate_streams(&mut satellites, &mut groundstations, &attenuation, &mut rng);

        let delivered: f64 = groundstations[0].outgoing_core.iter().map(|s| s.rate).sum();
        assert!((delivered - 1e9).abs() < 1.0);
    }

    #[test]
    fn capacity_cap_drops_excess_traffic() {
        let mut sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        sat.generation_rate = 1e9;
        sat.gsl_connections = vec![1];
        sat.target_ids = vec![1];
        sat.outgoing_throughputs.insert(1, 5e8);

        let mut satellites = vec![sat];
        let mut groundstations = vec![make_gs(1)];
        let attenuation = AttenuationTable::new(vec![vec![0.1; 10]], 20.0, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        propagate_streams(&mut satellites, &mut groundstations, &attenuation, &mut rng);

        let delivered: f64 = groundstations[0].outgoing_core.iter().map(|s| s.rate).sum();
        assert!((delivered - 0.9 * 5e8).abs() < 1.0);
    }

    #[test]
    fn loop_target_is_skipped_and_traffic_still_reaches_core() {
        // A -> B, B -> [A, gs]. A's traffic must flow through B to the gs
        // even though B also lists A as a (loop) target.
        let mut a = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        a.generation_rate = 1e9;
        a.isl_connections = vec![1];
        a.target_ids = vec![1];
        a.outgoing_throughputs.insert(1, 1e10);

        let mut b = Satellite::new(1, EcefPosition::new(7_001_000.0, 0.0, 0.0));
        b.isl_connections = vec![0];
        b.gsl_connections = vec![2];
        b.target_ids = vec![0, 2];
        b.outgoing_throughputs.insert(0, 1e10);
        b.outgoing_throughputs.insert(2, 1e10);

        let mut satellites = vec![a, b];
        let mut groundstations = vec![make_gs(2)];
        let attenuation = AttenuationTable::new(vec![vec![0.1; 10]], 20.0, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        propagate_streams(&mut satellites, &mut groundstations, &attenuation, &mut rng);

        let delivered: f64 = groundstations[0].outgoing_core.iter().map(|s| s.rate).sum();
        assert!(delivered > 0.0);
        for stream in &groundstations[0].outgoing_core {
            let mut seen = HashSet::new();
            for &id in &stream.path {
                assert!(seen.insert(id), "path must not repeat a node");
            }
        }
    }
}

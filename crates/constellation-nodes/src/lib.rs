//! Satellite and ground-station state: per-entity mutable data plus the
//! buffer and delay models that feed the cost function. Nodes are plain
//! data addressed by integer id, never by pointer, so the constellation can
//! be held as two flat `Vec`s (per the "cyclic ownership" design note: no
//! node holds a reference to another).

use constellation_linkphysics::{self as physics, AttenuationTable, GslLinkParams, IslLinkParams};
use constellation_time::EcefPosition;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const SATELLITE_BUFFER_BITS: f64 = 4e8;
pub const GROUNDSTATION_BUFFER_BITS: f64 = 8e9;
pub const GROUNDSTATION_OUTGOING_THROUGHPUT_BPS: f64 = 5e10;
pub const GS_DELAY_LOWER_MS: f64 = 1.0;
pub const GS_DELAY_UPPER_MS: f64 = 5.0;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    LinkPhysics(#[from] physics::LinkPhysicsError),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Source key for a node's incoming-stream buckets. `Generation` is the
/// reserved source representing a satellite's own locally generated load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncomingSource {
    Generation,
    Node(u32),
}

/// A single `(path, rate)` stream. `path` traces hop ids back to the
/// originating satellite; it never repeats an id (loop-freedom is enforced
/// by the propagator, not this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub path: Vec<u32>,
    pub rate: f64,
}

impl Stream {
    pub fn new(path: Vec<u32>, rate: f64) -> Self {
        Self { path, rate }
    }

    pub fn source(&self) -> u32 {
        self.path[0]
    }

    pub fn contains(&self, node: u32) -> bool {
        self.path.contains(&node)
    }

    /// Number of physical hops between source and the ground station that
    /// last carried this stream (excludes the conceptual ground-to-core
    /// uplink, which is not a simulated link).
    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
pub struct Satellite {
    pub id: u32,
    pub position: EcefPosition,
    pub isl_params: IslLinkParams,
    pub gsl_params: GslLinkParams,

    pub isl_connections: Vec<u32>,
    pub visible_groundstations: Vec<u32>,
    pub gsl_connections: Vec<u32>,
    pub target_ids: Vec<u32>,
    pub outgoing_throughputs: HashMap<u32, f64>,
    pub generation_rate: f64,

    pub incoming_streams: HashMap<IncomingSource, Vec<Stream>>,
    pub outgoing_streams: HashMap<u32, Vec<Stream>>,

    pub buffer_level: f64,
    pub delay: f64,
    pub delays_per_outgoing_link: HashMap<u32, f64>,
    pub drop_rate: f64,
    pub local_drop_rate: f64,
    pub incoming_data: f64,
    pub cost: f64,

    pub failed_isl: bool,
    pub failed_gsl: bool,
}

impl Satellite {
    pub fn new(id: u32, position: EcefPosition) -> Self {
        Self {
            id,
            position,
            isl_params: IslLinkParams::default(),
            gsl_params: GslLinkParams::default(),
            isl_connections: Vec::new(),
            visible_groundstations: Vec::new(),
            gsl_connections: Vec::new(),
            target_ids: Vec::new(),
            outgoing_throughputs: HashMap::new(),
            generation_rate: 0.0,
            incoming_streams: HashMap::new(),
            outgoing_streams: HashMap::new(),
            buffer_level: 0.0,
            delay: 0.0,
            delays_per_outgoing_link: HashMap::new(),
            drop_rate: 0.0,
            local_drop_rate: 0.0,
            incoming_data: 0.0,
            cost: 0.0,
            failed_isl: false,
            failed_gsl: false,
        }
    }

    pub fn update_generation_rate(&mut self, data_generation: f64, growth_factor: f64) {
        self.generation_rate = growth_factor * data_generation;
    }

    /// Union of ISL and GSL neighbours, the action set every strategy
    /// chooses `target_ids` from.
    pub fn available_targets(&self) -> Vec<u32> {
        let mut targets = self.isl_connections.clone();
        targets.extend(self.gsl_connections.iter().copied());
        targets
    }
}

#[derive(Debug, Clone)]
pub struct Groundstation {
    pub id: u32,
    pub position: EcefPosition,
    pub outgoing_throughput: f64,
    pub buffer_level: f64,
    pub incoming_streams: HashMap<u32, Vec<Stream>>,
    pub outgoing_core: Vec<Stream>,
    pub delay_lower_limit: f64,
    pub delay_upper_limit: f64,
    pub delay: f64,
    pub drop_rate: f64,
    pub failed: bool,
}

impl Groundstation {
    pub fn new<R: Rng + ?Sized>(id: u32, position: EcefPosition, rng: &mut R) -> Self {
        let delay = rng.gen_range(GS_DELAY_LOWER_MS..=GS_DELAY_UPPER_MS);
        Self {
            id,
            position,
            outgoing_throughput: GROUNDSTATION_OUTGOING_THROUGHPUT_BPS,
            buffer_level: 0.0,
            incoming_streams: HashMap::new(),
            outgoing_core: Vec::new(),
            delay_lower_limit: GS_DELAY_LOWER_MS,
            delay_upper_limit: GS_DELAY_UPPER_MS,
            delay,
            drop_rate: 0.0,
            failed: false,
        }
    }

    pub fn update_buffer(&mut self) {
        let outgoing_traffic: f64 = self.outgoing_core.iter().map(|s| s.rate).sum();
        self.buffer_level = if outgoing_traffic >= self.outgoing_throughput {
            GROUNDSTATION_BUFFER_BITS
        } else {
            0.0
        };
    }

    /// Mean-reverting Gaussian random walk clipped to `[1, 5] ms`, plus
    /// queuing delay from the current buffer level.
    pub fn update_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let center = (self.delay_lower_limit + self.delay_upper_limit) / 2.0;
        let sigma = (self.delay_upper_limit - self.delay_lower_limit) / 6.0;

        self.delay += physics::sample_gaussian(rng, 0.0, sigma);
        self.delay += (center - self.delay) * 0.1;
        self.delay = self.delay.clamp(self.delay_lower_limit, self.delay_upper_limit);

        let queuing_delay = self.buffer_level / self.outgoing_throughput;
        self.delay += queuing_delay;
    }
}

/// Physical ISL capacity between two satellites.
pub fn satellite_isl_capacity(sat: &Satellite, other: &Satellite) -> f64 {
    let distance = sat.position.distance_to(&other.position);
    physics::isl_capacity(&sat.isl_params, distance, sat.failed_isl)
}

/// Physical GSL capacity from a satellite to a ground station. `gs_index` is
/// the ground station's row in `attenuation` (`gs.id - n_satellites`).
pub fn satellite_gsl_capacity<R: Rng + ?Sized>(
    sat: &Satellite,
    gs: &Groundstation,
    gs_index: usize,
    attenuation: &AttenuationTable,
    rng: &mut R,
) -> Result<f64> {
    let elevation = physics::elevation_deg(sat.position, gs.position);
    let distance = sat.position.distance_to(&gs.position);
    let attenuation_db = attenuation.lookup(gs_index, elevation)?;
    let failed = sat.failed_gsl || gs.failed;
    Ok(physics::gsl_capacity(&sat.gsl_params, distance, attenuation_db, failed, rng))
}

/// Recomputes every satellite's `outgoing_throughputs` ceiling for its
/// current `target_ids`, clamping negative results to zero.
pub fn update_outgoing_throughputs<R: Rng + ?Sized>(
    satellites: &mut [Satellite],
    groundstations: &[Groundstation],
    attenuation: &AttenuationTable,
    rng: &mut R,
) -> Result<()> {
    let n_sat = satellites.len();

    for i in 0..n_sat {
        let target_ids = satellites[i].target_ids.clone();
        let mut throughputs = HashMap::with_capacity(target_ids.len());

        for target_id in target_ids {
            let value = if satellites[i].isl_connections.contains(&target_id) {
                satellite_isl_capacity(&satellites[i], &satellites[target_id as usize])
            } else if satellites[i].gsl_connections.contains(&target_id) {
                let gs_index = target_id as usize - n_sat;
                satellite_gsl_capacity(&satellites[i], &groundstations[gs_index], gs_index, attenuation, rng)?
            } else {
                0.0
            };
            throughputs.insert(target_id, value.max(0.0));
        }

        satellites[i].outgoing_throughputs = throughputs;
    }

    Ok(())
}

/// Recomputes every satellite's buffer occupancy: full if queued outgoing
/// traffic meets/exceeds its aggregate outgoing capacity, otherwise empty.
pub fn update_satellite_buffers<R: Rng + ?Sized>(
    satellites: &mut [Satellite],
    groundstations: &[Groundstation],
    attenuation: &AttenuationTable,
    rng: &mut R,
) -> Result<()> {
    let n_sat = satellites.len();

    for i in 0..n_sat {
        let outgoing_traffic: f64 = satellites[i]
            .outgoing_streams
            .values()
            .flatten()
            .map(|s| s.rate)
            .sum();

        let target_ids = satellites[i].target_ids.clone();
        let mut outgoing_capacity = 0.0;
        for target_id in target_ids {
            let physical = if satellites[i].isl_connections.contains(&target_id) {
                satellite_isl_capacity(&satellites[i], &satellites[target_id as usize])
            } else {
                let gs_index = target_id as usize - n_sat;
                satellite_gsl_capacity(&satellites[i], &groundstations[gs_index], gs_index, attenuation, rng)?
            };
            let throughput = satellites[i]
                .outgoing_throughputs
                .get(&target_id)
                .copied()
                .unwrap_or(0.0);
            outgoing_capacity += physical.min(throughput);
        }

        satellites[i].buffer_level = if outgoing_traffic >= outgoing_capacity {
            SATELLITE_BUFFER_BITS
        } else {
            0.0
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sat_at(id: u32, x: f64) -> Satellite {
        Satellite::new(id, EcefPosition::new(x, 0.0, 0.0))
    }

    #[test]
    fn stream_hop_count_excludes_generation_self_loop() {
        let direct = Stream::new(vec![3, 640], 1.0);
        assert_eq!(direct.hop_count(), 1);

        let relay = Stream::new(vec![3, 9, 640], 1.0);
        assert_eq!(relay.hop_count(), 2);
    }

    #[test]
    fn groundstation_delay_stays_within_bounds_over_many_steps() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut gs = Groundstation::new(640, EcefPosition::new(6.37e6, 0.0, 0.0), &mut rng);
        for _ in 0..500 {
            gs.update_delay(&mut rng);
            assert!(gs.delay >= gs.delay_lower_limit - 1e-6);
        }
    }

    #[test]
    fn satellite_buffer_fills_when_traffic_exceeds_capacity() {
        let mut satellites = vec![sat_at(0, 7_000_000.0), sat_at(1, 7_000_000.0 + 5_000_000.0)];
        satellites[0].isl_connections = vec![1];
        satellites[0].target_ids = vec![1];
        satellites[0]
            .outgoing_streams
            .insert(1, vec![Stream::new(vec![0, 1], 1e12)]);
        satellites[0].outgoing_throughputs.insert(1, 1.0);

        let groundstations: Vec<Groundstation> = Vec::new();
        let attenuation = AttenuationTable::new(vec![], 20.0, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        update_satellite_buffers(&mut satellites, &groundstations, &attenuation, &mut rng).unwrap();
        assert_eq!(satellites[0].buffer_level, SATELLITE_BUFFER_BITS);
    }
}

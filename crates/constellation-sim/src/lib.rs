//! Orchestration: binds geometry/time (C1), link physics (C2), node state
//! (C3), the topology builder (C4), the flow propagator (C5), the metric
//! evaluator (C6) and a `Strategy` (C7) into one per-step function, so
//! `constellation-runner` only has to drive input loading, the worker pool
//! and output — never reimplement the per-step sequencing itself. Mirrors
//! how the teacher's `candidate-selector` crate keeps `loader`/`scorer`/
//! `selector` as library logic behind a thin `main.rs`.

use constellation_linkphysics::AttenuationTable;
use constellation_metrics::{self as metrics, StepMetrics};
use constellation_nodes::{self as nodes, Groundstation, NodeError, Satellite};
use constellation_propagator::propagate_streams;
use constellation_strategy::Strategy;
use constellation_time::{EcefPosition, SimTime};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("step input satellite count {got} does not match constellation size {expected}")]
    SatelliteCountMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, SimError>;

/// The whole constellation's live state; created once at init and mutated
/// step by step for the remainder of the run.
pub struct Constellation {
    pub satellites: Vec<Satellite>,
    pub groundstations: Vec<Groundstation>,
}

impl Constellation {
    pub fn new(satellites: Vec<Satellite>, groundstations: Vec<Groundstation>) -> Self {
        Self {
            satellites,
            groundstations,
        }
    }
}

/// Parameters fixed for the whole run (not per-step).
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub growth_factor: f64,
    pub antennas_per_groundstation: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            growth_factor: 2.0,
            antennas_per_groundstation: constellation_topology::ANTENNAS_PER_GROUNDSTATION,
        }
    }
}

/// One step's worth of precomputed, time-varying inputs: satellite
/// positions, ISL neighbour lists, GS visibility lists and per-satellite
/// data-generation rates, all indexed by satellite id.
pub struct StepInput {
    pub satellite_positions: Vec<EcefPosition>,
    pub isl_neighbours: Vec<Vec<u32>>,
    pub visible_groundstations: Vec<Vec<u32>>,
    pub data_generation: Vec<f64>,
}

/// Which links/ground-stations are currently failed, sampled once at
/// `FAILURE_TIME` and cleared at `RESET_TIME` by the caller.
#[derive(Debug, Clone, Default)]
pub struct FailureMasks {
    pub isl_failed: Vec<bool>,
    pub gsl_failed: Vec<bool>,
    pub gs_failed: Vec<bool>,
}

impl FailureMasks {
    /// No satellite or ground station currently failed.
    pub fn none(n_sat: usize, n_gs: usize) -> Self {
        Self {
            isl_failed: vec![false; n_sat],
            gsl_failed: vec![false; n_sat],
            gs_failed: vec![false; n_gs],
        }
    }
}

/// Runs exactly one simulation step, in the order `spec.md` §5 fixes: load
/// (already done by the caller into `input`) → apply failures → GSL
/// assignment → strategy `set_targets` → outgoing-throughput update →
/// propagation → buffer/delay/drop-rate/cost → aggregate metrics → strategy
/// `learn`.
pub fn run_step<R: Rng + ?Sized>(
    constellation: &mut Constellation,
    strategy: &mut dyn Strategy,
    attenuation: &AttenuationTable,
    input: &StepInput,
    failures: &FailureMasks,
    current_time: SimTime,
    config: &RunConfig,
    rng: &mut R,
) -> Result<StepMetrics> {
    let n_sat = constellation.satellites.len();
    if input.satellite_positions.len() != n_sat {
        return Err(SimError::SatelliteCountMismatch {
            expected: n_sat,
            got: input.satellite_positions.len(),
        });
    }

    for i in 0..n_sat {
        let sat = &mut constellation.satellites[i];
        sat.position = input.satellite_positions[i];
        sat.isl_connections = input.isl_neighbours[i].clone();
        sat.visible_groundstations = input.visible_groundstations[i].clone();
        sat.update_generation_rate(input.data_generation[i], config.growth_factor);
        sat.failed_isl = failures.isl_failed.get(i).copied().unwrap_or(false);
        sat.failed_gsl = failures.gsl_failed.get(i).copied().unwrap_or(false);
    }
    for (i, gs) in constellation.groundstations.iter_mut().enumerate() {
        gs.failed = failures.gs_failed.get(i).copied().unwrap_or(false);
    }

    constellation_topology::assign_gsl_connections(
        &mut constellation.satellites,
        &constellation.groundstations,
        config.antennas_per_groundstation,
    );

    strategy.set_targets(&mut constellation.satellites, &constellation.groundstations, current_time);

    nodes::update_outgoing_throughputs(
        &mut constellation.satellites,
        &constellation.groundstations,
        attenuation,
        rng,
    )?;

    propagate_streams(
        &mut constellation.satellites,
        &mut constellation.groundstations,
        attenuation,
        rng,
    );

    nodes::update_satellite_buffers(
        &mut constellation.satellites,
        &constellation.groundstations,
        attenuation,
        rng,
    )?;
    for gs in constellation.groundstations.iter_mut() {
        gs.update_buffer();
        gs.update_delay(rng);
    }

    metrics::update_drop_rates(&mut constellation.satellites, &constellation.groundstations);
    metrics::update_delays(&mut constellation.satellites, &constellation.groundstations);
    for sat in constellation.satellites.iter_mut() {
        metrics::update_local_drop_rate(sat);
        metrics::compute_cost(sat);
    }

    let step_metrics = metrics::aggregate_step_metrics(&constellation.satellites, &constellation.groundstations);

    strategy.learn(&constellation.satellites, &constellation.groundstations, current_time);

    Ok(step_metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_strategy::BentPipe;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn single_sat_single_gs() -> (Constellation, AttenuationTable) {
        let sat = Satellite::new(0, EcefPosition::new(7_000_000.0, 0.0, 0.0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let gs = Groundstation::new(1, EcefPosition::new(6_378_137.0, 0.0, 0.0), &mut rng);
        let attenuation = AttenuationTable::new(vec![vec![0.1; 10]], 20.0, 0.1);
        (Constellation::new(vec![sat], vec![gs]), attenuation)
    }

    #[test]
    fn isolated_source_direct_gsl_delivers_with_zero_drop() {
        let (mut constellation, attenuation) = single_sat_single_gs();
        constellation.satellites[0].visible_groundstations = vec![1];

        let mut strategy = BentPipe::new(0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = RunConfig::default();
        let now = SimTime::parse("2023-09-28 08:26:00").unwrap();

        let input = StepInput {
            satellite_positions: vec![constellation.satellites[0].position],
            isl_neighbours: vec![vec![]],
            visible_groundstations: vec![vec![1]],
            data_generation: vec![1e9 / config.growth_factor],
        };
        let failures = FailureMasks::none(1, 1);

        let step_metrics = run_step(
            &mut constellation,
            &mut strategy,
            &attenuation,
            &input,
            &failures,
            now,
            &config,
            &mut rng,
        )
        .unwrap();

        assert_eq!(constellation.satellites[0].target_ids, vec![1]);
        assert!((constellation.satellites[0].drop_rate).abs() < 1e-9);
        assert!(step_metrics.drop_rate.abs() < 1e-9);
    }

    #[test]
    fn satellite_count_mismatch_is_reported() {
        let (mut constellation, attenuation) = single_sat_single_gs();
        let mut strategy = BentPipe::new(0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = RunConfig::default();
        let now = SimTime::parse("2023-09-28 08:26:00").unwrap();

        let input = StepInput {
            satellite_positions: vec![],
            isl_neighbours: vec![],
            visible_groundstations: vec![],
            data_generation: vec![],
        };
        let failures = FailureMasks::none(1, 1);

        let err = run_step(
            &mut constellation,
            &mut strategy,
            &attenuation,
            &input,
            &failures,
            now,
            &config,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::SatelliteCountMismatch { expected: 1, got: 0 }));
    }
}

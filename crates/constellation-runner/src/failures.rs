//! Failure-mask scheduling: samples which satellites/ground-stations are
//! failed once at `FAILURE_TIME` and clears the mask at `RESET_TIME`,
//! mirroring `original_source/main.py`'s `gsl_failures_satellites`,
//! `isl_failures_satellites` and `network_failure_groundstations`, which
//! compare the current timestamp string against the two constants exactly
//! rather than a `>=`/`<` range test.

use constellation_sim::FailureMasks;
use constellation_time::SimTime;
use rand::Rng;

pub const GSL_FAILURE_SHARE: f64 = 0.03;
pub const ISL_FAILURE_SHARE: f64 = 0.50;
pub const GS_FAILURE_SHARE: f64 = 0.50;

/// Which individual ids are currently failed, carried from step to step.
#[derive(Debug, Clone, Default)]
pub struct FailureState {
    pub isl_failed_ids: Vec<u32>,
    pub gsl_failed_ids: Vec<u32>,
    pub gs_failed_ids: Vec<u32>,
}

fn sample_ids<R: Rng + ?Sized>(n: usize, share: f64, rng: &mut R) -> Vec<u32> {
    let k = ((n as f64) * share) as usize;
    rand::seq::index::sample(rng, n, k.min(n))
        .iter()
        .map(|i| i as u32)
        .collect()
}

/// Updates `state` in place for the current step: samples a fresh failure
/// set exactly at `failure_time`, clears it exactly at `reset_time`, leaves
/// it untouched otherwise.
#[allow(clippy::too_many_arguments)]
pub fn update<R: Rng + ?Sized>(
    state: &mut FailureState,
    current_time: SimTime,
    failure_time: SimTime,
    reset_time: SimTime,
    n_sat: usize,
    n_gs: usize,
    isl_failures_enabled: bool,
    gsl_failures_enabled: bool,
    gs_failures_enabled: bool,
    rng: &mut R,
) {
    if isl_failures_enabled {
        if current_time == failure_time {
            tracing::warn!("ISL network failure triggered");
            state.isl_failed_ids = sample_ids(n_sat, ISL_FAILURE_SHARE, rng);
        } else if current_time == reset_time {
            tracing::info!("ISL network failure reset");
            state.isl_failed_ids.clear();
        }
    }

    if gsl_failures_enabled {
        if current_time == failure_time {
            tracing::warn!("GSL network failure triggered");
            state.gsl_failed_ids = sample_ids(n_sat, GSL_FAILURE_SHARE, rng);
        } else if current_time == reset_time {
            tracing::info!("GSL network failure reset");
            state.gsl_failed_ids.clear();
        }
    }

    if gs_failures_enabled {
        if current_time == failure_time {
            tracing::warn!("ground station failure triggered");
            state.gs_failed_ids = sample_ids(n_gs, GS_FAILURE_SHARE, rng);
        } else if current_time == reset_time {
            tracing::info!("ground station failure reset");
            state.gs_failed_ids.clear();
        }
    }
}

/// Expands `state`'s id lists into dense per-node boolean masks for
/// `constellation_sim::run_step`.
pub fn to_masks(state: &FailureState, n_sat: usize, n_gs: usize) -> FailureMasks {
    let mut masks = FailureMasks::none(n_sat, n_gs);
    for &id in &state.isl_failed_ids {
        if let Some(slot) = masks.isl_failed.get_mut(id as usize) {
            *slot = true;
        }
    }
    for &id in &state.gsl_failed_ids {
        if let Some(slot) = masks.gsl_failed.get_mut(id as usize) {
            *slot = true;
        }
    }
    for &id in &state.gs_failed_ids {
        if let Some(slot) = masks.gs_failed.get_mut(id as usize) {
            *slot = true;
        }
    }
    masks
}

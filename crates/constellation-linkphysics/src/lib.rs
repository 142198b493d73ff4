//! ISL and GSL Shannon-capacity link models.
//!
//! Capacities are derived straight from the link budget: effective aperture
//! area, received power density, and thermal noise power feed a
//! Shannon-Hartley bound. Failed links always report 1 bps rather than 0, so
//! that downstream code can still divide by a link's "capacity" without a
//! zero-check.

use constellation_time::EcefPosition;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkPhysicsError {
    #[error("attenuation table index out of range: gs {gs_index} bin {bin}")]
    AttenuationOutOfRange { gs_index: usize, bin: usize },
}

pub type Result<T> = std::result::Result<T, LinkPhysicsError>;

const BOLTZMANN_K: f64 = 1.38e-23;

/// Physical constants of an inter-satellite laser link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IslLinkParams {
    pub bandwidth_hz: f64,
    pub laser_power_w: f64,
    pub aperture_diameter_m: f64,
    pub noise_temperature_k: f64,
    pub beam_divergence_rad: f64,
    pub pointing_loss: f64,
    /// The reference implementation's "upload factor" applied to the whole
    /// Shannon bound; preserved verbatim though its physical meaning for an
    /// ISL link (as opposed to a GSL uplink) is undocumented upstream.
    pub upload_factor: f64,
}

impl Default for IslLinkParams {
    fn default() -> Self {
        Self {
            bandwidth_hz: 5e9,
            laser_power_w: 0.1,
            aperture_diameter_m: 0.1,
            noise_temperature_k: 290.0,
            beam_divergence_rad: 1.744e-5,
            pointing_loss: 0.9,
            upload_factor: 0.08,
        }
    }
}

/// Shannon capacity of an ISL link over `distance_m`, in bits/second.
/// Returns `1.0` if the link has failed.
pub fn isl_capacity(params: &IslLinkParams, distance_m: f64, failed: bool) -> f64 {
    if failed {
        return 1.0;
    }

    let effective_area = std::f64::consts::PI * (params.aperture_diameter_m / 2.0).powi(2);
    let received_power_density =
        params.laser_power_w / (std::f64::consts::PI * (distance_m * params.beam_divergence_rad).powi(2));
    let received_power = received_power_density * effective_area * params.pointing_loss;
    let noise_power = BOLTZMANN_K * params.noise_temperature_k * params.bandwidth_hz;

    params.upload_factor * params.bandwidth_hz * (1.0 + received_power / noise_power).log2()
}

/// Physical constants of a ground-station radio link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GslLinkParams {
    pub bandwidth_hz: f64,
    pub mean_radiant_temperature_k: f64,
    pub eirp_dbw: f64,
    pub receiver_gain_db: f64,
    pub carrier_freq_hz: f64,
    pub min_elevation_deg: f64,
    pub max_elevation_deg: f64,
    pub elevation_bin_deg: f64,
    /// Gaussian perturbation std-dev applied (as a multiplier around 1.0) to
    /// the looked-up atmospheric attenuation.
    pub attenuation_noise_sigma: f64,
    /// Gaussian perturbation std-dev applied to the thermal noise power.
    pub noise_power_sigma: f64,
}

const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

impl Default for GslLinkParams {
    fn default() -> Self {
        Self {
            bandwidth_hz: 250e6,
            mean_radiant_temperature_k: 275.0,
            eirp_dbw: 34.6,
            receiver_gain_db: 10.8,
            carrier_freq_hz: 19e9,
            min_elevation_deg: 20.0,
            max_elevation_deg: 90.0,
            elevation_bin_deg: 0.1,
            attenuation_noise_sigma: 0.05,
            noise_power_sigma: 0.02,
        }
    }
}

/// Precomputed per-ground-station atmospheric attenuation lookup table,
/// indexed by elevation bin. Shape `[n_ground_stations, n_elevation_bins]`.
#[derive(Debug, Clone)]
pub struct AttenuationTable {
    rows: Vec<Vec<f64>>,
    min_elevation_deg: f64,
    bin_deg: f64,
}

impl AttenuationTable {
    pub fn new(rows: Vec<Vec<f64>>, min_elevation_deg: f64, bin_deg: f64) -> Self {
        Self {
            rows,
            min_elevation_deg,
            bin_deg,
        }
    }

    fn bin_index(&self, elevation_deg: f64, n_bins: usize) -> usize {
        // argmin over the bin centres, matching the reference's
        // `np.argmin(abs(arange(min, max, step) - elevation))`.
        let raw = (elevation_deg - self.min_elevation_deg) / self.bin_deg;
        raw.round().clamp(0.0, (n_bins.saturating_sub(1)) as f64) as usize
    }

    /// Atmospheric attenuation in dB for `gs_index` at `elevation_deg`.
    pub fn lookup(&self, gs_index: usize, elevation_deg: f64) -> Result<f64> {
        let row = self
            .rows
            .get(gs_index)
            .ok_or(LinkPhysicsError::AttenuationOutOfRange {
                gs_index,
                bin: 0,
            })?;
        let bin = self.bin_index(elevation_deg, row.len());
        row.get(bin)
            .copied()
            .ok_or(LinkPhysicsError::AttenuationOutOfRange { gs_index, bin })
    }
}

/// Elevation angle (degrees) of a ground station as seen from a satellite,
/// both expressed as 3-D ECEF positions.
pub fn elevation_deg(satellite: EcefPosition, ground_station: EcefPosition) -> f64 {
    let dot = satellite.x * ground_station.x
        + satellite.y * ground_station.y
        + satellite.z * ground_station.z;
    let mag_s = (satellite.x.powi(2) + satellite.y.powi(2) + satellite.z.powi(2)).sqrt();
    let mag_g = (ground_station.x.powi(2) + ground_station.y.powi(2) + ground_station.z.powi(2)).sqrt();
    let cos_angle = (dot / (mag_s * mag_g)).clamp(-1.0, 1.0);
    let angle_rad = cos_angle.acos();
    90.0 - angle_rad.to_degrees()
}

/// Shannon capacity of a GSL link, in bits/second. `attenuation_db` is the
/// table lookup for the current elevation; perturbations are drawn from
/// `rng` so the caller controls determinism.
#[allow(clippy::too_many_arguments)]
pub fn gsl_capacity<R: Rng + ?Sized>(
    params: &GslLinkParams,
    distance_m: f64,
    attenuation_db: f64,
    failed: bool,
    rng: &mut R,
) -> f64 {
    if failed {
        return 1.0;
    }

    let attenuation_db = attenuation_db
        * sample_gaussian(rng, 1.0, params.attenuation_noise_sigma);

    let fspl_db = 20.0
        * (4.0 * std::f64::consts::PI * distance_m * params.carrier_freq_hz / SPEED_OF_LIGHT_M_PER_S)
            .log10();

    let t_sky = params.mean_radiant_temperature_k * (1.0 - 10f64.powf(-attenuation_db / 10.0))
        + 2.7 * 10f64.powf(-attenuation_db / 10.0);

    let noise_power = BOLTZMANN_K * params.bandwidth_hz * t_sky
        * sample_gaussian(rng, 1.0, params.noise_power_sigma);

    let received_power_dbw =
        params.eirp_dbw - fspl_db + params.receiver_gain_db - attenuation_db;
    let received_power_w = 10f64.powf(received_power_dbw / 10.0);

    params.bandwidth_hz * (1.0 + received_power_w / noise_power).log2()
}

/// Samples `N(mean, sigma)` via Box-Muller. Shared with `constellation-nodes`
/// for the ground-station delay random walk, which needs the identical
/// Gaussian primitive, not just the link-noise use here.
pub fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    mean + sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn failed_isl_link_reports_one_bps() {
        let params = IslLinkParams::default();
        assert_eq!(isl_capacity(&params, 1000.0, true), 1.0);
    }

    #[test]
    fn isl_capacity_decreases_with_distance() {
        let params = IslLinkParams::default();
        let near = isl_capacity(&params, 1_000_000.0, false);
        let far = isl_capacity(&params, 5_000_000.0, false);
        assert!(near > far);
        assert!(near > 0.0 && far > 0.0);
    }

    #[test]
    fn elevation_of_subsatellite_point_is_ninety_degrees() {
        let sat = EcefPosition::new(7_000_000.0, 0.0, 0.0);
        let gs = EcefPosition::new(6_378_137.0, 0.0, 0.0);
        let elev = elevation_deg(sat, gs);
        assert!((elev - 90.0).abs() < 1e-6);
    }

    #[test]
    fn attenuation_table_bins_by_nearest_elevation() {
        let table = AttenuationTable::new(vec![vec![1.0, 2.0, 3.0, 4.0]], 20.0, 0.1);
        assert_eq!(table.lookup(0, 20.0).unwrap(), 1.0);
        assert_eq!(table.lookup(0, 20.35).unwrap(), 4.0);
    }

    #[test]
    fn failed_gsl_link_reports_one_bps() {
        let params = GslLinkParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(gsl_capacity(&params, 800_000.0, 0.5, true, &mut rng), 1.0);
    }

    #[test]
    fn gsl_capacity_is_finite_and_positive() {
        let params = GslLinkParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let cap = gsl_capacity(&params, 800_000.0, 0.5, false, &mut rng);
        assert!(cap.is_finite());
        assert!(cap > 0.0);
    }
}

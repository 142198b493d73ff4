//! ECEF geometry and simulation time stepping shared by every other
//! constellation crate.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("invalid timestamp string: {0}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, TimeError>;

/// Fixed simulation step size.
pub const STEP_DELTA_SECONDS: i64 = 15;

/// An Earth-Centered-Earth-Fixed position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcefPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EcefPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Longitude in degrees, `atan2(y, x)`.
    pub fn longitude_deg(&self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    /// Latitude in degrees, `atan2(z, hypot(x, y))`.
    pub fn latitude_deg(&self) -> f64 {
        let hyp = (self.x * self.x + self.y * self.y).sqrt();
        self.z.atan2(hyp).to_degrees()
    }

    /// Euclidean distance to another position, in metres.
    pub fn distance_to(&self, other: &EcefPosition) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// UTC wall-clock time, advancing in fixed `STEP_DELTA_SECONDS` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTime(DateTime<Utc>);

impl SimTime {
    /// Parses `"%Y-%m-%d %H:%M:%S"`, the reference implementation's format.
    pub fn parse(s: &str) -> Result<Self> {
        let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| TimeError::InvalidTimestamp(s.to_string()))?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn advance(&self, seconds: i64) -> Self {
        Self(self.0 + chrono::Duration::seconds(seconds))
    }

    pub fn step(&self) -> Self {
        self.advance(STEP_DELTA_SECONDS)
    }

    pub fn hour(&self) -> u32 {
        use chrono::Timelike;
        self.0.hour()
    }

    pub fn inner(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Local-hour offset (0..24) for a given UTC hour and longitude.
///
/// `offset = floor((long + 180) / 15) - 12`; longitude is always in
/// `[-180, 180]` so the floor is equivalent to the reference's truncating
/// `int()` division.
pub fn local_hour(utc_hour: u32, longitude_deg: f64) -> u32 {
    let offset = ((longitude_deg + 180.0) / 15.0).floor() as i64 - 12;
    let wrapped = (utc_hour as i64 + offset).rem_euclid(24);
    wrapped as u32
}

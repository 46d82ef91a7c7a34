//! Sun position.
//!
//! [`SpaSun`] wraps the `solar-positioning` implementation of the NREL SPA.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Sun direction as seen from a point on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunPosition {
    /// Radians clockwise from north.
    pub azimuth: f64,
    /// Radians above the horizon; negative when the sun is below it.
    pub altitude: f64,
}

impl SunPosition {
    /// Build a position from degrees.
    pub fn from_degrees(azimuth: f64, altitude: f64) -> Self {
        Self {
            azimuth: azimuth.to_radians(),
            altitude: altitude.to_radians(),
        }
    }

    /// Whether the sun is strictly above the horizon.
    pub fn is_above_horizon(&self) -> bool {
        self.altitude > 0.0
    }

    /// Azimuth in degrees, `[0, 360)`.
    pub fn azimuth_degrees(&self) -> f64 {
        self.azimuth.to_degrees().rem_euclid(360.0)
    }

    /// Altitude in degrees.
    pub fn altitude_degrees(&self) -> f64 {
        self.altitude.to_degrees()
    }

    /// Zenith angle in radians.
    pub fn zenith(&self) -> f64 {
        std::f64::consts::FRAC_PI_2 - self.altitude
    }
}

/// Source of sun positions.
pub trait SunProvider: Send + Sync {
    /// Sun position at `at` for an observer at `(lat, lon)`.
    fn position(&self, at: DateTime<Utc>, lat: f64, lon: f64) -> Result<SunPosition>;
}

/// Solar position from the NREL Solar Position Algorithm.
///
/// Altitudes include standard atmospheric refraction. The observer is
/// placed at sea level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaSun;

/// Delta T in seconds used when no estimate exists for the date.
const FALLBACK_DELTA_T: f64 = 69.184;

impl SunProvider for SpaSun {
    fn position(&self, at: DateTime<Utc>, lat: f64, lon: f64) -> Result<SunPosition> {
        use solar_positioning::{spa, time::DeltaT, RefractionCorrection};

        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(TerrainError::SunUnavailable(format!(
                "invalid observer location lat={}, lon={}",
                lat, lon
            )));
        }

        let datetime = at.fixed_offset();
        let delta_t = DeltaT::estimate_from_date_like(datetime).unwrap_or(FALLBACK_DELTA_T);
        let position = spa::solar_position(
            datetime,
            lat,
            lon,
            0.0,
            delta_t,
            Some(RefractionCorrection::standard()),
        )
        .map_err(|e| TerrainError::SunUnavailable(e.to_string()))?;

        Ok(SunPosition::from_degrees(
            position.azimuth(),
            position.elevation_angle(),
        ))
    }
}

/// Always returns the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedSun(pub SunPosition);

impl SunProvider for FixedSun {
    fn position(&self, _at: DateTime<Utc>, _lat: f64, _lon: f64) -> Result<SunPosition> {
        Ok(self.0)
    }
}

//! Geographic coordinate model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// A WGS84 point. Latitude and longitude always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

/// Unchecked wire form; deserialization goes through [`Coordinate::new`].
#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = LocationError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::InvalidCoordinate(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidCoordinate(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Build a coordinate from a pair of optional columns.
    ///
    /// Both present gives `Some`, anything else gives `None`.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Self::new(latitude, longitude).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

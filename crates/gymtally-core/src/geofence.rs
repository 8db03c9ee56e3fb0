//! Geofence evaluation for gym presence.
//!
//! Pure math over coordinates and timestamps: no clocks, no storage.
//! The service layer feeds in the prior detection time and acts on the
//! returned status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RewardError;

/// Mean Earth radius in meters, as used by the haversine formula.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Validate and build a coordinate pair.
    ///
    /// Rejects non-finite values and out-of-range degrees before any
    /// distance math can run on them.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RewardError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(RewardError::InvalidLocation(format!(
                "latitude {latitude} out of range [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(RewardError::InvalidLocation(format!(
                "longitude {longitude} out of range [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another point in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// The circular zone around a gym plus its minimum-stay requirement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeofenceZone {
    /// Center of the gym's geofence
    pub center: GeoPoint,

    /// Radius in meters; a point exactly on the boundary counts as inside
    pub radius_m: f64,

    /// Minutes a member must remain inside before the visit counts
    pub min_stay_min: i64,
}

impl GeofenceZone {
    /// Build a zone, validating the radius.
    pub fn new(center: GeoPoint, radius_m: f64, min_stay_min: i64) -> Result<Self, RewardError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(RewardError::InvalidValue {
                field: "radius_m".to_string(),
                message: format!("must be a positive number, got {radius_m}"),
            });
        }
        if min_stay_min < 0 {
            return Err(RewardError::InvalidValue {
                field: "min_stay_min".to_string(),
                message: format!("must not be negative, got {min_stay_min}"),
            });
        }
        Ok(Self {
            center,
            radius_m,
            min_stay_min,
        })
    }
}

/// Outcome of evaluating one location sample against a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceStatus {
    /// Sample falls outside the zone
    Outside,

    /// Sample is inside and no prior detection exists
    Entered,

    /// Sample is inside but the minimum stay has not elapsed yet
    InsidePendingStay,

    /// Sample is inside and the minimum stay has elapsed
    StaySatisfied,
}

/// Stateless evaluator for one gym's zone.
#[derive(Debug, Clone, Copy)]
pub struct GeofenceEvaluator {
    zone: GeofenceZone,
}

impl GeofenceEvaluator {
    pub fn new(zone: GeofenceZone) -> Self {
        Self { zone }
    }

    /// Classify a location sample.
    ///
    /// `detected_at` is the start of the currently tracked presence, if any;
    /// `at` is when the sample was taken. Equal distance and radius counts
    /// as inside, and a stay of exactly `min_stay_min` minutes satisfies
    /// the requirement.
    pub fn evaluate(
        &self,
        point: &GeoPoint,
        detected_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> GeofenceStatus {
        let distance = self.zone.center.distance_m(point);
        if distance > self.zone.radius_m {
            return GeofenceStatus::Outside;
        }

        match detected_at {
            None => GeofenceStatus::Entered,
            Some(since) => {
                let stayed_min = (at - since).num_minutes();
                if stayed_min >= self.zone.min_stay_min {
                    GeofenceStatus::StaySatisfied
                } else {
                    GeofenceStatus::InsidePendingStay
                }
            }
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical trip record and serving-region types.
//!
//! Every record producer (the live open-data feed or the synthetic
//! generator) ends up as a [`TripRecord`] before anything downstream sees
//! it. Calendar features are derived once, at normalization time, through
//! [`CalendarFeatures`].

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Identifier of a pickup/dropoff zone in the fixed location space.
pub type LocationId = u16;

/// Hours of the day (0-23) that count as rush hour.
pub const RUSH_HOURS: [u32; 6] = [7, 8, 9, 17, 18, 19];

/// Where a [`TripRecord`] came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordSource {
    /// NYC Open Data trip feed.
    #[serde(rename = "nyc_open_data")]
    #[strum(serialize = "nyc_open_data")]
    Live,
    /// In-process synthetic generator.
    #[serde(rename = "mock_generator")]
    #[strum(serialize = "mock_generator")]
    Synthetic,
}

/// Latitude/longitude rectangle of the serving region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    /// Southern edge (degrees).
    pub min_latitude: f64,
    /// Northern edge (degrees).
    pub max_latitude: f64,
    /// Western edge (degrees).
    pub min_longitude: f64,
    /// Eastern edge (degrees).
    pub max_longitude: f64,
}

impl BoundingBox {
    /// New York City, as covered by the trip feed.
    pub const NYC: Self = Self {
        min_latitude: 40.6,
        max_latitude: 40.9,
        min_longitude: -74.1,
        max_longitude: -73.7,
    };

    /// Returns `true` if the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }

    /// Returns `true` if the box has a positive extent on both axes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min_latitude < self.max_latitude && self.min_longitude < self.max_longitude
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::NYC
    }
}

/// Calendar features derived from a pickup timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0 through Sunday = 6.
    pub weekday: u32,
    /// Saturday or Sunday.
    pub is_weekend: bool,
    /// Hour is one of [`RUSH_HOURS`].
    pub is_rush_hour: bool,
}

impl CalendarFeatures {
    /// Derives the features for `pickup_time` (interpreted in UTC).
    #[must_use]
    pub fn derive(pickup_time: DateTime<Utc>) -> Self {
        let hour = pickup_time.hour();
        let weekday = pickup_time.weekday().num_days_from_monday();
        Self {
            hour,
            weekday,
            is_weekend: weekday >= 5,
            is_rush_hour: RUSH_HOURS.contains(&hour),
        }
    }
}

/// One normalized ride.
///
/// Field names are the canonical names the synthetic generator emits and
/// the live adapter remaps onto. Coordinates are optional because the
/// newer open-data trip feeds only carry zone ids; when present they lie
/// inside the configured [`BoundingBox`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Unique record id.
    pub id: String,
    /// Pickup timestamp.
    pub pickup_time: DateTime<Utc>,
    /// Dropoff timestamp, never before `pickup_time`.
    pub dropoff_time: Option<DateTime<Utc>>,
    /// Pickup zone. `None` when the source only provided a dropoff zone.
    pub pickup_location_id: Option<LocationId>,
    /// Dropoff zone.
    pub dropoff_location_id: Option<LocationId>,
    /// Number of passengers, at least 1.
    pub passenger_count: u32,
    /// Trip distance in miles.
    pub trip_distance: f64,
    /// Metered fare.
    pub fare_amount: f64,
    /// Tip.
    pub tip_amount: f64,
    /// Total charged.
    pub total_amount: f64,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub dropoff_latitude: Option<f64>,
    pub dropoff_longitude: Option<f64>,
    /// Hour of day of the pickup, 0-23.
    pub pickup_hour: u32,
    /// Day of week of the pickup, Monday = 0.
    pub pickup_weekday: u32,
    pub is_weekend: bool,
    pub is_rush_hour: bool,
    /// Producer that emitted the record.
    pub source: RecordSource,
}

impl TripRecord {
    /// Returns the pickup coordinates when both halves are present.
    #[must_use]
    pub const fn pickup_point(&self) -> Option<(f64, f64)> {
        match (self.pickup_latitude, self.pickup_longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Trip duration in whole minutes, when the dropoff time is known.
    #[must_use]
    pub fn duration_minutes(&self) -> Option<i64> {
        self.dropoff_time
            .map(|dropoff| (dropoff - self.pickup_time).num_minutes())
    }
}

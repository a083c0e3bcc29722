#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-location demand aggregate, anomaly, and forecast types.
//!
//! These are the records the pipeline publishes on its output channels:
//! [`LocationAggregate`]s and [`HeatmapSnapshot`]s on the `aggregated`
//! channel, [`AnomalyEvent`]s on the `anomalies` channel, and
//! [`ForecastPoint`]s on the forecast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use taxi_demand_trip_models::LocationId;

/// Confidence attached to every forecast point.
pub const FORECAST_CONFIDENCE: f64 = 0.8;

/// Coarse three-bucket classification of a location's trip count.
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
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

/// Trip-count cut-offs for [`DemandLevel`]. Both comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandThresholds {
    /// `trip_count` above this is [`DemandLevel::High`].
    pub high: u32,
    /// `trip_count` above this (and not high) is [`DemandLevel::Medium`].
    pub medium: u32,
}

impl DemandThresholds {
    /// Cut-offs for the one-hour heatmap (recency) window.
    pub const HEATMAP: Self = Self {
        high: 15,
        medium: 8,
    };

    /// Cut-offs for the recent-trips (fixed sample) window.
    pub const RECENT_TRIPS: Self = Self {
        high: 10,
        medium: 5,
    };

    /// Classifies a trip count.
    #[must_use]
    pub const fn classify(&self, trip_count: u32) -> DemandLevel {
        if trip_count > self.high {
            DemandLevel::High
        } else if trip_count > self.medium {
            DemandLevel::Medium
        } else {
            DemandLevel::Low
        }
    }
}

/// One location's summary for one window tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAggregate {
    /// Pickup zone.
    pub location_id: LocationId,
    /// End of the window this aggregate covers.
    pub window_end: DateTime<Utc>,
    /// Number of in-window records picked up in this zone.
    pub trip_count: u32,
    pub total_fare: f64,
    pub avg_fare: f64,
    pub total_distance: f64,
    pub avg_distance: f64,
    pub total_passengers: u32,
    pub avg_passengers: f64,
    /// Centroid latitude of contributing records that carry coordinates.
    pub mean_latitude: Option<f64>,
    /// Centroid longitude of contributing records that carry coordinates.
    pub mean_longitude: Option<f64>,
    pub demand_level: DemandLevel,
}

/// Kind of anomaly raised against a [`LocationAggregate`].
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
pub enum AnomalyKind {
    /// Trip count above the high-demand threshold.
    HighDemand,
    /// Trip count positive but below the low-demand threshold.
    LowDemand,
    /// Average fare above the fare threshold.
    HighFare,
}

/// A single threshold breach. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub location_id: LocationId,
    /// The aggregate value that breached the threshold.
    pub observed_value: f64,
    pub threshold: f64,
    pub detected_at: DateTime<Utc>,
}

/// Forecast horizon relative to the aggregate's window end.
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
pub enum ForecastHorizon {
    #[serde(rename = "+1h")]
    #[strum(serialize = "+1h")]
    OneHour,
    #[serde(rename = "+2h")]
    #[strum(serialize = "+2h")]
    TwoHours,
    #[serde(rename = "+3h")]
    #[strum(serialize = "+3h")]
    ThreeHours,
}

impl ForecastHorizon {
    /// All horizons, nearest first.
    pub const ALL: [Self; 3] = [Self::OneHour, Self::TwoHours, Self::ThreeHours];

    /// Number of hours ahead.
    #[must_use]
    pub const fn hours(self) -> i64 {
        match self {
            Self::OneHour => 1,
            Self::TwoHours => 2,
            Self::ThreeHours => 3,
        }
    }

    /// Growth ratio applied to the current trip count.
    #[must_use]
    pub const fn ratio(self) -> f64 {
        match self {
            Self::OneHour => 1.1,
            Self::TwoHours => 1.2,
            Self::ThreeHours => 1.3,
        }
    }
}

/// One projected trip count for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub location_id: LocationId,
    pub horizon: ForecastHorizon,
    pub predicted_trip_count: u32,
    /// Always [`FORECAST_CONFIDENCE`].
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
    /// `generated_at` plus the horizon.
    pub target_time: DateTime<Utc>,
}

/// The full per-location picture for one tick, as drawn on the heatmap.
///
/// Serializes with a `"type": "heatmap"` tag so it can share the
/// `aggregated` channel with bare [`LocationAggregate`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "heatmap")]
pub struct HeatmapSnapshot {
    pub data: Vec<LocationAggregate>,
    pub timestamp: DateTime<Utc>,
}

/// A record on the `aggregated` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatedMessage {
    Heatmap(HeatmapSnapshot),
    Location(LocationAggregate),
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn aggregate(location_id: LocationId, trip_count: u32) -> LocationAggregate {
        LocationAggregate {
            location_id,
            window_end: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            trip_count,
            total_fare: 30.0,
            avg_fare: 10.0,
            total_distance: 6.0,
            avg_distance: 2.0,
            total_passengers: 3,
            avg_passengers: 1.0,
            mean_latitude: Some(40.75),
            mean_longitude: Some(-73.98),
            demand_level: DemandLevel::Low,
        }
    }

    #[test]
    fn heatmap_thresholds_are_strict() {
        let t = DemandThresholds::HEATMAP;
        assert_eq!(t.classify(8), DemandLevel::Low);
        assert_eq!(t.classify(9), DemandLevel::Medium);
        assert_eq!(t.classify(15), DemandLevel::Medium);
        assert_eq!(t.classify(16), DemandLevel::High);
    }

    #[test]
    fn recent_trip_thresholds_are_strict() {
        let t = DemandThresholds::RECENT_TRIPS;
        assert_eq!(t.classify(5), DemandLevel::Low);
        assert_eq!(t.classify(6), DemandLevel::Medium);
        assert_eq!(t.classify(10), DemandLevel::Medium);
        assert_eq!(t.classify(11), DemandLevel::High);
    }

    #[test]
    fn horizon_ratios() {
        let ratios: Vec<f64> = ForecastHorizon::ALL.iter().map(|h| h.ratio()).collect();
        assert_eq!(ratios, vec![1.1, 1.2, 1.3]);
        assert_eq!(ForecastHorizon::ThreeHours.hours(), 3);
        assert_eq!(ForecastHorizon::OneHour.to_string(), "+1h");
    }

    #[test]
    fn heatmap_snapshot_is_tagged() {
        let snapshot = HeatmapSnapshot {
            data: vec![aggregate(7, 3)],
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["type"], "heatmap");
        assert_eq!(value["data"][0]["location_id"], 7);
    }

    #[test]
    fn aggregated_message_distinguishes_heatmap() {
        let heatmap = serde_json::to_string(&AggregatedMessage::Heatmap(HeatmapSnapshot {
            data: vec![],
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }))
        .unwrap();
        let location =
            serde_json::to_string(&AggregatedMessage::Location(aggregate(3, 1))).unwrap();

        assert!(matches!(
            serde_json::from_str::<AggregatedMessage>(&heatmap).unwrap(),
            AggregatedMessage::Heatmap(_)
        ));
        assert!(matches!(
            serde_json::from_str::<AggregatedMessage>(&location).unwrap(),
            AggregatedMessage::Location(a) if a.location_id == 3
        ));
    }

    #[test]
    fn anomaly_kind_tags() {
        assert_eq!(AnomalyKind::HighDemand.as_ref(), "high_demand");
        assert_eq!(
            serde_json::to_string(&AnomalyKind::LowDemand).unwrap(),
            "\"low_demand\""
        );
    }
}

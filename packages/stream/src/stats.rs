//! Summary statistics shown above the dashboard panels.
//!
//! Computed over one tick's aggregates, so each window trip is counted
//! once no matter how many ticks the demand buffer has retained.

use std::collections::BTreeSet;

use serde::Serialize;
use taxi_demand_analytics_models::LocationAggregate;

/// Headline numbers for the current window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// Sum of `trip_count`, i.e. trips in the window.
    pub total_trips: u64,
    /// Distinct locations with at least one trip.
    pub active_locations: usize,
    /// Mean of the per-location `avg_fare`, `None` when empty.
    pub mean_fare: Option<f64>,
    /// Events currently held in the anomaly buffer.
    pub anomaly_count: usize,
}

impl DashboardStats {
    /// Computes the stats over one tick's aggregates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute<'a>(
        window: impl IntoIterator<Item = &'a LocationAggregate>,
        anomaly_count: usize,
    ) -> Self {
        let mut total_trips = 0u64;
        let mut locations = BTreeSet::new();
        let mut fare_sum = 0.0;
        let mut records = 0usize;

        for aggregate in window {
            total_trips += u64::from(aggregate.trip_count);
            locations.insert(aggregate.location_id);
            fare_sum += aggregate.avg_fare;
            records += 1;
        }

        Self {
            total_trips,
            active_locations: locations.len(),
            mean_fare: (records > 0).then(|| fare_sum / records as f64),
            anomaly_count,
        }
    }
}

impl std::fmt::Display for DashboardStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "trips={} locations={} mean_fare=${:.2} anomalies={}",
            self.total_trips,
            self.active_locations,
            self.mean_fare.unwrap_or(0.0),
            self.anomaly_count
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use taxi_demand_analytics_models::DemandLevel;

    use super::*;

    fn aggregate(location_id: u16, trip_count: u32, avg_fare: f64) -> LocationAggregate {
        LocationAggregate {
            location_id,
            window_end: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            trip_count,
            total_fare: avg_fare * f64::from(trip_count),
            avg_fare,
            total_distance: 0.0,
            avg_distance: 0.0,
            total_passengers: trip_count,
            avg_passengers: 1.0,
            mean_latitude: None,
            mean_longitude: None,
            demand_level: DemandLevel::Low,
        }
    }

    #[test]
    fn sums_trips_and_counts_distinct_locations() {
        let demand = [
            aggregate(1, 3, 10.0),
            aggregate(2, 4, 20.0),
            aggregate(1, 5, 30.0),
        ];
        let stats = DashboardStats::compute(&demand, 2);
        assert_eq!(stats.total_trips, 12);
        assert_eq!(stats.active_locations, 2);
        assert!((stats.mean_fare.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(stats.anomaly_count, 2);
        assert_eq!(
            stats.to_string(),
            "trips=12 locations=2 mean_fare=$20.00 anomalies=2"
        );
    }

    #[test]
    fn empty_buffers() {
        let stats = DashboardStats::compute(std::iter::empty(), 0);
        assert_eq!(stats.total_trips, 0);
        assert_eq!(stats.mean_fare, None);
    }
}

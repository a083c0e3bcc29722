//! Fixed-ratio short-horizon forecast.
//!
//! The projection is the current trip count scaled by a per-horizon
//! ratio. It has no predictive power beyond "demand stays roughly where
//! it is" and is labelled with a constant confidence.

use chrono::{DateTime, Duration, Utc};
use taxi_demand_analytics_models::{
    FORECAST_CONFIDENCE, ForecastHorizon, ForecastPoint, LocationAggregate,
};

/// Projects one aggregate to the +1h, +2h and +3h horizons.
#[must_use]
pub fn forecast(aggregate: &LocationAggregate, generated_at: DateTime<Utc>) -> [ForecastPoint; 3] {
    ForecastHorizon::ALL.map(|horizon| ForecastPoint {
        location_id: aggregate.location_id,
        horizon,
        predicted_trip_count: project(aggregate.trip_count, horizon),
        confidence: FORECAST_CONFIDENCE,
        generated_at,
        target_time: generated_at + Duration::hours(horizon.hours()),
    })
}

/// Forecasts every aggregate, in aggregate order.
#[must_use]
pub fn forecast_all(
    aggregates: &[LocationAggregate],
    generated_at: DateTime<Utc>,
) -> Vec<ForecastPoint> {
    aggregates
        .iter()
        .flat_map(|a| forecast(a, generated_at))
        .collect()
}

/// `round(count × ratio)`, halves rounded away from zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn project(trip_count: u32, horizon: ForecastHorizon) -> u32 {
    (f64::from(trip_count) * horizon.ratio()).round() as u32
}

#[cfg(test)]
mod tests {
    use taxi_demand_analytics_models::DemandLevel;

    use super::*;
    use crate::window::tests::now;

    fn agg(location_id: u16, trip_count: u32) -> LocationAggregate {
        LocationAggregate {
            location_id,
            window_end: now(),
            trip_count,
            total_fare: 0.0,
            avg_fare: 0.0,
            total_distance: 0.0,
            avg_distance: 0.0,
            total_passengers: 0,
            avg_passengers: 0.0,
            mean_latitude: None,
            mean_longitude: None,
            demand_level: DemandLevel::Low,
        }
    }

    #[test]
    fn ten_trips_projects_to_eleven_twelve_thirteen() {
        let points = forecast(&agg(4, 10), now());
        let counts: Vec<u32> = points.iter().map(|p| p.predicted_trip_count).collect();
        assert_eq!(counts, vec![11, 12, 13]);
        assert!(points.iter().all(|p| (p.confidence - 0.8).abs() < f64::EPSILON));
        assert!(points.iter().all(|p| p.location_id == 4));
        assert_eq!(
            points.iter().map(|p| p.horizon).collect::<Vec<_>>(),
            ForecastHorizon::ALL.to_vec()
        );
    }

    #[test]
    fn target_time_is_offset_by_horizon() {
        let points = forecast(&agg(4, 10), now());
        assert_eq!(points[0].generated_at, now());
        assert_eq!(points[2].target_time, now() + Duration::hours(3));
    }

    #[test]
    fn rounds_to_nearest() {
        // 5 × 1.1 = 5.5 → 6; 5 × 1.3 = 6.5 → 7; 3 × 1.2 = 3.6 → 4.
        let five: Vec<u32> = forecast(&agg(1, 5), now())
            .iter()
            .map(|p| p.predicted_trip_count)
            .collect();
        assert_eq!(five, vec![6, 6, 7]);
        assert_eq!(forecast(&agg(1, 3), now())[1].predicted_trip_count, 4);
        assert_eq!(forecast(&agg(1, 0), now())[2].predicted_trip_count, 0);
    }

    #[test]
    fn forecast_all_flattens_per_location() {
        let points = forecast_all(&[agg(1, 10), agg(2, 20)], now());
        assert_eq!(points.len(), 6);
        assert_eq!(points[3].location_id, 2);
        assert_eq!(points[3].predicted_trip_count, 22);
    }
}

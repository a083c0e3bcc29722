//! Synthetic trip generation.
//!
//! Used when no live source is configured. Trips are built directly in
//! canonical form: uniform pickup times over the last hour, uniform
//! coordinates inside the serving region, and a fare derived from a
//! Manhattan-style grid distance.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use taxi_demand_trip_models::{
    BoundingBox, CalendarFeatures, LocationId, RecordSource, TripRecord,
};

/// Flag-drop charge.
pub const BASE_FARE: f64 = 2.50;

/// Metered charge per mile.
pub const FARE_PER_MILE: f64 = 2.50;

/// Miles per degree of latitude or longitude on the distance grid.
pub const GRID_MILES_PER_DEGREE: f64 = 50.0;

/// Upper bound of the tip as a share of the distance fare.
pub const MAX_TIP_SHARE: f64 = 0.2;

/// Pickups fall within this many seconds before `now`.
const PICKUP_SPREAD_SECS: i64 = 3600;

/// Grid distance in miles: `(|Δlat| + |Δlon|) × 50`.
///
/// Not geodesic; a cheap proxy good enough for demand shaping.
#[must_use]
pub fn grid_distance_miles(pickup: (f64, f64), dropoff: (f64, f64)) -> f64 {
    ((pickup.0 - dropoff.0).abs() + (pickup.1 - dropoff.1).abs()) * GRID_MILES_PER_DEGREE
}

/// Metered fare for a trip of `distance` miles.
#[must_use]
pub fn fare_for_distance(distance: f64) -> f64 {
    distance.mul_add(FARE_PER_MILE, BASE_FARE)
}

/// Produces synthetic [`TripRecord`]s.
#[derive(Debug)]
pub struct TripGenerator {
    region: BoundingBox,
    max_location_id: LocationId,
    sequence: AtomicU64,
}

impl TripGenerator {
    /// Creates a generator for `region` over locations
    /// `1..=max_location_id`.
    #[must_use]
    pub const fn new(region: BoundingBox, max_location_id: LocationId) -> Self {
        Self {
            region,
            max_location_id,
            sequence: AtomicU64::new(0),
        }
    }

    /// Generates `count` trips picked up within the hour before `now`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<TripRecord> {
        (0..count).map(|_| self.generate_one(rng, now)).collect()
    }

    fn generate_one<R: Rng + ?Sized>(&self, rng: &mut R, now: DateTime<Utc>) -> TripRecord {
        let pickup_time = now - Duration::seconds(rng.random_range(0..=PICKUP_SPREAD_SECS));
        let dropoff_time = pickup_time + Duration::minutes(rng.random_range(5..=60));

        let pickup = self.random_point(rng);
        let dropoff = self.random_point(rng);
        let trip_distance = grid_distance_miles(pickup, dropoff);
        let distance_fare = trip_distance * FARE_PER_MILE;
        let fare_amount = fare_for_distance(trip_distance);
        let tip_amount = rng.random_range(0.0..=MAX_TIP_SHARE * distance_fare);

        let calendar = CalendarFeatures::derive(pickup_time);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        TripRecord {
            id: format!("mock_trip_{}_{seq}", now.timestamp_millis()),
            pickup_time,
            dropoff_time: Some(dropoff_time),
            pickup_location_id: Some(rng.random_range(1..=self.max_location_id)),
            dropoff_location_id: Some(rng.random_range(1..=self.max_location_id)),
            passenger_count: rng.random_range(1..=6),
            trip_distance,
            fare_amount,
            tip_amount,
            total_amount: fare_amount + tip_amount,
            pickup_latitude: Some(pickup.0),
            pickup_longitude: Some(pickup.1),
            dropoff_latitude: Some(dropoff.0),
            dropoff_longitude: Some(dropoff.1),
            pickup_hour: calendar.hour,
            pickup_weekday: calendar.weekday,
            is_weekend: calendar.is_weekend,
            is_rush_hour: calendar.is_rush_hour,
            source: RecordSource::Synthetic,
        }
    }

    fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        (
            rng.random_range(self.region.min_latitude..=self.region.max_latitude),
            rng.random_range(self.region.min_longitude..=self.region.max_longitude),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::normalize::{Normalizer, RawRecord};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn distance_and_fare_are_deterministic() {
        let distance = grid_distance_miles((40.70, -74.00), (40.75, -73.90));
        assert!((distance - 7.5).abs() < 1e-9);
        assert!((fare_for_distance(distance) - 21.25).abs() < 1e-9);
        assert!((fare_for_distance(0.0) - BASE_FARE).abs() < f64::EPSILON);
    }

    #[test]
    fn generated_trips_respect_invariants() {
        let generator = TripGenerator::new(BoundingBox::NYC, 50);
        let mut rng = StdRng::seed_from_u64(7);
        let trips = generator.generate(&mut rng, 200, now());

        assert_eq!(trips.len(), 200);
        for trip in &trips {
            assert!(trip.pickup_time <= now());
            assert!(trip.pickup_time >= now() - Duration::hours(1));
            let minutes = trip.duration_minutes().unwrap();
            assert!((5..=60).contains(&minutes), "duration {minutes}");
            assert!((1..=50).contains(&trip.pickup_location_id.unwrap()));
            assert!((1..=6).contains(&trip.passenger_count));

            let (lat, lng) = trip.pickup_point().unwrap();
            assert!(BoundingBox::NYC.contains(lat, lng));

            let dropoff = (
                trip.dropoff_latitude.unwrap(),
                trip.dropoff_longitude.unwrap(),
            );
            let expected = grid_distance_miles((lat, lng), dropoff);
            assert!((trip.trip_distance - expected).abs() < 1e-9);
            assert!((trip.fare_amount - fare_for_distance(expected)).abs() < 1e-9);
            assert!(trip.tip_amount <= MAX_TIP_SHARE * expected * FARE_PER_MILE + 1e-9);
            assert!((trip.total_amount - trip.fare_amount - trip.tip_amount).abs() < 1e-9);
            assert_eq!(trip.source, RecordSource::Synthetic);
        }
    }

    #[test]
    fn ids_are_unique() {
        let generator = TripGenerator::new(BoundingBox::NYC, 50);
        let mut rng = StdRng::seed_from_u64(1);
        let mut trips = generator.generate(&mut rng, 50, now());
        trips.extend(generator.generate(&mut rng, 50, now()));
        let ids: HashSet<_> = trips.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn same_seed_same_trips() {
        let a = TripGenerator::new(BoundingBox::NYC, 50)
            .generate(&mut StdRng::seed_from_u64(42), 5, now());
        let b = TripGenerator::new(BoundingBox::NYC, 50)
            .generate(&mut StdRng::seed_from_u64(42), 5, now());
        assert_eq!(a, b);
    }

    #[test]
    fn generated_trips_pass_normalization() {
        let generator = TripGenerator::new(BoundingBox::NYC, 50);
        let raw: Vec<RawRecord> = generator
            .generate(&mut StdRng::seed_from_u64(3), 20, now())
            .iter()
            .map(|t| RawRecord::Synthetic(serde_json::to_value(t).unwrap()))
            .collect();
        let batch = Normalizer::new(BoundingBox::NYC, 50).normalize_batch(&raw);
        assert_eq!(batch.records.len(), 20);
        assert!(batch.rejections.is_empty());
    }
}

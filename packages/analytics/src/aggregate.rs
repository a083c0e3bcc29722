//! Per-location grouped reduction.
//!
//! One pass groups the window's trips by pickup location; each group is
//! then reduced to a [`LocationAggregate`]. Aggregates are rebuilt from
//! scratch every tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use taxi_demand_analytics_models::{DemandThresholds, LocationAggregate};
use taxi_demand_trip_models::{LocationId, TripRecord};

use crate::{ComputeError, ensure_finite};

/// Aggregates `records` per pickup location, sorted by location id.
///
/// Trips without a pickup location are not counted. Locations whose
/// reduction fails are logged and left out; the others are still
/// returned.
#[must_use]
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a TripRecord>,
    thresholds: &DemandThresholds,
    window_end: DateTime<Utc>,
) -> Vec<LocationAggregate> {
    let mut groups: BTreeMap<LocationId, Vec<&TripRecord>> = BTreeMap::new();
    for record in records {
        if let Some(location_id) = record.pickup_location_id {
            groups.entry(location_id).or_default().push(record);
        }
    }

    groups
        .into_iter()
        .filter_map(|(location_id, trips)| {
            match aggregate_location(location_id, &trips, thresholds, window_end) {
                Ok(aggregate) => Some(aggregate),
                Err(e) => {
                    log::error!("Skipping location {location_id} this tick: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Reduces one location's trips to a [`LocationAggregate`].
///
/// # Errors
///
/// Returns [`ComputeError::EmptyAggregate`] if `trips` is empty, or
/// [`ComputeError::NonFinite`] if any sum or mean is NaN or infinite.
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_location(
    location_id: LocationId,
    trips: &[&TripRecord],
    thresholds: &DemandThresholds,
    window_end: DateTime<Utc>,
) -> Result<LocationAggregate, ComputeError> {
    let trip_count =
        u32::try_from(trips.len()).map_err(|_| ComputeError::EmptyAggregate { location_id })?;
    if trip_count == 0 {
        return Err(ComputeError::EmptyAggregate { location_id });
    }
    let n = f64::from(trip_count);

    let total_fare = ensure_finite(
        location_id,
        "total_fare",
        trips.iter().map(|t| t.fare_amount).sum(),
    )?;
    let total_distance = ensure_finite(
        location_id,
        "total_distance",
        trips.iter().map(|t| t.trip_distance).sum(),
    )?;
    let total_passengers = trips
        .iter()
        .map(|t| t.passenger_count)
        .fold(0u32, u32::saturating_add);

    let (mean_latitude, mean_longitude) = centroid(trips)
        .map_or((None, None), |(lat, lng)| (Some(lat), Some(lng)));

    Ok(LocationAggregate {
        location_id,
        window_end,
        trip_count,
        total_fare,
        avg_fare: ensure_finite(location_id, "avg_fare", total_fare / n)?,
        total_distance,
        avg_distance: ensure_finite(location_id, "avg_distance", total_distance / n)?,
        total_passengers,
        avg_passengers: f64::from(total_passengers) / n,
        mean_latitude,
        mean_longitude,
        demand_level: thresholds.classify(trip_count),
    })
}

/// Mean pickup point of the trips that carry coordinates.
#[allow(clippy::cast_precision_loss)]
fn centroid(trips: &[&TripRecord]) -> Option<(f64, f64)> {
    let (count, lat_sum, lng_sum) = trips
        .iter()
        .filter_map(|t| t.pickup_point())
        .fold((0usize, 0.0, 0.0), |(count, lat, lng), (la, ln)| {
            (count + 1, lat + la, lng + ln)
        });
    (count > 0).then(|| (lat_sum / count as f64, lng_sum / count as f64))
}

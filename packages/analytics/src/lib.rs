#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Windowed demand aggregation, anomaly detection, and forecasting.
//!
//! Everything here is a pure function of its inputs: the aggregator
//! reduces a window of [`TripRecord`](taxi_demand_trip_models::TripRecord)s
//! to per-location aggregates, the detector checks each aggregate against
//! static thresholds, and the forecaster extrapolates each aggregate's
//! trip count. Failures are per location; one bad location never aborts
//! a tick.

pub mod aggregate;
pub mod anomaly;
pub mod forecast;
pub mod window;

use taxi_demand_trip_models::LocationId;
use thiserror::Error;

/// Errors raised while computing over one location's intermediate state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    /// An intermediate value was NaN or infinite.
    #[error("Non-finite {field} for location {location_id}: {value}")]
    NonFinite {
        /// Location being computed.
        location_id: LocationId,
        /// Name of the offending value.
        field: &'static str,
        /// The value itself.
        value: f64,
    },

    /// An aggregate claimed zero trips where at least one is required.
    #[error("Empty aggregate for location {location_id}")]
    EmptyAggregate {
        /// Location being computed.
        location_id: LocationId,
    },
}

/// Returns `value` if finite, otherwise a [`ComputeError::NonFinite`].
pub(crate) fn ensure_finite(
    location_id: LocationId,
    field: &'static str,
    value: f64,
) -> Result<f64, ComputeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ComputeError::NonFinite {
            location_id,
            field,
            value,
        })
    }
}

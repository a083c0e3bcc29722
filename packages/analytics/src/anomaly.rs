//! Static-threshold anomaly detection over location aggregates.
//!
//! Each rule is evaluated independently, so one aggregate can raise more
//! than one event. Detection is stateless: a location that stays over a
//! threshold raises a fresh event on every tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taxi_demand_analytics_models::{AnomalyEvent, AnomalyKind, LocationAggregate};

use crate::{ComputeError, ensure_finite};

/// Anomaly thresholds. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// `trip_count` above this raises [`AnomalyKind::HighDemand`].
    pub high_demand: u32,
    /// Positive `trip_count` below this raises [`AnomalyKind::LowDemand`].
    pub low_demand: u32,
    /// `avg_fare` above this raises [`AnomalyKind::HighFare`].
    pub high_fare: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            high_demand: 20,
            low_demand: 2,
            high_fare: 50.0,
        }
    }
}

/// Checks aggregates against [`AnomalyThresholds`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    #[must_use]
    pub const fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub const fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Returns the anomalies raised by one aggregate.
    ///
    /// The fare rule looks at the aggregate's mean fare, never at any
    /// single trip's fare.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::NonFinite`] if the aggregate's mean fare is
    /// NaN or infinite.
    pub fn detect(
        &self,
        aggregate: &LocationAggregate,
        detected_at: DateTime<Utc>,
    ) -> Result<Vec<AnomalyEvent>, ComputeError> {
        let avg_fare = ensure_finite(aggregate.location_id, "avg_fare", aggregate.avg_fare)?;
        let t = &self.thresholds;
        let event = |kind, observed_value, threshold| AnomalyEvent {
            kind,
            location_id: aggregate.location_id,
            observed_value,
            threshold,
            detected_at,
        };

        let mut events = Vec::new();
        let count = aggregate.trip_count;
        if count > t.high_demand {
            events.push(event(
                AnomalyKind::HighDemand,
                f64::from(count),
                f64::from(t.high_demand),
            ));
        }
        if count > 0 && count < t.low_demand {
            events.push(event(
                AnomalyKind::LowDemand,
                f64::from(count),
                f64::from(t.low_demand),
            ));
        }
        if avg_fare > t.high_fare {
            events.push(event(AnomalyKind::HighFare, avg_fare, t.high_fare));
        }
        Ok(events)
    }

    /// Runs [`Self::detect`] over every aggregate.
    ///
    /// Each event is logged as a warning. An aggregate that cannot be
    /// evaluated is logged and skipped.
    #[must_use]
    pub fn detect_all(
        &self,
        aggregates: &[LocationAggregate],
        detected_at: DateTime<Utc>,
    ) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();
        for aggregate in aggregates {
            match self.detect(aggregate, detected_at) {
                Ok(found) => {
                    for e in &found {
                        log::warn!(
                            "Anomaly {} at location {}: {:.2} (threshold {:.2})",
                            e.kind,
                            e.location_id,
                            e.observed_value,
                            e.threshold
                        );
                    }
                    events.extend(found);
                }
                Err(e) => {
                    log::error!(
                        "Skipping anomaly check for location {}: {e}",
                        aggregate.location_id
                    );
                }
            }
        }
        events
    }
}

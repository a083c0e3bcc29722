#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared output buffers between the pipeline driver and its consumers.
//!
//! The driver is the only writer. Consumers poll on their own schedule
//! and always see a consistent buffer: each buffer sits behind its own
//! lock, so a reader never observes a half-applied append or trim.
//!
//! - `aggregated`: a [`BoundedBuffer`] of [`LocationAggregate`]s plus the
//!   latest [`HeatmapSnapshot`], replaced wholesale each tick.
//! - `anomalies`: a [`BoundedBuffer`] of [`AnomalyEvent`]s.
//! - forecast: the latest tick's [`ForecastPoint`]s, grouped by
//!   location and replaced wholesale each tick.

pub mod buffer;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use taxi_demand_analytics_models::{
    AggregatedMessage, AnomalyEvent, ForecastPoint, HeatmapSnapshot, LocationAggregate,
};
use taxi_demand_trip_models::LocationId;

pub use buffer::{BoundedBuffer, BufferLimits};
pub use stats::DashboardStats;

/// Everything one recompute tick publishes.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub aggregates: Vec<LocationAggregate>,
    pub anomalies: Vec<AnomalyEvent>,
    pub forecasts: Vec<ForecastPoint>,
}

/// The pipeline's output channels.
#[derive(Debug)]
pub struct StreamBuffers {
    demand: Mutex<BoundedBuffer<LocationAggregate>>,
    anomalies: Mutex<BoundedBuffer<AnomalyEvent>>,
    heatmap: RwLock<Option<HeatmapSnapshot>>,
    forecasts: RwLock<BTreeMap<LocationId, Vec<ForecastPoint>>>,
}

impl Default for StreamBuffers {
    fn default() -> Self {
        Self::new(BufferLimits::DEMAND, BufferLimits::ANOMALIES)
    }
}

impl StreamBuffers {
    #[must_use]
    pub fn new(demand: BufferLimits, anomalies: BufferLimits) -> Self {
        Self {
            demand: Mutex::new(BoundedBuffer::new("demand", demand)),
            anomalies: Mutex::new(BoundedBuffer::new("anomaly", anomalies)),
            heatmap: RwLock::new(None),
            forecasts: RwLock::new(BTreeMap::new()),
        }
    }

    // ── Writer side ──────────────────────────────────────────────────

    /// Publishes one tick's results.
    ///
    /// Each aggregate is appended to the demand buffer as its own record
    /// and the tick as a whole replaces the heatmap snapshot. Forecasts
    /// replace the previous tick's forecasts entirely.
    pub fn publish(&self, output: TickOutput, timestamp: DateTime<Utc>) {
        lock(&self.demand).extend(output.aggregates.iter().cloned());
        self.publish_aggregated(AggregatedMessage::Heatmap(HeatmapSnapshot {
            data: output.aggregates,
            timestamp,
        }));
        self.publish_anomalies(output.anomalies);
        self.publish_forecasts(output.forecasts);
    }

    /// Publishes one record on the `aggregated` channel.
    ///
    /// A bare aggregate goes to the demand buffer. A heatmap snapshot only
    /// replaces the heatmap slot.
    pub fn publish_aggregated(&self, message: AggregatedMessage) {
        match message {
            AggregatedMessage::Location(aggregate) => lock(&self.demand).push(aggregate),
            AggregatedMessage::Heatmap(snapshot) => {
                *self
                    .heatmap
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
            }
        }
    }

    /// Appends events to the anomaly buffer.
    pub fn publish_anomalies(&self, events: impl IntoIterator<Item = AnomalyEvent>) {
        lock(&self.anomalies).extend(events);
    }

    /// Replaces the forecast slot. Locations absent from `points` no
    /// longer have a forecast.
    pub fn publish_forecasts(&self, points: impl IntoIterator<Item = ForecastPoint>) {
        let mut fresh: BTreeMap<LocationId, Vec<ForecastPoint>> = BTreeMap::new();
        for point in points {
            fresh.entry(point.location_id).or_default().push(point);
        }
        *self
            .forecasts
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    // ── Reader side ──────────────────────────────────────────────────

    /// The newest `n` demand records, oldest first.
    #[must_use]
    pub fn recent_demand(&self, n: usize) -> Vec<LocationAggregate> {
        lock(&self.demand).last(n)
    }

    /// The newest `n` anomalies, oldest first.
    #[must_use]
    pub fn recent_anomalies(&self, n: usize) -> Vec<AnomalyEvent> {
        lock(&self.anomalies).last(n)
    }

    /// The latest heatmap snapshot.
    #[must_use]
    pub fn heatmap(&self) -> Option<HeatmapSnapshot> {
        self.heatmap
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest forecast for every location, by location id.
    #[must_use]
    pub fn forecasts(&self) -> Vec<ForecastPoint> {
        self.forecasts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn demand_len(&self) -> usize {
        lock(&self.demand).len()
    }

    #[must_use]
    pub fn anomaly_len(&self) -> usize {
        lock(&self.anomalies).len()
    }

    /// Summary statistics over the latest heatmap snapshot, which holds
    /// exactly one aggregate per location in the current window.
    #[must_use]
    pub fn stats(&self) -> DashboardStats {
        let anomaly_count = self.anomaly_len();
        let heatmap = self
            .heatmap
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let window = heatmap.as_ref().map_or(&[][..], |s| s.data.as_slice());
        DashboardStats::compute(window, anomaly_count)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

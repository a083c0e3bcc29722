//! Component self-check.
//!
//! Runs a small seeded synthetic batch through every stage and reports
//! pass/fail per component. No network access.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use taxi_demand_analytics::aggregate::aggregate;
use taxi_demand_analytics::anomaly::AnomalyDetector;
use taxi_demand_analytics::forecast::forecast_all;
use taxi_demand_analytics::window::select;
use taxi_demand_source::generator::TripGenerator;
use taxi_demand_source::normalize::{Normalizer, RawRecord};
use taxi_demand_stream::{StreamBuffers, TickOutput};

use crate::config::PipelineConfig;

const SAMPLE_SIZE: usize = 100;
const SEED: u64 = 0x7a71;

/// Result of checking one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    pub component: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Results for every component, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub checks: Vec<ComponentCheck>,
}

impl HealthReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    fn record(&mut self, component: &'static str, passed: bool, detail: String) {
        if passed {
            log::info!("✓ {component}: {detail}");
        } else {
            log::error!("✗ {component}: {detail}");
        }
        self.checks.push(ComponentCheck {
            component,
            passed,
            detail,
        });
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            writeln!(f, "{mark:<5} {:<11} {}", check.component, check.detail)?;
        }
        let passed = self.checks.iter().filter(|c| c.passed).count();
        write!(f, "{passed}/{} components healthy", self.checks.len())
    }
}

/// Runs the self-check at `now`.
#[must_use]
pub fn run_health_check(config: &PipelineConfig, now: DateTime<Utc>) -> HealthReport {
    let mut report = HealthReport { checks: Vec::new() };
    let region = &config.region;

    // Generator
    let generator = TripGenerator::new(region.bounds, region.max_location_id);
    let trips = generator.generate(&mut StdRng::seed_from_u64(SEED), SAMPLE_SIZE, now);
    let in_region = trips
        .iter()
        .filter_map(|t| t.pickup_point())
        .all(|(lat, lng)| region.bounds.contains(lat, lng));
    report.record(
        "generator",
        trips.len() == SAMPLE_SIZE && in_region,
        format!("{} trips generated", trips.len()),
    );

    // Normalizer
    let raw: Vec<RawRecord> = trips
        .iter()
        .filter_map(|t| serde_json::to_value(t).ok())
        .map(RawRecord::Synthetic)
        .collect();
    let batch = Normalizer::new(region.bounds, region.max_location_id).normalize_batch(&raw);
    report.record(
        "normalizer",
        batch.records.len() == trips.len() && batch.rejections.is_empty(),
        format!(
            "{} accepted, {} rejected",
            batch.records.len(),
            batch.rejections.len()
        ),
    );

    // Aggregator
    let window = select(&config.window, &batch.records, now);
    let thresholds = config.window.demand_thresholds();
    let aggregates = aggregate(window.iter().copied(), &thresholds, now);
    let counted: usize = aggregates.iter().map(|a| a.trip_count as usize).sum();
    let consistent = aggregates
        .iter()
        .all(|a| (a.avg_fare - a.total_fare / f64::from(a.trip_count)).abs() < 1e-9);
    report.record(
        "aggregator",
        counted == window.len() && consistent && !aggregates.is_empty(),
        format!("{} locations from {} trips", aggregates.len(), window.len()),
    );

    // Detector
    let anomalies = AnomalyDetector::new(config.anomaly).detect_all(&aggregates, now);
    let valid = anomalies
        .iter()
        .all(|e| aggregates.iter().any(|a| a.location_id == e.location_id));
    report.record(
        "detector",
        valid,
        format!("{} anomalies raised", anomalies.len()),
    );

    // Forecaster
    let forecasts = forecast_all(&aggregates, now);
    report.record(
        "forecaster",
        forecasts.len() == aggregates.len() * 3,
        format!("{} forecast points", forecasts.len()),
    );

    // Buffers
    let buffers = StreamBuffers::new(config.buffers.demand, config.buffers.anomalies);
    let locations = aggregates.len();
    buffers.publish(
        TickOutput {
            aggregates,
            anomalies,
            forecasts,
        },
        now,
    );
    let demand_len = buffers.demand_len();
    report.record(
        "buffers",
        demand_len == locations.min(config.buffers.demand.capacity)
            && buffers.heatmap().is_some(),
        format!("{demand_len} demand records buffered"),
    );

    report
}

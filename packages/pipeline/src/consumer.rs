//! Console consumer.
//!
//! Polls the shared buffers on four independent intervals and prints a
//! text rendering of each view. It reads whatever the buffers hold at
//! that moment; there is no handshake with the driver, so a view may be
//! one tick stale.

use std::fmt::Write as _;
use std::sync::Arc;

use taxi_demand_analytics_models::{
    AnomalyEvent, ForecastPoint, HeatmapSnapshot, LocationAggregate,
};
use taxi_demand_stream::{DashboardStats, StreamBuffers};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::ConsumerConfig;
use crate::driver::wait_for_shutdown;

/// Reads [`StreamBuffers`] and renders dashboard views.
pub struct Consumer {
    buffers: Arc<StreamBuffers>,
    config: ConsumerConfig,
}

impl Consumer {
    #[must_use]
    pub const fn new(buffers: Arc<StreamBuffers>, config: ConsumerConfig) -> Self {
        Self { buffers, config }
    }

    /// Headline stats plus the most recent demand records.
    #[must_use]
    pub fn demand_view(&self) -> String {
        let stats = self.buffers.stats();
        let demand = self.buffers.recent_demand(self.config.demand_rows);
        render_demand(&stats, &demand)
    }

    /// The most recent anomalies, newest last.
    #[must_use]
    pub fn anomaly_view(&self) -> String {
        render_anomalies(&self.buffers.recent_anomalies(self.config.anomaly_rows))
    }

    /// The latest heatmap snapshot.
    #[must_use]
    pub fn heatmap_view(&self) -> String {
        self.buffers
            .heatmap()
            .map_or_else(|| "Heatmap: no data yet\n".to_string(), |s| render_heatmap(&s))
    }

    /// The latest forecast per location.
    #[must_use]
    pub fn forecast_view(&self) -> String {
        render_forecasts(&self.buffers.forecasts())
    }

    /// Prints views until `shutdown` becomes `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let secs = std::time::Duration::from_secs;
        let mut demand = tokio::time::interval(secs(self.config.demand_secs));
        let mut anomalies = tokio::time::interval(secs(self.config.anomaly_secs));
        let mut heatmap = tokio::time::interval(secs(self.config.heatmap_secs));
        let mut forecast = tokio::time::interval(secs(self.config.forecast_secs));
        for interval in [&mut demand, &mut anomalies, &mut heatmap, &mut forecast] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        loop {
            tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                _ = demand.tick() => print!("{}", self.demand_view()),
                _ = anomalies.tick() => print!("{}", self.anomaly_view()),
                _ = heatmap.tick() => print!("{}", self.heatmap_view()),
                _ = forecast.tick() => print!("{}", self.forecast_view()),
            }
        }
        log::debug!("Consumer stopped");
    }
}

/// Renders the stats line and a demand table.
#[must_use]
pub fn render_demand(stats: &DashboardStats, demand: &[LocationAggregate]) -> String {
    let mut out = format!("── Demand ── {stats}\n");
    if demand.is_empty() {
        out.push_str("  (no demand records yet)\n");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<9} {:>6} {:>9} {:>9} {:<6}",
        "LOCATION", "TRIPS", "AVG FARE", "AVG MI", "LEVEL"
    );
    for a in demand {
        let _ = writeln!(
            out,
            "  {:<9} {:>6} {:>9.2} {:>9.2} {:<6}",
            a.location_id, a.trip_count, a.avg_fare, a.avg_distance, a.demand_level
        );
    }
    out
}

/// Renders one line per anomaly.
#[must_use]
pub fn render_anomalies(events: &[AnomalyEvent]) -> String {
    let mut out = format!("── Anomalies ── {} recent\n", events.len());
    for e in events {
        let _ = writeln!(
            out,
            "  {} {:<12} location {:<3} value {:.2} > threshold {:.2}",
            e.detected_at.format("%H:%M:%S"),
            e.kind,
            e.location_id,
            e.observed_value,
            e.threshold
        );
    }
    out
}

/// Renders a heatmap snapshot, busiest locations first.
#[must_use]
pub fn render_heatmap(snapshot: &HeatmapSnapshot) -> String {
    let mut cells: Vec<&LocationAggregate> = snapshot.data.iter().collect();
    cells.sort_by(|a, b| {
        b.trip_count
            .cmp(&a.trip_count)
            .then(a.location_id.cmp(&b.location_id))
    });

    let mut out = format!(
        "── Heatmap ── {} locations at {}\n",
        cells.len(),
        snapshot.timestamp.format("%H:%M:%S")
    );
    for a in cells {
        let centroid = match (a.mean_latitude, a.mean_longitude) {
            (Some(lat), Some(lng)) => format!("({lat:.4}, {lng:.4})"),
            _ => "(no coordinates)".to_string(),
        };
        let _ = writeln!(
            out,
            "  location {:<3} {:<6} {:>4} trips {centroid}",
            a.location_id, a.demand_level, a.trip_count
        );
    }
    out
}

/// Renders forecasts grouped per location.
#[must_use]
pub fn render_forecasts(points: &[ForecastPoint]) -> String {
    let mut out = format!("── Forecast ── {} points\n", points.len());
    for p in points {
        let _ = writeln!(
            out,
            "  location {:<3} {} → {} trips (confidence {:.1})",
            p.location_id, p.horizon, p.predicted_trip_count, p.confidence
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use taxi_demand_analytics::aggregate::aggregate;
    use taxi_demand_analytics::anomaly::AnomalyDetector;
    use taxi_demand_analytics::forecast::forecast_all;
    use taxi_demand_analytics_models::DemandThresholds;
    use taxi_demand_stream::TickOutput;

    use super::*;
    use crate::driver::tests::{now, trip};

    fn published_buffers() -> Arc<StreamBuffers> {
        let records = vec![
            trip("a", 7, now(), 60.0),
            trip("b", 7, now(), 10.0),
            trip("c", 3, now(), 95.0),
        ];
        let aggregates = aggregate(&records, &DemandThresholds::HEATMAP, now());
        let anomalies = AnomalyDetector::default().detect_all(&aggregates, now());
        let forecasts = forecast_all(&aggregates, now());
        let buffers = Arc::new(StreamBuffers::default());
        buffers.publish(
            TickOutput {
                aggregates,
                anomalies,
                forecasts,
            },
            now(),
        );
        buffers
    }

    #[test]
    fn views_render_buffer_contents() {
        let consumer = Consumer::new(published_buffers(), ConsumerConfig::default());

        let demand = consumer.demand_view();
        assert!(demand.contains("trips=3 locations=2"));
        assert_eq!(demand.lines().count(), 4);

        let anomalies = consumer.anomaly_view();
        assert!(anomalies.contains("high_fare"));
        assert!(anomalies.contains("low_demand"));

        let heatmap = consumer.heatmap_view();
        let first_row = heatmap.lines().nth(1).unwrap();
        assert!(first_row.contains("location 7"), "{heatmap}");
        assert!(first_row.contains("(40.7500, -73.9800)"));

        let forecast = consumer.forecast_view();
        assert!(forecast.contains("6 points"));
        assert!(forecast.contains("+3h"));
    }

    #[test]
    fn empty_buffers_render_placeholders() {
        let consumer = Consumer::new(Arc::new(StreamBuffers::default()), ConsumerConfig::default());
        assert!(consumer.demand_view().contains("no demand records yet"));
        assert_eq!(consumer.heatmap_view(), "Heatmap: no data yet\n");
        assert!(consumer.anomaly_view().starts_with("── Anomalies ── 0 recent"));
    }

    #[test]
    fn demand_rows_are_capped() {
        let buffers = Arc::new(StreamBuffers::default());
        let records: Vec<_> = (1..=60u16)
            .map(|loc| trip(&loc.to_string(), loc, Utc::now(), 10.0))
            .collect();
        buffers.publish(
            TickOutput {
                aggregates: aggregate(&records, &DemandThresholds::HEATMAP, Utc::now()),
                ..TickOutput::default()
            },
            Utc::now(),
        );
        let consumer = Consumer::new(buffers, ConsumerConfig::default());
        // Stats line, header, and 50 rows.
        assert_eq!(consumer.demand_view().lines().count(), 52);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let consumer = Consumer::new(published_buffers(), ConsumerConfig::default());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(consumer.run(rx));
        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

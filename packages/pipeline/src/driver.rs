//! Generation/collection loop.
//!
//! The driver fetches from its [`TripSource`] on one interval and
//! recomputes aggregates, anomalies and forecasts on another, publishing
//! each recompute to the shared [`StreamBuffers`]. A failed fetch is
//! logged and retried after a backoff; it never stops the loop or reaches
//! the consumer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taxi_demand_analytics::aggregate::aggregate;
use taxi_demand_analytics::anomaly::AnomalyDetector;
use taxi_demand_analytics::forecast::forecast_all;
use taxi_demand_analytics::window::TripWindow;
use taxi_demand_source::normalize::Normalizer;
use taxi_demand_source::retry::RetryPolicy;
use taxi_demand_source::sources::nyc_taxi::{NycTaxiOptions, NycTaxiSource};
use taxi_demand_source::sources::synthetic::SyntheticSource;
use taxi_demand_source::{FetchOptions, SourceError, TripSource};
use taxi_demand_stream::{StreamBuffers, TickOutput};
use taxi_demand_trip_models::RecordSource;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::InitError;
use crate::config::{PipelineConfig, SourceMode};

/// Builds the trip source selected by `config.source.mode`.
///
/// # Errors
///
/// Returns [`InitError::Source`] if the live HTTP client cannot be built.
pub fn build_source(config: &PipelineConfig) -> Result<Box<dyn TripSource>, InitError> {
    let region = &config.region;
    let source = &config.source;
    Ok(match source.mode {
        SourceMode::Synthetic => Box::new(match source.seed {
            Some(seed) => SyntheticSource::seeded(
                region.bounds,
                region.max_location_id,
                source.batch_size,
                seed,
            ),
            None => SyntheticSource::new(region.bounds, region.max_location_id, source.batch_size),
        }),
        SourceMode::Live => Box::new(NycTaxiSource::new(
            NycTaxiOptions {
                base_url: source.base_url.clone(),
                dataset_id: source.dataset_id.clone(),
                limit: source.limit,
                timeout: config.schedule.request_timeout(),
            },
            Normalizer::new(region.bounds, region.max_location_id),
            RetryPolicy::default(),
        )?),
    })
}

/// Outcome of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Trips accepted into the window.
    pub received: usize,
    /// Raw records the normalizer rejected.
    pub rejected: usize,
    /// Trips held in the window after the fetch.
    pub windowed: usize,
}

/// Outcome of one recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Trips inside the window.
    pub trips: usize,
    /// Locations aggregated.
    pub locations: usize,
    pub anomalies: usize,
    pub forecasts: usize,
}

/// The pipeline driver. Sole writer to its [`StreamBuffers`].
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    source: Box<dyn TripSource>,
    window: TripWindow,
    detector: AnomalyDetector,
    buffers: Arc<StreamBuffers>,
    last_pickup: Option<DateTime<Utc>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Box<dyn TripSource>,
        buffers: Arc<StreamBuffers>,
    ) -> Self {
        Self {
            window: TripWindow::new(config.window),
            detector: AnomalyDetector::new(config.anomaly),
            config,
            source,
            buffers,
            last_pickup: None,
        }
    }

    /// Builds a pipeline around the source `config` selects.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the source cannot be constructed.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        buffers: Arc<StreamBuffers>,
    ) -> Result<Self, InitError> {
        let source = build_source(&config)?;
        Ok(Self::new(config, source, buffers))
    }

    #[must_use]
    pub fn buffers(&self) -> &Arc<StreamBuffers> {
        &self.buffers
    }

    /// Interval between fetches for this pipeline's source.
    #[must_use]
    pub fn fetch_interval(&self) -> Duration {
        let mode = match self.source.kind() {
            RecordSource::Live => SourceMode::Live,
            RecordSource::Synthetic => SourceMode::Synthetic,
        };
        self.config.schedule.fetch_interval(mode)
    }

    /// Fetches one batch into the window.
    ///
    /// Live sources are asked only for trips newer than the latest pickup
    /// already seen, so repeated polls do not double count.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the fetch fails; the window is left
    /// untouched.
    pub async fn ingest(&mut self, now: DateTime<Utc>) -> Result<IngestSummary, SourceError> {
        let mut options = FetchOptions::at(now);
        if self.source.kind() == RecordSource::Live {
            options.since = self.last_pickup;
        }

        let batch = self.source.fetch(&options).await?;
        let received = batch.records.len();
        let rejected = batch.rejections.len();
        if let Some(latest) = batch.records.iter().map(|r| r.pickup_time).max() {
            self.last_pickup = self.last_pickup.max(Some(latest));
        }
        self.window.extend(batch.records);

        Ok(IngestSummary {
            received,
            rejected,
            windowed: self.window.len(),
        })
    }

    /// Recomputes every output from the current window and publishes it.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> TickSummary {
        let evicted = self.window.evict(now);
        let current = self.window.current(now);
        let thresholds = self.window.policy().demand_thresholds();

        let aggregates = aggregate(current.iter().copied(), &thresholds, now);
        let anomalies = self.detector.detect_all(&aggregates, now);
        let forecasts = forecast_all(&aggregates, now);

        let summary = TickSummary {
            trips: current.len(),
            locations: aggregates.len(),
            anomalies: anomalies.len(),
            forecasts: forecasts.len(),
        };
        self.buffers.publish(
            TickOutput {
                aggregates,
                anomalies,
                forecasts,
            },
            now,
        );

        log::info!(
            "Tick: {} trips in window ({evicted} expired), {} locations, {} anomalies",
            summary.trips,
            summary.locations,
            summary.anomalies
        );
        summary
    }

    /// One fetch followed by one recompute.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the fetch fails. Nothing is published
    /// in that case.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickSummary, SourceError> {
        self.ingest(now).await?;
        Ok(self.recompute(now))
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped,
    /// then releases the source.
    ///
    /// An in-flight fetch is abandoned on shutdown rather than awaited.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let backoff = self.config.schedule.backoff();
        let mut fetch = tokio::time::interval(self.fetch_interval());
        fetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recompute = tokio::time::interval(self.config.schedule.recompute_interval());
        recompute.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Pipeline started: source={}, fetch every {:?}, recompute every {:?}",
            self.source.id(),
            fetch.period(),
            recompute.period()
        );

        loop {
            tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                _ = fetch.tick() => {
                    let outcome = tokio::select! {
                        biased;
                        () = wait_for_shutdown(&mut shutdown) => None,
                        result = self.ingest(Utc::now()) => Some(result),
                    };
                    match outcome {
                        None => break,
                        Some(Ok(summary)) => log::debug!(
                            "Fetched {} trips ({} rejected), {} in window",
                            summary.received,
                            summary.rejected,
                            summary.windowed
                        ),
                        Some(Err(e)) => {
                            log::error!(
                                "Fetch from {} failed: {e}; retrying in {backoff:?}",
                                self.source.name()
                            );
                            fetch.reset_after(backoff);
                        }
                    }
                }
                _ = recompute.tick() => {
                    self.recompute(Utc::now());
                }
            }
        }

        let Self { source, .. } = self;
        let name = source.name().to_string();
        drop(source);
        log::info!("Pipeline stopped, released {name}");
    }
}

/// Resolves once the shutdown flag is set or the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means shut down.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use taxi_demand_analytics::window::WindowPolicy;
    use taxi_demand_analytics_models::AnomalyKind;
    use taxi_demand_source::normalize::NormalizedBatch;
    use taxi_demand_trip_models::{CalendarFeatures, LocationId, TripRecord};

    use super::*;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    pub fn trip(
        id: &str,
        location: LocationId,
        pickup_time: DateTime<Utc>,
        fare: f64,
    ) -> TripRecord {
        let calendar = CalendarFeatures::derive(pickup_time);
        TripRecord {
            id: id.to_string(),
            pickup_time,
            dropoff_time: Some(pickup_time + ChronoDuration::minutes(12)),
            pickup_location_id: Some(location),
            dropoff_location_id: Some(1),
            passenger_count: 1,
            trip_distance: 3.0,
            fare_amount: fare,
            tip_amount: 0.0,
            total_amount: fare,
            pickup_latitude: Some(40.75),
            pickup_longitude: Some(-73.98),
            dropoff_latitude: None,
            dropoff_longitude: None,
            pickup_hour: calendar.hour,
            pickup_weekday: calendar.weekday,
            is_weekend: calendar.is_weekend,
            is_rush_hour: calendar.is_rush_hour,
            source: RecordSource::Synthetic,
        }
    }

    /// Serves a fixed set of fares at location 7, optionally failing
    /// the first few calls or hanging forever.
    pub struct ScriptedSource {
        pub fares: Vec<f64>,
        pub failures: usize,
        pub hang: bool,
        pub kind: RecordSource,
        pub calls: Arc<AtomicUsize>,
        pub seen_since: Arc<std::sync::Mutex<Vec<Option<DateTime<Utc>>>>>,
        pub released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        pub fn new(fares: Vec<f64>) -> Self {
            Self {
                fares,
                failures: 0,
                hang: false,
                kind: RecordSource::Synthetic,
                calls: Arc::new(AtomicUsize::new(0)),
                seen_since: Arc::default(),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TripSource for ScriptedSource {
        fn id(&self) -> &'static str {
            "scripted"
        }

        fn name(&self) -> &'static str {
            "Scripted test source"
        }

        fn kind(&self) -> RecordSource {
            self.kind
        }

        async fn fetch(&self, options: &FetchOptions) -> Result<NormalizedBatch, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_since.lock().unwrap().push(options.since);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if call < self.failures {
                return Err(SourceError::UnexpectedResponse {
                    message: format!("scripted failure {call}"),
                });
            }
            let pickup = options.now - ChronoDuration::minutes(1);
            Ok(NormalizedBatch::accepted(
                self.fares
                    .iter()
                    .enumerate()
                    .map(|(i, fare)| trip(&format!("c{call}-{i}"), 7, pickup, *fare))
                    .collect(),
            ))
        }
    }

    fn pipeline(source: ScriptedSource) -> Pipeline {
        Pipeline::new(
            Arc::new(PipelineConfig::default()),
            Box::new(source),
            Arc::new(StreamBuffers::default()),
        )
    }

    #[tokio::test]
    async fn detector_sees_mean_fare_not_single_trip() {
        let mut pipeline = pipeline(ScriptedSource::new(vec![60.0, 10.0, 10.0]));
        let summary = pipeline.tick(now()).await.unwrap();
        assert_eq!(summary.trips, 3);
        assert_eq!(summary.locations, 1);
        assert_eq!(summary.forecasts, 3);

        let heatmap = pipeline.buffers().heatmap().unwrap();
        let seven = &heatmap.data[0];
        assert_eq!(seven.location_id, 7);
        assert_eq!(seven.trip_count, 3);
        assert!((seven.avg_fare - 26.67).abs() < 0.01);
        assert!(
            pipeline
                .buffers()
                .recent_anomalies(10)
                .iter()
                .all(|e| e.kind != AnomalyKind::HighFare)
        );
    }

    #[tokio::test]
    async fn single_expensive_trip_raises_fare_and_low_demand() {
        let mut pipeline = pipeline(ScriptedSource::new(vec![80.0]));
        pipeline.tick(now()).await.unwrap();
        let kinds: Vec<_> = pipeline
            .buffers()
            .recent_anomalies(10)
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![AnomalyKind::LowDemand, AnomalyKind::HighFare]);
    }

    #[tokio::test]
    async fn failed_fetch_publishes_nothing() {
        let mut source = ScriptedSource::new(vec![10.0]);
        source.failures = 1;
        let mut pipeline = pipeline(source);

        assert!(pipeline.tick(now()).await.is_err());
        assert!(pipeline.buffers().heatmap().is_none());
        assert_eq!(pipeline.buffers().demand_len(), 0);

        pipeline.tick(now()).await.unwrap();
        assert_eq!(pipeline.buffers().demand_len(), 1);
    }

    #[tokio::test]
    async fn expired_trips_leave_the_window() {
        let mut pipeline = pipeline(ScriptedSource::new(vec![10.0, 10.0]));
        pipeline.ingest(now()).await.unwrap();
        assert_eq!(pipeline.recompute(now()).trips, 2);
        let later = now() + ChronoDuration::hours(2);
        let summary = pipeline.recompute(later);
        assert_eq!(summary.trips, 0);
        assert!(pipeline.buffers().heatmap().unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn forecasts_clear_once_the_window_empties() {
        let mut pipeline = pipeline(ScriptedSource::new(vec![10.0, 10.0]));
        pipeline.ingest(now()).await.unwrap();
        assert_eq!(pipeline.recompute(now()).forecasts, 3);
        assert_eq!(pipeline.buffers().forecasts().len(), 3);

        pipeline.recompute(now() + ChronoDuration::hours(2));
        assert!(pipeline.buffers().forecasts().is_empty());
        assert_eq!(pipeline.buffers().stats().total_trips, 0);
    }

    #[tokio::test]
    async fn repeated_recomputes_count_window_trips_once() {
        let mut pipeline = pipeline(ScriptedSource::new(vec![10.0, 12.0, 14.0]));
        pipeline.ingest(now()).await.unwrap();
        for secs in [0, 5, 10, 15] {
            pipeline.recompute(now() + ChronoDuration::seconds(secs));
        }

        let stats = pipeline.buffers().stats();
        assert_eq!(stats.total_trips, 3);
        assert_eq!(stats.active_locations, 1);
        assert_eq!(pipeline.buffers().demand_len(), 4);
    }

    #[tokio::test]
    async fn recent_sample_window_uses_its_own_thresholds() {
        let config = PipelineConfig {
            window: WindowPolicy::RecentSample { count: 11 },
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(
            Arc::new(config),
            Box::new(ScriptedSource::new(vec![10.0; 8])),
            Arc::new(StreamBuffers::default()),
        );
        pipeline.ingest(now()).await.unwrap();
        pipeline.ingest(now()).await.unwrap();
        let summary = pipeline.recompute(now());
        assert_eq!(summary.trips, 11);
        let heatmap = pipeline.buffers().heatmap().unwrap();
        assert_eq!(
            heatmap.data[0].demand_level,
            taxi_demand_analytics_models::DemandLevel::High
        );
    }

    #[tokio::test]
    async fn live_sources_are_polled_incrementally() {
        let mut source = ScriptedSource::new(vec![10.0]);
        source.kind = RecordSource::Live;
        let seen = Arc::clone(&source.seen_since);
        let mut pipeline = pipeline(source);

        pipeline.ingest(now()).await.unwrap();
        pipeline.ingest(now()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], Some(now() - ChronoDuration::minutes(1)));
        assert_eq!(pipeline.fetch_interval(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn run_backs_off_after_failure_and_releases_source() {
        let mut source = ScriptedSource::new(vec![10.0]);
        source.failures = 1;
        let calls = Arc::clone(&source.calls);
        let released = Arc::clone(&source.released);
        let pipeline = pipeline(source);
        let buffers = Arc::clone(pipeline.buffers());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(pipeline.run(rx));

        // t=0 fails, backoff 10s, t=10 succeeds.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(buffers.demand_len() > 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_hung_fetch() {
        let mut source = ScriptedSource::new(vec![10.0]);
        source.hang = true;
        let released = Arc::clone(&source.released);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(pipeline(source).run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops_the_loop() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(pipeline(ScriptedSource::new(vec![1.0])).run(rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! In-process synthetic trip source.
//!
//! Stands in for the live feed when no upstream is configured. Every fetch
//! yields a fresh batch of generated trips around `FetchOptions::now`.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::{SeedableRng, rngs::StdRng};
use taxi_demand_trip_models::{BoundingBox, LocationId, RecordSource};

use crate::generator::TripGenerator;
use crate::normalize::NormalizedBatch;
use crate::{FetchOptions, SourceError, TripSource};

/// Trips generated per fetch when no limit is given.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Synthetic trip source backed by a [`TripGenerator`].
pub struct SyntheticSource {
    generator: TripGenerator,
    batch_size: usize,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    /// Creates a source seeded from the operating system.
    #[must_use]
    pub fn new(region: BoundingBox, max_location_id: LocationId, batch_size: usize) -> Self {
        Self::with_rng(region, max_location_id, batch_size, StdRng::from_os_rng())
    }

    /// Creates a source with a fixed seed, for reproducible runs.
    #[must_use]
    pub fn seeded(
        region: BoundingBox,
        max_location_id: LocationId,
        batch_size: usize,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            region,
            max_location_id,
            batch_size,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        region: BoundingBox,
        max_location_id: LocationId,
        batch_size: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            generator: TripGenerator::new(region, max_location_id),
            batch_size,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl TripSource for SyntheticSource {
    fn id(&self) -> &'static str {
        "synthetic"
    }

    fn name(&self) -> &'static str {
        "Synthetic trip generator"
    }

    fn kind(&self) -> RecordSource {
        RecordSource::Synthetic
    }

    async fn fetch(&self, options: &FetchOptions) -> Result<NormalizedBatch, SourceError> {
        let count = options
            .limit
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(self.batch_size);

        let records = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.generator.generate(&mut *rng, count, options.now)
        };

        log::debug!("Generated {} synthetic trips", records.len());
        Ok(NormalizedBatch::accepted(records))
    }
}

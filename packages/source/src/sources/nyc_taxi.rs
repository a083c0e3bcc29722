//! NYC Open Data taxi trip source.
//!
//! Polls the Socrata trip dataset newest-first and normalizes each page
//! through the live field mapping.
//! Default dataset: <https://data.cityofnewyork.us/resource/t29m-gskq>

use std::time::Duration;

use async_trait::async_trait;
use taxi_demand_trip_models::RecordSource;

use crate::normalize::{NormalizedBatch, Normalizer, RawRecord};
use crate::retry::RetryPolicy;
use crate::socrata::{SocrataConfig, fetch_page};
use crate::{FetchOptions, SourceError, TripSource};

/// Default Socrata resource root.
pub const DEFAULT_BASE_URL: &str = "https://data.cityofnewyork.us/resource";

/// Default trip dataset.
pub const DEFAULT_DATASET_ID: &str = "t29m-gskq";

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 1000;

/// Per-request timeout for a page fetch.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("taxi_demand/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`NycTaxiSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NycTaxiOptions {
    pub base_url: String,
    pub dataset_id: String,
    /// Page size used when the fetch itself does not set a limit.
    pub limit: u64,
    pub timeout: Duration,
}

impl Default for NycTaxiOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            dataset_id: DEFAULT_DATASET_ID.to_string(),
            limit: DEFAULT_LIMIT,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// NYC taxi trip feed.
pub struct NycTaxiSource {
    client: reqwest::Client,
    options: NycTaxiOptions,
    normalizer: Normalizer,
    retry: RetryPolicy,
}

impl NycTaxiSource {
    /// Creates a new source with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(
        options: NycTaxiOptions,
        normalizer: Normalizer,
        retry: RetryPolicy,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            options,
            normalizer,
            retry,
        })
    }

    /// Normalizes one page of raw feed records.
    #[must_use]
    pub fn normalize_page(&self, page: Vec<serde_json::Value>) -> NormalizedBatch {
        let raw: Vec<RawRecord> = page.into_iter().map(RawRecord::Live).collect();
        let batch = self.normalizer.normalize_batch(&raw);
        log::info!(
            "Normalized {} trips from {} raw records",
            batch.records.len(),
            raw.len()
        );
        batch
    }

    fn socrata(&self) -> SocrataConfig<'_> {
        SocrataConfig {
            base_url: &self.options.base_url,
            dataset_id: &self.options.dataset_id,
            date_column: "pickup_datetime",
            label: "NYC taxi",
        }
    }
}

#[async_trait]
impl TripSource for NycTaxiSource {
    fn id(&self) -> &'static str {
        "nyc_taxi"
    }

    fn name(&self) -> &'static str {
        "NYC Open Data taxi trips"
    }

    fn kind(&self) -> RecordSource {
        RecordSource::Live
    }

    async fn fetch(&self, options: &FetchOptions) -> Result<NormalizedBatch, SourceError> {
        let limit = options.limit.unwrap_or(self.options.limit);
        let page = fetch_page(
            &self.client,
            &self.socrata(),
            &self.retry,
            limit,
            options.since,
        )
        .await?;
        Ok(self.normalize_page(page))
    }
}

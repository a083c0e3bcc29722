#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trip record sources, synthetic generation, and normalization.
//!
//! Each record producer implements the [`TripSource`] trait. The live
//! open-data feed fetches raw JSON and runs it through the
//! [`normalize::Normalizer`]; the synthetic generator produces canonical
//! [`TripRecord`](taxi_demand_trip_models::TripRecord)s directly.

pub mod generator;
pub mod normalize;
pub mod parsing;
pub mod retry;
pub mod socrata;
pub mod sources;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taxi_demand_trip_models::RecordSource;

use crate::normalize::NormalizedBatch;

/// Errors that can occur while fetching from a trip source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request did not complete within the client timeout.
    #[error("Request to {url} timed out")]
    Timeout {
        /// URL that timed out.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Request URL.
        url: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Parameters for a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Reference time for the fetch. Synthetic pickups are generated
    /// relative to it.
    pub now: DateTime<Utc>,
    /// Only fetch records picked up at or after this timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of records to fetch.
    pub limit: Option<u64>,
}

impl FetchOptions {
    /// Options for an unfiltered fetch at `now`.
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            since: None,
            limit: None,
        }
    }
}

/// Trait that all trip sources implement.
///
/// A fetch yields the already-normalized records of one poll plus the
/// rejections the normalizer logged along the way. A failed fetch never
/// yields partial records.
#[async_trait]
pub trait TripSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"nyc_taxi"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Returns the tag stamped on records from this source.
    fn kind(&self) -> RecordSource;

    /// Fetches one batch of trips.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the upstream cannot be reached or its
    /// response cannot be decoded.
    async fn fetch(&self, options: &FetchOptions) -> Result<NormalizedBatch, SourceError>;
}

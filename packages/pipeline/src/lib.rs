#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxi demand pipeline: driver loop, console consumer, health check.
//!
//! The [`driver::Pipeline`] owns the trip source and the trip window and
//! is the only writer to the shared
//! [`StreamBuffers`](taxi_demand_stream::StreamBuffers). The
//! [`consumer::Consumer`] reads them on its own intervals. Both stop when
//! the shutdown channel flips to `true`.

pub mod config;
pub mod consumer;
pub mod driver;
pub mod health;

use taxi_demand_source::SourceError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that prevent the pipeline from starting.
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The record source could not be constructed.
    #[error("Failed to initialize trip source: {0}")]
    Source(#[from] SourceError),
}

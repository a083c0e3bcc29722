//! Concrete trip source implementations.
//!
//! Each module implements the [`TripSource`](crate::TripSource) trait for a
//! specific record producer.

pub mod nyc_taxi;
pub mod synthetic;

//! Window policies and the in-memory trip window.
//!
//! Two policies are supported. The recency window keeps every trip picked
//! up within the last `hours` hours of the tick time; the recent-sample
//! window keeps the last `count` trips received regardless of their
//! timestamps. Each policy carries its own demand-level cut-offs.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taxi_demand_analytics_models::DemandThresholds;
use taxi_demand_trip_models::TripRecord;

/// Which trips a tick aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Trips with `now - hours <= pickup_time <= now`.
    Recency {
        /// Window length in hours.
        hours: u32,
    },
    /// The last `count` trips received.
    RecentSample {
        /// Number of trips kept.
        count: usize,
    },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::Recency { hours: 1 }
    }
}

impl WindowPolicy {
    /// Demand-level cut-offs that go with this policy.
    #[must_use]
    pub const fn demand_thresholds(&self) -> DemandThresholds {
        match self {
            Self::Recency { .. } => DemandThresholds::HEATMAP,
            Self::RecentSample { .. } => DemandThresholds::RECENT_TRIPS,
        }
    }

    /// Returns `true` if the policy describes a non-empty window.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        match self {
            Self::Recency { hours } => *hours > 0,
            Self::RecentSample { count } => *count > 0,
        }
    }

    /// Earliest pickup time kept by a recency window at `now`.
    ///
    /// A window reaching past the representable range starts at
    /// [`DateTime::MIN_UTC`].
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Recency { hours } => Some(
                now.checked_sub_signed(Duration::hours(i64::from(*hours)))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            Self::RecentSample { .. } => None,
        }
    }
}

/// Selects the records a tick at `now` aggregates over.
///
/// `records` must be in arrival order. Pure; used by [`TripWindow`] and
/// directly by one-off computations.
#[must_use]
pub fn select<'a>(
    policy: &WindowPolicy,
    records: &'a [TripRecord],
    now: DateTime<Utc>,
) -> Vec<&'a TripRecord> {
    match policy {
        WindowPolicy::Recency { .. } => records
            .iter()
            .filter(|r| in_recency_window(policy, r, now))
            .collect(),
        WindowPolicy::RecentSample { count } => {
            let skip = records.len().saturating_sub(*count);
            records[skip..].iter().collect()
        }
    }
}

fn in_recency_window(policy: &WindowPolicy, record: &TripRecord, now: DateTime<Utc>) -> bool {
    policy
        .cutoff(now)
        .is_none_or(|cutoff| record.pickup_time >= cutoff && record.pickup_time <= now)
}

/// Trips held between ticks, pruned according to a [`WindowPolicy`].
#[derive(Debug, Clone, Default)]
pub struct TripWindow {
    policy: WindowPolicy,
    records: VecDeque<TripRecord>,
}

impl TripWindow {
    /// Creates an empty window.
    #[must_use]
    pub const fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            records: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends newly received trips.
    ///
    /// A recent-sample window drops its oldest trips immediately so it
    /// never holds more than `count`.
    pub fn extend(&mut self, records: impl IntoIterator<Item = TripRecord>) {
        self.records.extend(records);
        if let WindowPolicy::RecentSample { count } = self.policy {
            let excess = self.records.len().saturating_sub(count);
            self.records.drain(..excess);
        }
    }

    /// Drops trips that fell out of a recency window. Returns the number
    /// of trips dropped.
    pub fn evict(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = self.policy.cutoff(now) else {
            return 0;
        };
        let before = self.records.len();
        self.records.retain(|r| r.pickup_time >= cutoff);
        before - self.records.len()
    }

    /// Trips a tick at `now` aggregates over.
    #[must_use]
    pub fn current(&self, now: DateTime<Utc>) -> Vec<&TripRecord> {
        self.records
            .iter()
            .filter(|r| in_recency_window(&self.policy, r, now))
            .collect()
    }

    /// Most recent pickup time held, if any.
    #[must_use]
    pub fn latest_pickup(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.pickup_time).max()
    }
}

//! Raw-record normalization into canonical [`TripRecord`]s.
//!
//! A [`RawRecord`] is tagged with the producer it came from; each producer
//! has a [`FieldMapping`] naming where every canonical field lives in its
//! JSON. [`Normalizer::normalize_batch`] is best-effort per record: a
//! record that fails validation is logged and skipped, the rest of the
//! batch continues.

use chrono::{DateTime, Utc};
use taxi_demand_trip_models::{
    BoundingBox, CalendarFeatures, LocationId, RecordSource, TripRecord,
};

use crate::parsing::{coerce_f64, coerce_i64, display_value, field, parse_trip_datetime};

// ── Field mapping ────────────────────────────────────────────────────────

/// Maps canonical trip fields to the JSON field names of one producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub id: &'static str,
    pub pickup_time: &'static str,
    pub dropoff_time: &'static str,
    pub pickup_location_id: &'static str,
    pub dropoff_location_id: &'static str,
    pub passenger_count: &'static str,
    pub trip_distance: &'static str,
    pub fare_amount: &'static str,
    pub tip_amount: &'static str,
    pub total_amount: &'static str,
    pub pickup_latitude: &'static str,
    pub pickup_longitude: &'static str,
    pub dropoff_latitude: &'static str,
    pub dropoff_longitude: &'static str,
}

/// Field names published by the NYC Open Data trip feed.
///
/// `payment_type`, `vendorid`, `ratecodeid` and `store_and_fwd_flag` are
/// also present in the feed but have no canonical counterpart.
pub const LIVE_FIELDS: FieldMapping = FieldMapping {
    id: "trip_id",
    pickup_time: "pickup_datetime",
    dropoff_time: "dropoff_datetime",
    pickup_location_id: "pulocationid",
    dropoff_location_id: "dolocationid",
    passenger_count: "passenger_count",
    trip_distance: "trip_distance",
    fare_amount: "fare_amount",
    tip_amount: "tip_amount",
    total_amount: "total_amount",
    pickup_latitude: "pickup_latitude",
    pickup_longitude: "pickup_longitude",
    dropoff_latitude: "dropoff_latitude",
    dropoff_longitude: "dropoff_longitude",
};

/// Canonical field names, as serialized from [`TripRecord`].
pub const CANONICAL_FIELDS: FieldMapping = FieldMapping {
    id: "id",
    pickup_time: "pickup_time",
    dropoff_time: "dropoff_time",
    pickup_location_id: "pickup_location_id",
    dropoff_location_id: "dropoff_location_id",
    passenger_count: "passenger_count",
    trip_distance: "trip_distance",
    fare_amount: "fare_amount",
    tip_amount: "tip_amount",
    total_amount: "total_amount",
    pickup_latitude: "pickup_latitude",
    pickup_longitude: "pickup_longitude",
    dropoff_latitude: "dropoff_latitude",
    dropoff_longitude: "dropoff_longitude",
};

// ── Raw input ────────────────────────────────────────────────────────────

/// A loosely-typed record, tagged with its producer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// A JSON object from the live open-data feed.
    Live(serde_json::Value),
    /// A JSON object with canonical field names.
    Synthetic(serde_json::Value),
}

impl RawRecord {
    /// Producer tag stamped on the normalized record.
    #[must_use]
    pub const fn source(&self) -> RecordSource {
        match self {
            Self::Live(_) => RecordSource::Live,
            Self::Synthetic(_) => RecordSource::Synthetic,
        }
    }

    /// Field names used by this record's producer.
    #[must_use]
    pub const fn mapping(&self) -> &'static FieldMapping {
        match self {
            Self::Live(_) => &LIVE_FIELDS,
            Self::Synthetic(_) => &CANONICAL_FIELDS,
        }
    }

    /// The raw JSON body.
    #[must_use]
    pub const fn fields(&self) -> &serde_json::Value {
        match self {
            Self::Live(value) | Self::Synthetic(value) => value,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Why a single raw record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The record is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is missing.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Producer field name.
        field: &'static str,
    },

    /// A field is present but cannot be coerced to its semantic type.
    #[error("field `{field}` is not a valid {expected}: {value}")]
    InvalidField {
        /// Producer field name.
        field: &'static str,
        /// Expected type, for the message.
        expected: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// A field parsed but lies outside its allowed range.
    #[error("field `{field}` out of range: {value}")]
    OutOfRange {
        /// Producer field name.
        field: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// The dropoff precedes the pickup.
    #[error("dropoff {dropoff} precedes pickup {pickup}")]
    DropoffBeforePickup {
        /// Parsed pickup time.
        pickup: DateTime<Utc>,
        /// Parsed dropoff time.
        dropoff: DateTime<Utc>,
    },

    /// A coordinate pair lies outside the serving region.
    #[error("`{field}` ({latitude}, {longitude}) is outside the serving region")]
    OutsideRegion {
        /// Producer latitude field name.
        field: &'static str,
        /// Parsed latitude.
        latitude: f64,
        /// Parsed longitude.
        longitude: f64,
    },
}

/// A rejected record and its position in the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Index of the record in the input batch.
    pub index: usize,
    /// Why it was rejected.
    pub error: ValidationError,
}

/// Outcome of normalizing one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// Records that passed validation, in input order.
    pub records: Vec<TripRecord>,
    /// Records that did not.
    pub rejections: Vec<Rejection>,
}

impl NormalizedBatch {
    /// Wraps records that need no validation (e.g. generated in-process).
    #[must_use]
    pub const fn accepted(records: Vec<TripRecord>) -> Self {
        Self {
            records,
            rejections: Vec::new(),
        }
    }
}

// ── Normalizer ───────────────────────────────────────────────────────────

/// Validates raw records against the serving region and location space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    region: BoundingBox,
    max_location_id: LocationId,
}

impl Normalizer {
    /// Creates a normalizer accepting location ids `1..=max_location_id`
    /// and coordinates inside `region`.
    #[must_use]
    pub const fn new(region: BoundingBox, max_location_id: LocationId) -> Self {
        Self {
            region,
            max_location_id,
        }
    }

    /// Normalizes a batch, logging one warning per rejected record.
    #[must_use]
    pub fn normalize_batch(&self, raw: &[RawRecord]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            records: Vec::with_capacity(raw.len()),
            rejections: Vec::new(),
        };

        for (index, record) in raw.iter().enumerate() {
            match self.normalize(record) {
                Ok(trip) => batch.records.push(trip),
                Err(error) => {
                    log::warn!(
                        "Skipping invalid {} record #{index}: {error}",
                        record.source()
                    );
                    batch.rejections.push(Rejection { index, error });
                }
            }
        }

        log::debug!(
            "Normalized {} trips from {} raw records ({} rejected)",
            batch.records.len(),
            raw.len(),
            batch.rejections.len()
        );
        batch
    }

    /// Normalizes a single record.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a required field is missing or any
    /// present field is malformed or out of range.
    pub fn normalize(&self, raw: &RawRecord) -> Result<TripRecord, ValidationError> {
        let record = raw.fields();
        if !record.is_object() {
            return Err(ValidationError::NotAnObject);
        }
        let fields = raw.mapping();
        let source = raw.source();

        // ── Timestamps ───────────────────────────────────────────
        let pickup_time = required_datetime(record, fields.pickup_time)?;
        let dropoff_time = optional_datetime(record, fields.dropoff_time)?;
        if let Some(dropoff) = dropoff_time
            && dropoff < pickup_time
        {
            return Err(ValidationError::DropoffBeforePickup {
                pickup: pickup_time,
                dropoff,
            });
        }

        // ── Locations ────────────────────────────────────────────
        let pickup_location_id = self.location_id(record, fields.pickup_location_id)?;
        let dropoff_location_id = self.location_id(record, fields.dropoff_location_id)?;
        if pickup_location_id.is_none() && dropoff_location_id.is_none() {
            return Err(ValidationError::MissingField {
                field: fields.pickup_location_id,
            });
        }

        // ── Counts and amounts ───────────────────────────────────
        let passenger_count = passenger_count(record, fields.passenger_count)?;
        let trip_distance = non_negative(record, fields.trip_distance)?;
        let fare_amount = non_negative(record, fields.fare_amount)?;
        let tip_amount = non_negative(record, fields.tip_amount)?;
        let total_amount = non_negative(record, fields.total_amount)?;

        // ── Coordinates ──────────────────────────────────────────
        let pickup = self.coordinates(record, fields.pickup_latitude, fields.pickup_longitude)?;
        let dropoff =
            self.coordinates(record, fields.dropoff_latitude, fields.dropoff_longitude)?;

        let id = record_id(record, fields.id)
            .unwrap_or_else(|| format!("{source}_{}", uuid::Uuid::new_v4()));
        let calendar = CalendarFeatures::derive(pickup_time);

        Ok(TripRecord {
            id,
            pickup_time,
            dropoff_time,
            pickup_location_id,
            dropoff_location_id,
            passenger_count,
            trip_distance,
            fare_amount,
            tip_amount,
            total_amount,
            pickup_latitude: pickup.map(|(lat, _)| lat),
            pickup_longitude: pickup.map(|(_, lng)| lng),
            dropoff_latitude: dropoff.map(|(lat, _)| lat),
            dropoff_longitude: dropoff.map(|(_, lng)| lng),
            pickup_hour: calendar.hour,
            pickup_weekday: calendar.weekday,
            is_weekend: calendar.is_weekend,
            is_rush_hour: calendar.is_rush_hour,
            source,
        })
    }

    fn location_id(
        &self,
        record: &serde_json::Value,
        name: &'static str,
    ) -> Result<Option<LocationId>, ValidationError> {
        let Some(value) = field(record, name) else {
            return Ok(None);
        };
        let id = coerce_i64(value).ok_or_else(|| ValidationError::InvalidField {
            field: name,
            expected: "location id",
            value: display_value(value),
        })?;
        LocationId::try_from(id)
            .ok()
            .filter(|id| (1..=self.max_location_id).contains(id))
            .map(Some)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: name,
                value: display_value(value),
            })
    }

    /// Zero coordinates and half-present pairs are treated as missing.
    fn coordinates(
        &self,
        record: &serde_json::Value,
        lat_name: &'static str,
        lng_name: &'static str,
    ) -> Result<Option<(f64, f64)>, ValidationError> {
        let latitude = optional_f64(record, lat_name)?;
        let longitude = optional_f64(record, lng_name)?;
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Ok(None);
        };
        if latitude == 0.0 || longitude == 0.0 {
            return Ok(None);
        }
        if !self.region.contains(latitude, longitude) {
            return Err(ValidationError::OutsideRegion {
                field: lat_name,
                latitude,
                longitude,
            });
        }
        Ok(Some((latitude, longitude)))
    }
}

// ── Field helpers ────────────────────────────────────────────────────────

fn required_datetime(
    record: &serde_json::Value,
    name: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    optional_datetime(record, name)?.ok_or(ValidationError::MissingField { field: name })
}

fn optional_datetime(
    record: &serde_json::Value,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(value) = field(record, name) else {
        return Ok(None);
    };
    value
        .as_str()
        .and_then(parse_trip_datetime)
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidField {
            field: name,
            expected: "timestamp",
            value: display_value(value),
        })
}

fn optional_f64(
    record: &serde_json::Value,
    name: &'static str,
) -> Result<Option<f64>, ValidationError> {
    let Some(value) = field(record, name) else {
        return Ok(None);
    };
    coerce_f64(value)
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidField {
            field: name,
            expected: "number",
            value: display_value(value),
        })
}

/// Absent amounts default to zero; present ones must be non-negative.
fn non_negative(record: &serde_json::Value, name: &'static str) -> Result<f64, ValidationError> {
    match optional_f64(record, name)? {
        None => Ok(0.0),
        Some(n) if n >= 0.0 => Ok(n),
        Some(n) => Err(ValidationError::OutOfRange {
            field: name,
            value: n.to_string(),
        }),
    }
}

/// Absent counts default to a single passenger.
fn passenger_count(record: &serde_json::Value, name: &'static str) -> Result<u32, ValidationError> {
    let Some(value) = field(record, name) else {
        return Ok(1);
    };
    let n = coerce_i64(value).ok_or_else(|| ValidationError::InvalidField {
        field: name,
        expected: "integer",
        value: display_value(value),
    })?;
    u32::try_from(n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: name,
            value: display_value(value),
        })
}

/// Returns the first non-empty string id, falling back to numeric ids.
fn record_id(record: &serde_json::Value, name: &str) -> Option<String> {
    let value = field(record, name)?;
    if let Some(s) = value.as_str() {
        return (!s.is_empty()).then(|| s.to_string());
    }
    value.as_i64().map(|n| n.to_string())
}

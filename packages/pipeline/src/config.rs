//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once at startup and handed to every
//! component constructor. Layers, lowest precedence first: built-in
//! defaults, an optional TOML file, environment variables, then CLI
//! flags (applied by the binary).
//!
//! ```toml
//! [source]
//! mode = "live"
//! limit = 500
//!
//! [window]
//! policy = "recent_sample"
//! count = 200
//!
//! [anomaly]
//! high_fare = 75.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use taxi_demand_analytics::anomaly::AnomalyThresholds;
use taxi_demand_analytics::window::WindowPolicy;
use taxi_demand_source::sources::{nyc_taxi, synthetic};
use taxi_demand_stream::BufferLimits;
use taxi_demand_trip_models::{BoundingBox, LocationId};

/// Overrides the live API resource root.
pub const ENV_BASE_URL: &str = "NYC_API_BASE_URL";
/// Overrides the live dataset id.
pub const ENV_DATASET_ID: &str = "NYC_API_DATASET_ID";
/// Overrides the live page size.
pub const ENV_LIMIT: &str = "NYC_API_LIMIT";
/// Selects the record source (`synthetic` or `live`).
pub const ENV_SOURCE: &str = "TAXI_DEMAND_SOURCE";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// The merged configuration is inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Which producer feeds the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceMode {
    /// In-process generator.
    #[default]
    Synthetic,
    /// NYC Open Data trip feed.
    Live,
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub base_url: String,
    pub dataset_id: String,
    /// Live page size.
    pub limit: u64,
    /// Trips generated per synthetic tick.
    pub batch_size: usize,
    /// Fixed generator seed, for reproducible synthetic runs.
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::default(),
            base_url: nyc_taxi::DEFAULT_BASE_URL.to_string(),
            dataset_id: nyc_taxi::DEFAULT_DATASET_ID.to_string(),
            limit: nyc_taxi::DEFAULT_LIMIT,
            batch_size: synthetic::DEFAULT_BATCH_SIZE,
            seed: None,
        }
    }
}

/// `[region]` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Location ids run from 1 to this value.
    pub max_location_id: LocationId,
    pub bounds: BoundingBox,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            max_location_id: 50,
            bounds: BoundingBox::NYC,
        }
    }
}

/// `[buffers]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffersConfig {
    pub demand: BufferLimits,
    pub anomalies: BufferLimits,
}

impl Default for BuffersConfig {
    fn default() -> Self {
        Self {
            demand: BufferLimits::DEMAND,
            anomalies: BufferLimits::ANOMALIES,
        }
    }
}

/// `[schedule]` section. All values in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Synthetic generation interval.
    pub synthetic_interval_secs: u64,
    /// Live polling interval.
    pub live_poll_secs: u64,
    /// Aggregation recompute interval.
    pub recompute_secs: u64,
    /// Delay before the next fetch after a failed one.
    pub backoff_secs: u64,
    /// Per-request timeout for live fetches.
    pub request_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            synthetic_interval_secs: 5,
            live_poll_secs: 30,
            recompute_secs: 5,
            backoff_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ScheduleConfig {
    /// Fetch interval for the given source mode.
    #[must_use]
    pub const fn fetch_interval(&self, mode: SourceMode) -> Duration {
        match mode {
            SourceMode::Synthetic => Duration::from_secs(self.synthetic_interval_secs),
            SourceMode::Live => Duration::from_secs(self.live_poll_secs),
        }
    }

    #[must_use]
    pub const fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_secs)
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `[consumer]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub demand_secs: u64,
    pub anomaly_secs: u64,
    pub heatmap_secs: u64,
    pub forecast_secs: u64,
    /// Demand records shown per refresh.
    pub demand_rows: usize,
    /// Anomalies shown per refresh.
    pub anomaly_rows: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            demand_secs: 5,
            anomaly_secs: 3,
            heatmap_secs: 10,
            forecast_secs: 15,
            demand_rows: 50,
            anomaly_rows: 10,
        }
    }
}

/// The whole pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub region: RegionConfig,
    pub window: WindowPolicy,
    pub anomaly: AnomalyThresholds,
    pub buffers: BuffersConfig,
    pub schedule: ScheduleConfig,
    pub consumer: ConsumerConfig,
}

impl PipelineConfig {
    /// Loads defaults, then `path` if given, then the process environment,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// environment override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. Missing sections and keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(text)?)
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable value.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.source.base_url = url;
        }
        if let Some(id) = lookup(ENV_DATASET_ID) {
            self.source.dataset_id = id;
        }
        if let Some(value) = lookup(ENV_LIMIT) {
            self.source.limit = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_LIMIT,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_SOURCE) {
            self.source.mode = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_SOURCE,
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if !self.region.bounds.is_valid() {
            return invalid("region.bounds must have min < max on both axes");
        }
        if self.region.max_location_id == 0 {
            return invalid("region.max_location_id must be at least 1");
        }
        if !self.window.is_valid() {
            return invalid("window must cover at least one hour or one trip");
        }
        if !self.buffers.demand.is_valid() || !self.buffers.anomalies.is_valid() {
            return invalid("buffers need 0 < retain < capacity");
        }
        if self.source.limit == 0 || self.source.batch_size == 0 {
            return invalid("source.limit and source.batch_size must be positive");
        }
        if self.source.mode == SourceMode::Live && self.source.base_url.trim().is_empty() {
            return invalid("source.base_url is required for live mode");
        }
        let s = &self.schedule;
        let c = &self.consumer;
        if [
            s.synthetic_interval_secs,
            s.live_poll_secs,
            s.recompute_secs,
            s.request_timeout_secs,
            c.demand_secs,
            c.anomaly_secs,
            c.heatmap_secs,
            c.forecast_secs,
        ]
        .contains(&0)
        {
            return invalid("schedule and consumer intervals must be positive");
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }
}

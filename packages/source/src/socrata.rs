//! Socrata SODA API query building and single-page fetch.
//!
//! The trip feed is polled one page at a time: newest first via `$order`,
//! capped by `$limit`, and optionally filtered with `$where` to pickups
//! after the last poll.

use chrono::{DateTime, Utc};

use crate::{SourceError, retry::RetryPolicy};

/// Location of a Socrata dataset and how to page through it.
#[derive(Debug, Clone, Copy)]
pub struct SocrataConfig<'a> {
    /// Resource root (e.g., `"https://data.cityofnewyork.us/resource"`).
    pub base_url: &'a str,
    /// Dataset identifier (e.g., `"t29m-gskq"`).
    pub dataset_id: &'a str,
    /// Date column used for ordering and `$where` filtering.
    pub date_column: &'a str,
    /// Label for log messages.
    pub label: &'a str,
}

impl SocrataConfig<'_> {
    /// The dataset's JSON endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            self.dataset_id
        )
    }

    /// Query parameters for one page of at most `limit` records,
    /// optionally restricted to records newer than `since`.
    #[must_use]
    pub fn query(&self, limit: u64, since: Option<DateTime<Utc>>) -> Vec<(String, String)> {
        let mut params = vec![
            ("$limit".to_string(), limit.to_string()),
            ("$order".to_string(), format!("{} DESC", self.date_column)),
        ];
        if let Some(since) = since {
            let since_str = since.format("%Y-%m-%dT%H:%M:%S").to_string();
            params.push((
                "$where".to_string(),
                format!("{} > '{since_str}'", self.date_column),
            ));
        }
        params
    }
}

/// Fetches a single page of raw records.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after retries, or the
/// body is not a JSON array.
pub async fn fetch_page(
    client: &reqwest::Client,
    config: &SocrataConfig<'_>,
    policy: &RetryPolicy,
    limit: u64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<serde_json::Value>, SourceError> {
    let url = config.endpoint();
    let params = config.query(limit, since);

    log::info!("Fetching {} data: limit={limit}, since={since:?}", config.label);
    let body = crate::retry::send_json(policy, || client.get(&url).query(&params)).await?;

    match body {
        serde_json::Value::Array(records) => {
            log::info!("Downloaded {} {} records", records.len(), config.label);
            Ok(records)
        }
        other => Err(SourceError::UnexpectedResponse {
            message: format!(
                "expected a JSON array from {url}, got {}",
                json_kind(&other)
            ),
        }),
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const CONFIG: SocrataConfig<'static> = SocrataConfig {
        base_url: "https://data.cityofnewyork.us/resource/",
        dataset_id: "t29m-gskq",
        date_column: "pickup_datetime",
        label: "NYC taxi",
    };

    #[test]
    fn builds_endpoint() {
        assert_eq!(
            CONFIG.endpoint(),
            "https://data.cityofnewyork.us/resource/t29m-gskq.json"
        );
    }

    #[test]
    fn query_orders_newest_first() {
        let params = CONFIG.query(1000, None);
        assert_eq!(
            params,
            vec![
                ("$limit".to_string(), "1000".to_string()),
                ("$order".to_string(), "pickup_datetime DESC".to_string()),
            ]
        );
    }

    #[test]
    fn query_filters_since() {
        let since = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let params = CONFIG.query(50, Some(since));
        assert_eq!(
            params.last(),
            Some(&(
                "$where".to_string(),
                "pickup_datetime > '2024-01-15T08:00:00'".to_string()
            ))
        );
    }
}

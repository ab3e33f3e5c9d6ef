//! Meter API client
//!
//! Fetches hourly kVAh readings from the metering service. The endpoint
//! takes `startDateTime`/`endDateTime` query parameters formatted as
//! `YYYY-MM-DD+HH:MM` and answers with a `consumptionData` object mapping
//! `"YYYY-MM-DD HH:MM"` timestamps to values; values arrive as JSON numbers
//! or numeric strings depending on the meter firmware.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{Observation, TimeRange};
use crate::source::ReadingSource;

#[derive(Clone)]
pub struct MeterApiSource {
    base_url: String,
    client: reqwest::Client,
}

impl MeterApiSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("factory-load-forecast/0.2"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn url_for(&self, range: TimeRange) -> String {
        format!(
            "{}?startDateTime={}&endDateTime={}",
            self.base_url.trim_end_matches('/'),
            range.start.format("%Y-%m-%d+%H:%M"),
            range.end.format("%Y-%m-%d+%H:%M"),
        )
    }
}

#[async_trait]
impl ReadingSource for MeterApiSource {
    async fn fetch_observations(&self, range: TimeRange) -> Result<Vec<Observation>> {
        let url = self.url_for(range);
        let resp = self.client.get(&url).send().await.context("meter GET failed")?;
        let status = resp.status();
        let body = resp.text().await.context("meter read failed")?;
        if !status.is_success() {
            anyhow::bail!("meter API error: HTTP {status}: {body}");
        }

        let raw: MeterResponse =
            serde_json::from_str(&body).context("meter JSON parse failed")?;

        let mut observations = Vec::with_capacity(raw.consumption_data.len());
        for (stamp, value) in raw.consumption_data {
            let timestamp = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M")
                .with_context(|| format!("unparseable meter timestamp {stamp:?}"))?;
            let kvah = parse_value(&value)
                .with_context(|| format!("unparseable meter value for {stamp:?}"))?;
            observations.push(Observation { timestamp, kvah });
        }

        debug!(count = observations.len(), "meter readings fetched");
        Ok(observations)
    }
}

#[derive(Debug, Deserialize)]
struct MeterResponse {
    #[serde(rename = "consumptionData", default)]
    consumption_data: BTreeMap<String, serde_json::Value>,
}

fn parse_value(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_f64().ok_or_else(|| anyhow::anyhow!("non-finite number"))
        }
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(Into::into),
        other => anyhow::bail!("unexpected value type: {other}"),
    }
}

/// Fetch window for one ingestion run: resume one hour past the newest
/// persisted reading (or the configured history start) and stop at the end
/// of yesterday.
pub fn fetch_window(
    latest_persisted: Option<NaiveDateTime>,
    history_start: NaiveDateTime,
    now: NaiveDateTime,
) -> Option<TimeRange> {
    let yesterday_end = NaiveDateTime::new(now.date(), NaiveTime::MIN);
    let start = match latest_persisted {
        Some(latest) => latest + chrono::Duration::hours(1),
        None => history_start,
    };
    if start >= yesterday_end {
        return None; // already up to date
    }
    Some(TimeRange { start, end: yesterday_end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_parses_numbers_and_strings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "consumptionData": {
                    "2025-04-08 00:00": 101.5,
                    "2025-04-08 01:00": "98.25",
                }
            })))
            .mount(&server)
            .await;

        let source = MeterApiSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let observations = source
            .fetch_observations(TimeRange { start: ts(8, 0), end: ts(9, 0) })
            .await
            .unwrap();

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].timestamp, ts(8, 0));
        assert_eq!(observations[0].kvah, 101.5);
        assert_eq!(observations[1].kvah, 98.25);
    }

    #[tokio::test]
    async fn test_empty_payload_yields_no_observations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let source = MeterApiSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let observations = source
            .fetch_observations(TimeRange { start: ts(8, 0), end: ts(9, 0) })
            .await
            .unwrap();
        assert!(observations.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = MeterApiSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = source
            .fetch_observations(TimeRange { start: ts(8, 0), end: ts(9, 0) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP"));
    }

    #[test]
    fn test_url_uses_the_meter_timestamp_format() {
        let source =
            MeterApiSource::new("http://meter.local/api/".to_string(), Duration::from_secs(5))
                .unwrap();
        let url = source.url_for(TimeRange { start: ts(8, 0), end: ts(9, 0) });
        assert_eq!(
            url,
            "http://meter.local/api?startDateTime=2025-04-08+00:00&endDateTime=2025-04-09+00:00"
        );
    }

    #[test]
    fn test_fetch_window_resumes_after_latest() {
        let window = fetch_window(Some(ts(7, 22)), ts(1, 0), ts(9, 6)).unwrap();
        assert_eq!(window.start, ts(7, 23));
        assert_eq!(window.end, ts(9, 0));
    }

    #[test]
    fn test_fetch_window_uses_history_start_when_empty() {
        let window = fetch_window(None, ts(1, 0), ts(9, 6)).unwrap();
        assert_eq!(window.start, ts(1, 0));
    }

    #[test]
    fn test_fetch_window_skips_when_up_to_date() {
        assert!(fetch_window(Some(ts(8, 23)), ts(1, 0), ts(9, 6)).is_none());
    }
}

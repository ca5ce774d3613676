use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ImportConfig;
use crate::fetch_error::FetchError;
use crate::planner::TimeChunk;

/// One historian sample for one tag. Ephemeral; merged into records and
/// discarded. Absence is `None`, never a sentinel number.
#[derive(Debug, Clone)]
pub struct TagSample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub confidence: f64,
}

/// All samples returned for one (tag, chunk) request.
#[derive(Debug, Clone)]
pub struct TagFetch {
    pub tag_name: String,
    pub samples: Vec<TagSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HistorianRequest<'a> {
    sample_interval: String,
    resample_method: &'a str,
    minimum_confidence: u32,
    max_rows: u32,
    time_format: &'a str,
    reduction_data: &'a str,
    tag_name: &'a str,
    start_time: String,
    end_time: String,
    output_time_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct HistorianResponse {
    status: bool,
    message: Option<String>,
    #[serde(default)]
    data: Vec<HistorianSeries>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistorianSeries {
    tag_name: String,
    #[serde(default)]
    time_stamp: Vec<String>,
    #[serde(default)]
    value: Vec<Option<f64>>,
    #[serde(default)]
    confidence: Vec<f64>,
}

const RESAMPLE_METHOD: &str = "Average";
const REDUCTION_DATA: &str = "snap";
const TIME_FORMAT: &str = "DD-MON-YYYY HH:MI:SS.FFF";

const MONTH_ABBREV: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Render a UTC timestamp in the historian's line-protocol format,
/// e.g. `01-JAN-2024 00:00:00.000`.
pub fn format_historian_timestamp(dt: DateTime<Utc>) -> String {
    format!(
        "{:02}-{}-{:04} {}",
        dt.day(),
        MONTH_ABBREV[dt.month0() as usize],
        dt.year(),
        dt.format("%H:%M:%S%.3f")
    )
}

/// Parse the historian's `DD-MON-YYYY HH:MM:SS.mmm` timestamp back into UTC.
pub fn parse_historian_timestamp(s: &str) -> Result<DateTime<Utc>, FetchError> {
    let bad = |detail: &str| FetchError::Parse(format!("bad timestamp '{s}': {detail}"));

    let (date_part, time_part) = s
        .trim()
        .split_once(' ')
        .ok_or_else(|| bad("expected '<date> <time>'"))?;

    let mut date_fields = date_part.split('-');
    let day = date_fields
        .next()
        .and_then(|d| d.parse::<u32>().ok())
        .ok_or_else(|| bad("day"))?;
    let month_name = date_fields.next().ok_or_else(|| bad("month"))?;
    let year = date_fields
        .next()
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(|| bad("year"))?;

    let month = MONTH_ABBREV
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))
        .ok_or_else(|| bad("month name"))? as u32
        + 1;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad("calendar date"))?;
    let time =
        NaiveTime::parse_from_str(time_part, "%H:%M:%S%.3f").map_err(|_| bad("time of day"))?;

    Ok(DateTime::<Utc>::from_naive_utc_and_offset(
        date.and_time(time),
        Utc,
    ))
}

/// Client for the plant historian's sampled-history endpoint. Issues one POST
/// per (tag, chunk); the caller sequences requests and spaces them out.
#[derive(Clone)]
pub struct HistorianClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    sample_interval_secs: u32,
    min_confidence: u32,
    max_rows: u32,
}

impl HistorianClient {
    pub fn new(config: &ImportConfig) -> Self {
        Self::with_url(config, config.historian_url.clone())
    }

    /// Build against an explicit URL (tests point this at a mock server).
    pub fn with_url(config: &ImportConfig, url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            url,
            api_key: config.historian_api_key.clone(),
            sample_interval_secs: config.sample_interval_minutes * 60,
            min_confidence: config.min_confidence as u32,
            max_rows: config.max_rows,
        }
    }

    /// Fetch one tag over one chunk. Transport, API-status and payload-shape
    /// failures are distinct error variants; all are recoverable per tag.
    #[instrument(skip(self, chunk), fields(tag = %tag, start = %chunk.start, end = %chunk.end))]
    pub async fn fetch_tag(&self, tag: &str, chunk: &TimeChunk) -> Result<TagFetch, FetchError> {
        let body = HistorianRequest {
            sample_interval: self.sample_interval_secs.to_string(),
            resample_method: RESAMPLE_METHOD,
            minimum_confidence: self.min_confidence,
            max_rows: self.max_rows,
            time_format: TIME_FORMAT,
            reduction_data: REDUCTION_DATA,
            tag_name: tag,
            start_time: format_historian_timestamp(chunk.start),
            end_time: format_historian_timestamp(chunk.end),
            output_time_format: TIME_FORMAT,
        };

        debug!("Requesting samples from historian");
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api(format!(
                "HTTP {status} while fetching {tag}"
            )));
        }

        let text = response.text().await?;
        let parsed: HistorianResponse = serde_json::from_str(&text)
            .map_err(|e| FetchError::Parse(format!("invalid JSON payload: {e}")))?;

        if !parsed.status {
            return Err(FetchError::Api(
                parsed
                    .message
                    .unwrap_or_else(|| "historian returned status=false".to_string()),
            ));
        }

        let series = parsed
            .data
            .into_iter()
            .find(|s| s.tag_name == tag)
            .ok_or_else(|| FetchError::Parse(format!("response carries no series for {tag}")))?;

        Self::samples_from_series(series)
    }

    /// Zip the parallel timestamp/value/confidence arrays into samples.
    fn samples_from_series(series: HistorianSeries) -> Result<TagFetch, FetchError> {
        let n = series.time_stamp.len();
        if series.value.len() != n || series.confidence.len() != n {
            return Err(FetchError::Parse(format!(
                "parallel arrays for {} disagree: {} timestamps, {} values, {} confidences",
                series.tag_name,
                n,
                series.value.len(),
                series.confidence.len()
            )));
        }

        let mut samples = Vec::with_capacity(n);
        for ((ts, value), confidence) in series
            .time_stamp
            .iter()
            .zip(series.value)
            .zip(series.confidence)
        {
            samples.push(TagSample {
                timestamp: parse_historian_timestamp(ts)?,
                value,
                confidence,
            });
        }

        debug!("Parsed {} samples for {}", samples.len(), series.tag_name);
        Ok(TagFetch {
            tag_name: series.tag_name,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_historian_timestamp() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_historian_timestamp(dt), "01-JAN-2024 00:00:00.000");

        let dt = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(format_historian_timestamp(dt), "31-DEC-2023 23:59:59.000");
    }

    #[test]
    fn test_parse_historian_timestamp() {
        let dt = parse_historian_timestamp("15-MAR-2024 06:30:00.000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_historian_timestamp_with_millis() {
        let dt = parse_historian_timestamp("01-JUL-2024 12:00:00.500").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_historian_timestamp_mixed_case_month() {
        assert!(parse_historian_timestamp("01-Jan-2024 00:00:00.000").is_ok());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 8, 9, 17, 45, 3).unwrap();
        let formatted = format_historian_timestamp(dt);
        assert_eq!(parse_historian_timestamp(&formatted).unwrap(), dt);
    }

    #[test]
    fn test_parse_historian_timestamp_rejects_garbage() {
        assert!(parse_historian_timestamp("2024-01-01T00:00:00Z").is_err());
        assert!(parse_historian_timestamp("32-JAN-2024 00:00:00.000").is_err());
        assert!(parse_historian_timestamp("01-FOO-2024 00:00:00.000").is_err());
        assert!(parse_historian_timestamp("").is_err());
    }

    #[test]
    fn test_samples_from_series_rejects_mismatched_arrays() {
        let series = HistorianSeries {
            tag_name: "UNIT1.GEN.MW".to_string(),
            time_stamp: vec!["01-JAN-2024 00:00:00.000".to_string()],
            value: vec![Some(1.0), Some(2.0)],
            confidence: vec![100.0],
        };
        assert!(matches!(
            HistorianClient::samples_from_series(series),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_samples_from_series_preserves_null_values() {
        let series = HistorianSeries {
            tag_name: "UNIT1.GEN.MW".to_string(),
            time_stamp: vec![
                "01-JAN-2024 00:00:00.000".to_string(),
                "01-JAN-2024 00:01:00.000".to_string(),
            ],
            value: vec![None, Some(0.0)],
            confidence: vec![100.0, 100.0],
        };
        let fetched = HistorianClient::samples_from_series(series).unwrap();
        assert_eq!(fetched.samples[0].value, None);
        assert_eq!(fetched.samples[1].value, Some(0.0));
    }
}

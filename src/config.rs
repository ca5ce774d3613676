use std::env;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub historian_url: String,
    pub historian_api_key: String,
    /// Discriminator written to every imported row; rows from other ingest
    /// paths carry a different (or no) device id.
    pub device_id: Option<String>,
    pub sample_interval_minutes: u32,
    pub chunk_days: i64,
    pub min_confidence: f64,
    /// Minimum present fields for a record to pass validation (12 = all).
    pub min_fields_present: usize,
    /// Filled-cell fraction below which a chunk is re-fetched.
    pub quality_threshold: f64,
    pub max_retries: u32,
    pub retry_cooldown_secs: u64,
    /// Pause between consecutive historian requests (rate-limit courtesy).
    pub request_delay_ms: u64,
    pub upsert_batch_size: usize,
    pub completeness_threshold: f64,
    pub null_ratio_threshold: f64,
    pub max_rows: u32,
    /// Sanity cap for the derived current, in amperes.
    pub max_current_amps: f64,
    pub http_timeout_secs: u64,
    /// Fallback import start when storage is empty and no start was given.
    pub import_epoch: Option<String>,
}

impl ImportConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(ImportConfig {
            historian_url: env::var("HISTORIAN_URL")?,
            historian_api_key: env::var("HISTORIAN_API_KEY")?,
            device_id: env::var("DEVICE_ID").ok(),
            sample_interval_minutes: env_or("SAMPLE_INTERVAL_MINUTES", 1),
            chunk_days: env_or("CHUNK_DAYS", 6),
            min_confidence: env_or("MIN_CONFIDENCE", 90.0),
            min_fields_present: env_or("MIN_FIELDS_PRESENT", 12),
            quality_threshold: env_or("QUALITY_THRESHOLD", 0.95),
            max_retries: env_or("MAX_RETRY_FOR_NULLS", 5),
            retry_cooldown_secs: env_or("RETRY_COOLDOWN_SECS", 30),
            request_delay_ms: env_or("REQUEST_DELAY_MS", 500),
            upsert_batch_size: env_or("UPSERT_BATCH_SIZE", 1000),
            completeness_threshold: env_or("COMPLETENESS_THRESHOLD", 1.0),
            null_ratio_threshold: env_or("NULL_RATIO_THRESHOLD", 0.0),
            max_rows: env_or("MAX_ROWS", 10_000),
            max_current_amps: env_or("MAX_CURRENT_AMPS", 50_000.0),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 60),
            import_epoch: env::var("IMPORT_START_DATE").ok(),
        })
    }

    pub fn sample_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.sample_interval_minutes as i64)
    }

    /// Expected sample count for a window of the given duration at the
    /// configured interval.
    pub fn expected_samples(&self, duration: chrono::Duration) -> i64 {
        let interval_ms = self.sample_interval().num_milliseconds();
        if interval_ms == 0 {
            return 0;
        }
        duration.num_milliseconds() / interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_config() -> ImportConfig {
        ImportConfig {
            historian_url: String::new(),
            historian_api_key: String::new(),
            device_id: Some("unit-1".to_string()),
            sample_interval_minutes: 1,
            chunk_days: 6,
            min_confidence: 90.0,
            min_fields_present: 12,
            quality_threshold: 0.95,
            max_retries: 5,
            retry_cooldown_secs: 30,
            request_delay_ms: 500,
            upsert_batch_size: 1000,
            completeness_threshold: 1.0,
            null_ratio_threshold: 0.0,
            max_rows: 10_000,
            max_current_amps: 50_000.0,
            http_timeout_secs: 60,
            import_epoch: None,
        }
    }

    #[test]
    fn test_expected_samples_per_day_at_one_minute() {
        let config = test_config();
        assert_eq!(config.expected_samples(Duration::days(1)), 1440);
        assert_eq!(config.expected_samples(Duration::days(2)), 2880);
    }

    #[test]
    fn test_expected_samples_respects_configured_interval() {
        let mut config = test_config();
        config.sample_interval_minutes = 5;
        assert_eq!(config.expected_samples(Duration::hours(1)), 12);
    }
}

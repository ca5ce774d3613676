//! Shared utility functions for the import service

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse a CLI-supplied timestamp into UTC.
///
/// Accepts a bare date (`YYYY-MM-DD`, taken as midnight UTC) or a full
/// timestamp (`YYYY-MM-DDTHH:MM:SS`, `T` or space separated).
///
/// # Examples
///
/// ```
/// use turbine_telemetry_service::utils::parse_cli_timestamp;
///
/// assert!(parse_cli_timestamp("2024-01-01").is_ok());
/// assert!(parse_cli_timestamp("2024-01-01T06:30:00").is_ok());
/// assert!(parse_cli_timestamp("2024-01-01 06:30:00").is_ok());
/// assert!(parse_cli_timestamp("01/01/2024").is_err());
/// ```
pub fn parse_cli_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = value.trim();

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
        })
        .map_err(|_| {
            format!("'{trimmed}' is not a valid timestamp (expected YYYY-MM-DD[THH:MM:SS])")
        })?;

    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

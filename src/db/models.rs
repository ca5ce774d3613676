use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

// Database entity models

/// One persisted row of the `unit_readings` table, uniquely identified by
/// `(recorded_at, device_id)`. Sensor columns are nullable; NULL means the
/// historian never delivered a usable sample for that minute.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UnitReading {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub inlet_pressure: Option<f64>,
    pub flow_rate: Option<f64>,
    pub bearing_temperature: Option<f64>,
    pub active_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub power_factor: Option<f64>,
    pub rotor_speed: Option<f64>,
    pub guide_vane_position: Option<f64>,
    pub bypass_valve_position: Option<f64>,
    pub voltage_uv: Option<f64>,
    pub voltage_vw: Option<f64>,
    pub voltage_wu: Option<f64>,
    pub current_amps: Option<f64>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage-side coverage summary for one chunk, used to decide whether the
/// chunk can be skipped without fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessReport {
    pub existing_count: i64,
    pub expected_count: i64,
    /// Timestamps having at least one absent sensor field.
    pub null_count: i64,
    pub completeness_ratio: f64,
    pub null_ratio: f64,
}

impl CompletenessReport {
    /// A chunk is skippable when coverage meets the completeness threshold
    /// and the partial-record ratio is under the null threshold. A chunk with
    /// zero partial records always passes the null test, so the default
    /// threshold of 0.0 means "skip only when nothing at all is partial".
    pub fn is_complete(&self, completeness_threshold: f64, null_ratio_threshold: f64) -> bool {
        self.completeness_ratio >= completeness_threshold
            && (self.null_count == 0 || self.null_ratio < null_ratio_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(existing: i64, expected: i64, nulls: i64) -> CompletenessReport {
        CompletenessReport {
            existing_count: existing,
            expected_count: expected,
            null_count: nulls,
            completeness_ratio: if expected == 0 {
                0.0
            } else {
                existing as f64 / expected as f64
            },
            null_ratio: if existing == 0 {
                0.0
            } else {
                nulls as f64 / existing as f64
            },
        }
    }

    #[test]
    fn test_full_coverage_is_complete() {
        let r = report(8640, 8640, 0);
        assert!(r.is_complete(1.0, 0.0));
    }

    #[test]
    fn test_any_partial_record_fails_zero_tolerance() {
        let r = report(8640, 8640, 1);
        assert!(!r.is_complete(1.0, 0.0));
    }

    #[test]
    fn test_partial_coverage_is_incomplete() {
        let r = report(4000, 8640, 0);
        assert!(!r.is_complete(1.0, 0.1));
    }

    #[test]
    fn test_nulls_above_tolerance_force_refetch() {
        let r = report(8640, 8640, 900);
        assert!(!r.is_complete(1.0, 0.1));
    }
}

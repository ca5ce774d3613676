use tracing::debug;

use crate::merge::MergedRecord;
use crate::stats::ImportStats;
use crate::tags::SensorField;

/// Per-chunk quality summary over the merged records. In-memory only; gates
/// the retry/accept decision, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub total_records: usize,
    pub null_field_count: u64,
    pub avg_null_fields_per_record: f64,
    /// Filled fraction of all (record x field) cells, in `[0, 1]`.
    pub quality_ratio: f64,
}

/// True iff at least `min_fields` of the twelve sensor fields are present.
/// With the default minimum of 12 this means "every field present".
pub fn record_is_complete(record: &MergedRecord, min_fields: usize) -> bool {
    record.present_field_count() >= min_fields
}

/// Compute the absent-cell fraction across a chunk's records and accumulate
/// per-field null counts into `stats`. Pure over the records; an empty chunk
/// reports quality 0 so the caller treats it as retry-worthy.
pub fn quality_of<'a, I>(records: I, stats: &mut ImportStats) -> QualityReport
where
    I: IntoIterator<Item = &'a MergedRecord>,
{
    let mut total_records = 0usize;
    let mut null_field_count = 0u64;

    for record in records {
        total_records += 1;
        for field in SensorField::ALL {
            if record.get(field).is_none() {
                null_field_count += 1;
                *stats
                    .field_null_counts
                    .entry(field.column_name())
                    .or_default() += 1;
            }
        }
    }

    let total_cells = (total_records * SensorField::COUNT) as f64;
    let report = QualityReport {
        total_records,
        null_field_count,
        avg_null_fields_per_record: if total_records == 0 {
            0.0
        } else {
            null_field_count as f64 / total_records as f64
        },
        quality_ratio: if total_records == 0 {
            0.0
        } else {
            1.0 - null_field_count as f64 / total_cells
        },
    };

    debug!(
        "Quality: {} records, {} null fields, ratio {:.4}",
        report.total_records, report.null_field_count, report.quality_ratio
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record_with_fields(n: usize) -> MergedRecord {
        let mut record = MergedRecord::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), None);
        for field in SensorField::ALL.iter().take(n) {
            record.set(*field, 1.0);
        }
        record
    }

    #[test]
    fn test_record_is_complete_default_requires_all_twelve() {
        assert!(record_is_complete(&record_with_fields(12), 12));
        assert!(!record_is_complete(&record_with_fields(11), 12));
    }

    #[test]
    fn test_record_is_complete_loosened_minimum() {
        assert!(record_is_complete(&record_with_fields(8), 8));
        assert!(!record_is_complete(&record_with_fields(7), 8));
    }

    #[test]
    fn test_zero_counts_as_present() {
        let mut record = record_with_fields(11);
        record.set(SensorField::VoltageWu, 0.0);
        assert!(record_is_complete(&record, 12));
    }

    #[test]
    fn test_quality_of_full_records() {
        let records = vec![record_with_fields(12), record_with_fields(12)];
        let mut stats = ImportStats::default();
        let report = quality_of(&records, &mut stats);

        assert_eq!(report.total_records, 2);
        assert_eq!(report.null_field_count, 0);
        assert_eq!(report.quality_ratio, 1.0);
        assert_eq!(report.avg_null_fields_per_record, 0.0);
    }

    #[test]
    fn test_quality_of_partial_records() {
        // 2 records x 12 fields = 24 cells; 6 + 12 = 18 absent.
        let records = vec![record_with_fields(6), record_with_fields(0)];
        let mut stats = ImportStats::default();
        let report = quality_of(&records, &mut stats);

        assert_eq!(report.null_field_count, 18);
        assert!((report.quality_ratio - 0.25).abs() < 1e-12);
        assert_eq!(report.avg_null_fields_per_record, 9.0);
    }

    #[test]
    fn test_quality_of_empty_chunk_is_zero() {
        let records: Vec<MergedRecord> = Vec::new();
        let mut stats = ImportStats::default();
        let report = quality_of(&records, &mut stats);
        assert_eq!(report.total_records, 0);
        assert_eq!(report.quality_ratio, 0.0);
    }

    #[test]
    fn test_per_field_null_counts_accumulate() {
        let records = vec![record_with_fields(11)];
        let mut stats = ImportStats::default();
        quality_of(&records, &mut stats);

        // Only the last field (voltage_wu) was absent.
        assert_eq!(stats.field_null_counts.get("voltage_wu"), Some(&1));
        assert_eq!(stats.field_null_counts.get("inlet_pressure"), None);
    }
}

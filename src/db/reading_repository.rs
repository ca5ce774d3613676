use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::db::{CompletenessReport, DbError};
use crate::merge::MergedRecord;
use crate::planner::TimeChunk;
use crate::quality::record_is_complete;
use crate::tags::SensorField;

/// `WHERE` fragment matching rows with at least one absent sensor field.
fn any_field_null_predicate() -> String {
    SensorField::ALL
        .iter()
        .map(|f| format!("{} IS NULL", f.column_name()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Bulk merge-upsert statement. The conflict rule is a field-level coalesce:
/// an incoming NULL never overwrites a stored value, an incoming value always
/// wins over a stored NULL. Uniqueness is `(recorded_at, device_id)` with
/// NULL device ids treated as equal.
fn upsert_sql() -> String {
    let columns: Vec<&str> = SensorField::ALL.iter().map(|f| f.column_name()).collect();
    let coalesce_sets: Vec<String> = columns
        .iter()
        .chain(std::iter::once(&"current_amps"))
        .map(|c| format!("{c} = COALESCE(EXCLUDED.{c}, unit_readings.{c})"))
        .collect();

    format!(
        r#"
        INSERT INTO unit_readings (
            recorded_at, device_id, {cols}, current_amps, status
        )
        SELECT * FROM UNNEST(
            $1::timestamptz[], $2::text[],
            $3::float8[], $4::float8[], $5::float8[], $6::float8[],
            $7::float8[], $8::float8[], $9::float8[], $10::float8[],
            $11::float8[], $12::float8[], $13::float8[], $14::float8[],
            $15::float8[], $16::text[]
        )
        ON CONFLICT (recorded_at, device_id) DO UPDATE SET
            {sets},
            status = EXCLUDED.status
        "#,
        cols = columns.join(", "),
        sets = coalesce_sets.join(",\n            ")
    )
}

#[derive(Clone)]
pub struct ReadingRepository {
    pool: PgPool,
}

impl ReadingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Merge-upsert the given records in bounded batches inside a single
    /// transaction. Records with fewer than `min_fields` present fields are
    /// filtered out first. Any failure aborts the whole call; a partial,
    /// unordered write could break the monotonic-fill invariant.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn upsert_readings(
        &self,
        records: &[MergedRecord],
        min_fields: usize,
        batch_size: usize,
    ) -> Result<usize, DbError> {
        let accepted: Vec<&MergedRecord> = records
            .iter()
            .filter(|r| record_is_complete(r, min_fields))
            .collect();

        if accepted.len() < records.len() {
            debug!(
                "Filtered out {} records below the {}-field minimum",
                records.len() - accepted.len(),
                min_fields
            );
        }
        if accepted.is_empty() {
            return Ok(0);
        }

        let sql = upsert_sql();
        let mut tx = self.pool.begin().await?;
        let mut upserted = 0usize;

        for batch in accepted.chunks(batch_size.max(1)) {
            let mut recorded_at: Vec<DateTime<Utc>> = Vec::with_capacity(batch.len());
            let mut device_ids: Vec<Option<String>> = Vec::with_capacity(batch.len());
            let mut field_columns: Vec<Vec<Option<f64>>> =
                vec![Vec::with_capacity(batch.len()); SensorField::COUNT];
            let mut currents: Vec<Option<f64>> = Vec::with_capacity(batch.len());
            let mut statuses: Vec<String> = Vec::with_capacity(batch.len());

            for record in batch {
                recorded_at.push(record.recorded_at);
                device_ids.push(record.device_id.clone());
                for (slot, field) in field_columns.iter_mut().zip(SensorField::ALL) {
                    slot.push(record.get(field));
                }
                currents.push(record.current_amps);
                statuses.push(record.status.to_string());
            }

            let mut query = sqlx::query(&sql).bind(&recorded_at).bind(&device_ids);
            for column in &field_columns {
                query = query.bind(column);
            }
            let result = query
                .bind(&currents)
                .bind(&statuses)
                .execute(&mut *tx)
                .await?;

            upserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        info!("Upserted {} readings", upserted);
        Ok(upserted)
    }

    /// Most recent persisted timestamp for this import's device discriminator;
    /// the resume point is one sample interval past it.
    #[instrument(skip(self))]
    pub async fn latest_recorded_at(
        &self,
        device_id: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(recorded_at) FROM unit_readings WHERE device_id IS NOT DISTINCT FROM $1",
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;

        debug!("Latest persisted timestamp: {:?}", latest);
        Ok(latest)
    }

    /// Storage-side coverage for one chunk: distinct timestamps present,
    /// timestamps with at least one absent field, and the derived ratios
    /// against `expected_count`.
    #[instrument(skip(self, chunk), fields(start = %chunk.start, end = %chunk.end))]
    pub async fn completeness_for_range(
        &self,
        chunk: &TimeChunk,
        device_id: Option<&str>,
        expected_count: i64,
    ) -> Result<CompletenessReport, DbError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) AS existing,
                   COUNT(*) FILTER (WHERE {nulls}) AS null_count
            FROM unit_readings
            WHERE recorded_at >= $1 AND recorded_at < $2
              AND device_id IS NOT DISTINCT FROM $3
            "#,
            nulls = any_field_null_predicate()
        );

        let (existing_count, null_count): (i64, i64) = sqlx::query_as(&sql)
            .bind(chunk.start)
            .bind(chunk.end)
            .bind(device_id)
            .fetch_one(&self.pool)
            .await?;

        let report = CompletenessReport {
            existing_count,
            expected_count,
            null_count,
            completeness_ratio: if expected_count == 0 {
                0.0
            } else {
                existing_count as f64 / expected_count as f64
            },
            null_ratio: if existing_count == 0 {
                0.0
            } else {
                null_count as f64 / existing_count as f64
            },
        };

        debug!(
            "Completeness: {}/{} rows, {} partial",
            report.existing_count, report.expected_count, report.null_count
        );
        Ok(report)
    }

    /// All timestamps (for this device) whose row has at least one absent
    /// sensor field, oldest first. The orchestrator groups these into
    /// gap-runs for the fix-nulls mode.
    #[instrument(skip(self))]
    pub async fn find_null_timestamps(
        &self,
        device_id: Option<&str>,
    ) -> Result<Vec<DateTime<Utc>>, DbError> {
        let sql = format!(
            r#"
            SELECT recorded_at
            FROM unit_readings
            WHERE ({nulls}) AND device_id IS NOT DISTINCT FROM $1
            ORDER BY recorded_at
            "#,
            nulls = any_field_null_predicate()
        );

        let timestamps: Vec<DateTime<Utc>> = sqlx::query_scalar(&sql)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} null-bearing timestamps", timestamps.len());
        Ok(timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_predicate_covers_all_fields() {
        let predicate = any_field_null_predicate();
        for field in SensorField::ALL {
            assert!(predicate.contains(field.column_name()));
        }
        assert_eq!(predicate.matches(" OR ").count(), SensorField::COUNT - 1);
    }

    #[test]
    fn test_upsert_sql_coalesces_every_sensor_column() {
        let sql = upsert_sql();
        for field in SensorField::ALL {
            let c = field.column_name();
            assert!(sql.contains(&format!("{c} = COALESCE(EXCLUDED.{c}, unit_readings.{c})")));
        }
        assert!(sql.contains(
            "current_amps = COALESCE(EXCLUDED.current_amps, unit_readings.current_amps)"
        ));
        assert!(sql.contains("ON CONFLICT (recorded_at, device_id)"));
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::config::ImportConfig;
use crate::db::{DbError, ReadingRepository};
use crate::derived::compute_current;
use crate::historian::{HistorianClient, TagFetch};
use crate::merge::{merge_tag_fetches, MergedRecord};
use crate::planner::{plan_chunks, InvalidRangeError, TimeChunk};
use crate::quality::{quality_of, QualityReport};
use crate::stats::ImportStats;
use crate::tags::{validate_tag_bindings, SensorField};
use crate::utils::parse_cli_timestamp;

/// A gap-run must exceed this many consecutive null-bearing timestamps
/// before the fix-nulls mode re-fetches it.
pub const MIN_GAP_RUN_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DbError),
    #[error("Tag mapping invalid: {0}")]
    TagMapping(String),
    #[error("no start point: storage is empty and neither a start argument nor IMPORT_START_DATE was given")]
    NoStartPoint,
}

/// Per-run switches from the CLI surface.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Ignore the resume point and the completeness skip rule.
    pub force: bool,
    /// Repair null gap-runs instead of planning a range.
    pub fix_nulls: bool,
}

/// Drives the pipeline across chunks: resume-point discovery, skip/fetch/
/// retry decisions, statistics aggregation, and termination. Processing is
/// strictly sequential; the only shared state is the returned accumulator.
pub struct ImportOrchestrator {
    client: HistorianClient,
    repo: ReadingRepository,
    config: ImportConfig,
}

impl ImportOrchestrator {
    pub fn new(client: HistorianClient, repo: ReadingRepository, config: ImportConfig) -> Self {
        Self {
            client,
            repo,
            config,
        }
    }

    /// Run one import. The caller owns the accumulator so statistics survive
    /// a fatal abort and can still be reported.
    pub async fn run(
        &self,
        opts: &ImportOptions,
        stats: &mut ImportStats,
    ) -> Result<(), ImportError> {
        validate_tag_bindings().map_err(ImportError::TagMapping)?;

        if opts.fix_nulls {
            self.repair_null_runs(stats).await
        } else {
            self.import_range(opts, stats).await
        }
    }

    #[instrument(skip(self, opts, stats))]
    async fn import_range(
        &self,
        opts: &ImportOptions,
        stats: &mut ImportStats,
    ) -> Result<(), ImportError> {
        let end = opts.end.unwrap_or_else(Utc::now);
        let start = match opts.start {
            Some(start) => start,
            None => self.resolve_start_point(opts.force).await?,
        };

        let chunks = plan_chunks(start, end, self.config.chunk_days)?;
        info!(
            "Importing {} to {} in {} chunks of up to {} days",
            start,
            end,
            chunks.len(),
            self.config.chunk_days
        );

        stats.chunks_planned += chunks.len() as u64;

        for (index, chunk) in chunks.iter().enumerate() {
            if !opts.force && self.chunk_is_already_complete(chunk).await {
                info!(
                    "Chunk {}/{} ({} to {}) already complete, skipping",
                    index + 1,
                    chunks.len(),
                    chunk.start,
                    chunk.end
                );
                stats.chunks_skipped += 1;
                continue;
            }

            info!(
                "Processing chunk {}/{} ({} to {})",
                index + 1,
                chunks.len(),
                chunk.start,
                chunk.end
            );
            let chunk_stats = self.process_chunk(chunk).await?;
            stats.absorb(chunk_stats);
        }

        Ok(())
    }

    /// Secondary mode: no planning; query storage for runs of consecutive
    /// null-bearing timestamps and re-run fetch -> merge -> insert over each.
    #[instrument(skip(self, stats))]
    async fn repair_null_runs(&self, stats: &mut ImportStats) -> Result<(), ImportError> {
        let device_id = self.config.device_id.as_deref();
        let timestamps = self.repo.find_null_timestamps(device_id).await?;
        let runs = group_gap_runs(&timestamps, self.config.sample_interval(), MIN_GAP_RUN_LEN);

        info!(
            "Found {} null-bearing timestamps forming {} repairable gap runs",
            timestamps.len(),
            runs.len()
        );

        stats.chunks_planned += runs.len() as u64;

        for (run_start, run_last) in runs {
            let chunk = TimeChunk {
                start: run_start,
                end: run_last + self.config.sample_interval(),
            };
            info!("Repairing gap run {} to {}", chunk.start, chunk.end);
            let chunk_stats = self.process_chunk(&chunk).await?;
            stats.absorb(chunk_stats);
        }

        Ok(())
    }

    /// Resume point: latest persisted timestamp for this device plus one
    /// sample interval. Empty storage (or --force) falls back to the
    /// configured import epoch.
    async fn resolve_start_point(&self, force: bool) -> Result<DateTime<Utc>, ImportError> {
        if !force {
            if let Some(latest) = self
                .repo
                .latest_recorded_at(self.config.device_id.as_deref())
                .await?
            {
                let resume = latest + self.config.sample_interval();
                info!("Resuming from {} (latest persisted: {})", resume, latest);
                return Ok(resume);
            }
        }

        match &self.config.import_epoch {
            Some(epoch) => parse_cli_timestamp(epoch).map_err(|_| ImportError::NoStartPoint),
            None => Err(ImportError::NoStartPoint),
        }
    }

    /// Consult the completeness oracle. A query failure conservatively
    /// reports incomplete; skipping must never hide real work.
    async fn chunk_is_already_complete(&self, chunk: &TimeChunk) -> bool {
        let expected = self.config.expected_samples(chunk.duration());
        match self
            .repo
            .completeness_for_range(chunk, self.config.device_id.as_deref(), expected)
            .await
        {
            Ok(report) => report.is_complete(
                self.config.completeness_threshold,
                self.config.null_ratio_threshold,
            ),
            Err(e) => {
                warn!(
                    "Completeness query failed for {} to {} ({}), treating chunk as incomplete",
                    chunk.start, chunk.end, e
                );
                false
            }
        }
    }

    /// One chunk: fetch all tags, merge, judge quality, retry up to the
    /// limit, derive current, persist whatever was obtained.
    async fn process_chunk(&self, chunk: &TimeChunk) -> Result<ImportStats, DbError> {
        let (mut records, mut report, mut stats) = self.fetch_and_merge(chunk).await;
        let mut attempts = 0u32;

        // Bounded retry loop; the last fetch wins regardless of quality.
        while report.quality_ratio < self.config.quality_threshold
            && attempts < self.config.max_retries
        {
            attempts += 1;
            warn!(
                "Chunk {} to {} quality {:.4} below {:.4}, retry {}/{} after {}s cooldown",
                chunk.start,
                chunk.end,
                report.quality_ratio,
                self.config.quality_threshold,
                attempts,
                self.config.max_retries,
                self.config.retry_cooldown_secs
            );
            sleep(std::time::Duration::from_secs(self.config.retry_cooldown_secs)).await;

            let (next_records, next_report, next_stats) = self.fetch_and_merge(chunk).await;
            records = next_records;
            report = next_report;
            stats = next_stats;
        }

        stats.chunk_retries = attempts as u64;

        for record in records.values_mut() {
            record.current_amps = compute_current(record, self.config.max_current_amps, &mut stats);
        }

        // Partial data beats no data: anything merged is persisted, with
        // row-level validation applied inside the repository.
        if !records.is_empty() {
            let rows: Vec<MergedRecord> = records.into_values().collect();
            let upserted = self
                .repo
                .upsert_readings(
                    &rows,
                    self.config.min_fields_present,
                    self.config.upsert_batch_size,
                )
                .await?;
            stats.records_inserted += upserted as u64;
        } else {
            info!(
                "Chunk {} to {} produced no records, nothing to persist",
                chunk.start, chunk.end
            );
        }

        Ok(stats)
    }

    /// Fetch every tag sequentially (one outstanding request, fixed spacing),
    /// then merge and grade. Per-tag failures degrade quality, never abort.
    async fn fetch_and_merge(
        &self,
        chunk: &TimeChunk,
    ) -> (
        BTreeMap<DateTime<Utc>, MergedRecord>,
        QualityReport,
        ImportStats,
    ) {
        let mut stats = ImportStats::default();
        let mut fetches: Vec<TagFetch> = Vec::with_capacity(SensorField::COUNT);

        for (index, field) in SensorField::ALL.iter().enumerate() {
            if index > 0 {
                sleep(std::time::Duration::from_millis(self.config.request_delay_ms)).await;
            }

            let tag = field.tag_name();
            match self.client.fetch_tag(tag, chunk).await {
                Ok(fetch) => {
                    stats.samples_fetched += fetch.samples.len() as u64;
                    fetches.push(fetch);
                }
                Err(e) => {
                    warn!(
                        "Fetch failed for {} over {} to {}: {}",
                        tag, chunk.start, chunk.end, e
                    );
                    stats.fetch_errors += 1;
                    *stats.per_tag_errors.entry(tag.to_string()).or_default() += 1;
                }
            }
        }

        let records = merge_tag_fetches(
            &fetches,
            self.config.device_id.as_deref(),
            self.config.min_confidence,
            &mut stats,
        );
        let report = quality_of(records.values(), &mut stats);
        (records, report, stats)
    }
}

/// Group sorted timestamps into runs spaced exactly `interval` apart,
/// keeping only runs longer than `min_run_len`. Returns (first, last) of
/// each kept run. Spacing comes from the configured sample interval, never
/// a hard-coded minute.
pub fn group_gap_runs(
    timestamps: &[DateTime<Utc>],
    interval: Duration,
    min_run_len: usize,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut runs = Vec::new();
    let mut iter = timestamps.iter().copied();

    let Some(mut run_start) = iter.next() else {
        return runs;
    };
    let mut run_last = run_start;
    let mut run_len = 1usize;

    for ts in iter {
        if ts - run_last == interval {
            run_last = ts;
            run_len += 1;
        } else {
            if run_len > min_run_len {
                runs.push((run_start, run_last));
            }
            run_start = ts;
            run_last = ts;
            run_len = 1;
        }
    }

    if run_len > min_run_len {
        runs.push((run_start, run_last));
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minutes(offsets: &[i64]) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        offsets.iter().map(|m| base + Duration::minutes(*m)).collect()
    }

    #[test]
    fn test_run_of_six_is_kept() {
        let ts = minutes(&[0, 1, 2, 3, 4, 5]);
        let runs = group_gap_runs(&ts, Duration::minutes(1), MIN_GAP_RUN_LEN);
        assert_eq!(runs, vec![(ts[0], ts[5])]);
    }

    #[test]
    fn test_run_of_five_is_too_short() {
        let ts = minutes(&[0, 1, 2, 3, 4]);
        let runs = group_gap_runs(&ts, Duration::minutes(1), MIN_GAP_RUN_LEN);
        assert!(runs.is_empty());
    }

    #[test]
    fn test_gap_splits_runs() {
        // Two candidate runs separated by a jump; only the second is long
        // enough to repair.
        let ts = minutes(&[0, 1, 2, 100, 101, 102, 103, 104, 105, 106]);
        let runs = group_gap_runs(&ts, Duration::minutes(1), MIN_GAP_RUN_LEN);
        assert_eq!(runs, vec![(ts[3], ts[9])]);
    }

    #[test]
    fn test_irregular_spacing_breaks_a_run() {
        // 0..5 are one minute apart except a 2-minute jump at 3.
        let ts = minutes(&[0, 1, 2, 3, 5, 6, 7, 8, 9, 10, 11]);
        let runs = group_gap_runs(&ts, Duration::minutes(1), MIN_GAP_RUN_LEN);
        assert_eq!(runs, vec![(ts[4], ts[10])]);
    }

    #[test]
    fn test_interval_is_configurable() {
        // Five-minute sampling: the same offsets scaled by five group as one run.
        let ts = minutes(&[0, 5, 10, 15, 20, 25, 30]);
        assert_eq!(
            group_gap_runs(&ts, Duration::minutes(5), MIN_GAP_RUN_LEN),
            vec![(ts[0], ts[6])]
        );
        // But at one-minute spacing nothing groups.
        assert!(group_gap_runs(&ts, Duration::minutes(1), MIN_GAP_RUN_LEN).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(group_gap_runs(&[], Duration::minutes(1), MIN_GAP_RUN_LEN).is_empty());
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one import run. Chunk processing builds a fresh accumulator
/// per chunk and the orchestrator absorbs it into the run-level instance, so
/// no global mutable state is involved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportStats {
    pub chunks_planned: u64,
    pub chunks_skipped: u64,
    pub chunk_retries: u64,
    pub samples_fetched: u64,
    pub samples_low_confidence: u64,
    pub unmapped_tag_samples: u64,
    pub records_merged: u64,
    pub records_inserted: u64,
    pub zero_values_preserved: u64,
    pub current_computed: u64,
    pub current_rejected: u64,
    pub fetch_errors: u64,
    pub per_tag_samples: BTreeMap<String, u64>,
    pub per_tag_errors: BTreeMap<String, u64>,
    pub field_null_counts: BTreeMap<&'static str, u64>,
}

impl ImportStats {
    /// Fold a chunk-level accumulator into this run-level one.
    pub fn absorb(&mut self, other: ImportStats) {
        self.chunks_planned += other.chunks_planned;
        self.chunks_skipped += other.chunks_skipped;
        self.chunk_retries += other.chunk_retries;
        self.samples_fetched += other.samples_fetched;
        self.samples_low_confidence += other.samples_low_confidence;
        self.unmapped_tag_samples += other.unmapped_tag_samples;
        self.records_merged += other.records_merged;
        self.records_inserted += other.records_inserted;
        self.zero_values_preserved += other.zero_values_preserved;
        self.current_computed += other.current_computed;
        self.current_rejected += other.current_rejected;
        self.fetch_errors += other.fetch_errors;

        for (tag, count) in other.per_tag_samples {
            *self.per_tag_samples.entry(tag).or_default() += count;
        }
        for (tag, count) in other.per_tag_errors {
            *self.per_tag_errors.entry(tag).or_default() += count;
        }
        for (field, count) in other.field_null_counts {
            *self.field_null_counts.entry(field).or_default() += count;
        }
    }

    /// Final report block, printed once per run on every exit path.
    pub fn print_summary(&self, elapsed: Duration) {
        println!("\n{}", "=".repeat(60));
        println!("Import Summary");
        println!("{}", "=".repeat(60));
        println!("Chunks Planned:     {}", self.chunks_planned);
        println!("Chunks Skipped:     {}", self.chunks_skipped);
        println!("Chunk Retries:      {}", self.chunk_retries);
        println!("Samples Fetched:    {}", self.samples_fetched);
        println!("Low Confidence:     {}", self.samples_low_confidence);
        println!("Unmapped Tags:      {}", self.unmapped_tag_samples);
        println!("Records Merged:     {}", self.records_merged);
        println!("Records Upserted:   {}", self.records_inserted);
        println!("Zeros Preserved:    {}", self.zero_values_preserved);
        println!("Current Computed:   {}", self.current_computed);
        println!("Current Rejected:   {}", self.current_rejected);
        println!("Fetch Errors:       {}", self.fetch_errors);
        println!("{}", "-".repeat(60));
        println!("Total Time:         {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));

        if self.records_inserted > 0 && elapsed.as_secs_f64() > 0.0 {
            let rate = self.records_inserted as f64 / elapsed.as_secs_f64();
            println!("Upsert Rate:        {rate:.0} records/sec");
        }

        if !self.per_tag_samples.is_empty() {
            println!("\n{:<24} {:>10} {:>8}", "Tag", "Samples", "Errors");
            println!("{}", "-".repeat(44));
            for (tag, samples) in &self.per_tag_samples {
                let errors = self.per_tag_errors.get(tag).copied().unwrap_or(0);
                println!("{tag:<24} {samples:>10} {errors:>8}");
            }
            for (tag, errors) in &self.per_tag_errors {
                if !self.per_tag_samples.contains_key(tag) {
                    println!("{tag:<24} {:>10} {errors:>8}", 0);
                }
            }
        }

        if !self.field_null_counts.is_empty() {
            println!("\n{:<24} {:>10}", "Field", "Nulls");
            println!("{}", "-".repeat(36));
            for (field, nulls) in &self.field_null_counts {
                println!("{field:<24} {nulls:>10}");
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_sums_counters() {
        let mut run = ImportStats {
            records_inserted: 10,
            chunk_retries: 1,
            ..Default::default()
        };
        let chunk = ImportStats {
            records_inserted: 5,
            chunk_retries: 2,
            fetch_errors: 1,
            ..Default::default()
        };

        run.absorb(chunk);
        assert_eq!(run.records_inserted, 15);
        assert_eq!(run.chunk_retries, 3);
        assert_eq!(run.fetch_errors, 1);
    }

    #[test]
    fn test_absorb_merges_maps() {
        let mut run = ImportStats::default();
        run.per_tag_samples.insert("UNIT1.GEN.MW".to_string(), 100);
        run.field_null_counts.insert("flow_rate", 2);

        let mut chunk = ImportStats::default();
        chunk.per_tag_samples.insert("UNIT1.GEN.MW".to_string(), 50);
        chunk.per_tag_samples.insert("UNIT1.GEN.PF".to_string(), 25);
        chunk.field_null_counts.insert("flow_rate", 3);

        run.absorb(chunk);
        assert_eq!(run.per_tag_samples["UNIT1.GEN.MW"], 150);
        assert_eq!(run.per_tag_samples["UNIT1.GEN.PF"], 25);
        assert_eq!(run.field_null_counts["flow_rate"], 5);
    }
}

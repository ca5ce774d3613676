use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// One bounded time window, processed as a single fetch/validate/persist unit.
/// Half-open: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeChunk {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeChunk {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid import range: start {start} must be before end {end}")]
pub struct InvalidRangeError {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Split `[start, end)` into chunks of `chunk_days`, oldest first. Chunks are
/// contiguous and non-overlapping; the final chunk is truncated to `end`.
pub fn plan_chunks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk_days: i64,
) -> Result<Vec<TimeChunk>, InvalidRangeError> {
    if start >= end {
        return Err(InvalidRangeError { start, end });
    }

    let step = Duration::days(chunk_days.max(1));
    let mut chunks = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let chunk_end = std::cmp::min(cursor + step, end);
        chunks.push(TimeChunk {
            start: cursor,
            end: chunk_end,
        });
        cursor = chunk_end;
    }

    debug!(
        "Planned {} chunks of up to {} days covering {} to {}",
        chunks.len(),
        chunk_days,
        start,
        end
    );

    Ok(chunks)
}

//! The export boundary — numeric cell batches and the sink contract.
//!
//! The core hands a sink rectangular batches keyed by 1-based (row, col)
//! coordinates. It never assumes a column-letter scheme or any sheet
//! addressing; that translation belongs to the sink implementation.
//!
//! RULE: a projected grid is immutable. After a transient sink failure the
//! same batch is re-sent verbatim, so retries can never leave the target in
//! a half-updated state that disagrees with the aggregate.

use crate::{
    aggregate::AggregateMode,
    config::ExportConfig,
    grid::{Ratio, RetentionGrid},
};
use serde::Serialize;
use std::{thread, time::Duration};
use thiserror::Error;

/// A value the sink renders into one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellValue {
    Count(u64),
    /// Whole currency units; fractional cents are not presented.
    Amount(f64),
    Ratio(Ratio),
    /// Header or label text supplied by the caller.
    Text(String),
}

/// One contiguous horizontal run of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellUpdate {
    pub row:    u32,
    pub col:    u32,
    pub values: Vec<CellValue>,
}

/// The rectangle a sink should wipe before a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClearRegion {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row:  u32,
    pub last_col:  u32,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Transient sink failure: {0}")]
    Transient(String),

    #[error("Sink failure: {0}")]
    Fatal(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// The contract every export target must fulfill.
pub trait GridSink {
    /// Wipe a previously written region. Called once before `write`.
    fn clear(&mut self, region: ClearRegion) -> Result<(), SinkError>;

    /// Write a batch of cell runs. The batch is immutable; callers re-send
    /// it verbatim after a transient failure.
    fn write(&mut self, updates: &[CellUpdate]) -> Result<(), SinkError>;
}

/// Column width of one cohort block: count + ratio, plus an amount column
/// in amount-tracking mode.
pub fn columns_per_cohort(mode: AggregateMode) -> u32 {
    if mode.tracks_amount() {
        3
    } else {
        2
    }
}

/// Translate a grid into cell runs: one column group per cohort in grid
/// order, one row per offset starting at `export.start_row`.
pub fn layout_updates(grid: &RetentionGrid, export: &ExportConfig) -> Vec<CellUpdate> {
    let width = columns_per_cohort(grid.mode);
    let mut updates = Vec::new();

    for (i, cohort) in grid.cohorts.iter().enumerate() {
        let base_col = export.first_col + i as u32 * width;
        for row in &cohort.rows {
            let mut values = vec![CellValue::Count(row.count), CellValue::Ratio(row.ratio)];
            if let Some(amount) = row.amount {
                values.push(CellValue::Amount(amount.round()));
            }
            updates.push(CellUpdate {
                row: export.start_row + row.offset,
                col: base_col,
                values,
            });
        }
    }

    updates
}

/// Region covering everything a previous run may have written, padded a few
/// rows past the tallest cohort so a shrinking grid leaves no stale rows.
/// None when the grid is empty — nothing was written, nothing to clear.
pub fn clear_region(
    grid: &RetentionGrid,
    export: &ExportConfig,
    pad_rows: u32,
) -> Option<ClearRegion> {
    let global_max = grid.global_max_offset()?;
    let width = columns_per_cohort(grid.mode);
    Some(ClearRegion {
        first_row: export.start_row,
        first_col: export.first_col,
        last_row:  export.start_row + global_max + pad_rows,
        last_col:  export.first_col + grid.cohorts.len() as u32 * width - 1,
    })
}

/// Bounded-retry wrapper around any sink. Transient failures are retried
/// with a fixed backoff; fatal errors and exhausted retries propagate.
pub struct RetrySink<S: GridSink> {
    inner:    S,
    attempts: u32,
    backoff:  Duration,
}

impl<S: GridSink> RetrySink<S> {
    pub fn new(inner: S, export: &ExportConfig) -> Self {
        Self {
            inner,
            attempts: export.retry_attempts.max(1),
            backoff: Duration::from_secs(export.retry_backoff_secs),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn with_retry<T>(
        &mut self,
        mut op: impl FnMut(&mut S) -> Result<T, SinkError>,
    ) -> Result<T, SinkError> {
        let mut attempt = 1;
        loop {
            match op(&mut self.inner) {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    log::warn!(
                        "sink: transient failure (attempt {attempt}/{}): {e}; retrying in {:?}",
                        self.attempts,
                        self.backoff,
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<S: GridSink> GridSink for RetrySink<S> {
    fn clear(&mut self, region: ClearRegion) -> Result<(), SinkError> {
        self.with_retry(|s| s.clear(region))
    }

    fn write(&mut self, updates: &[CellUpdate]) -> Result<(), SinkError> {
        self.with_retry(|s| s.write(updates))
    }
}

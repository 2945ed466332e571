use retention_core::{
    aggregate::AggregateMode,
    config::ExportConfig,
    grid::{CohortBlock, GridRow, Ratio, RetentionGrid},
    period::Period,
    sink::{
        clear_region, columns_per_cohort, layout_updates, CellUpdate, CellValue, ClearRegion,
        GridSink, RetrySink, SinkError,
    },
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn export() -> ExportConfig {
    ExportConfig {
        start_row:          4,
        first_col:          2,
        retry_attempts:     3,
        retry_backoff_secs: 0,
    }
}

fn row(offset: u32, count: u64, amount: Option<f64>) -> GridRow {
    let ratio = if offset == 0 {
        Ratio::Base
    } else {
        Ratio::OfBase { value: count, base: 1 }
    };
    GridRow {
        offset,
        count,
        amount,
        ratio,
    }
}

fn two_cohort_grid(mode: AggregateMode) -> RetentionGrid {
    let amount = mode.tracks_amount().then_some(10.4);
    RetentionGrid {
        mode,
        cohorts: vec![
            CohortBlock {
                start: Period::new(2024, 1),
                rows:  vec![row(0, 1, amount), row(1, 1, amount)],
            },
            CohortBlock {
                start: Period::new(2024, 2),
                rows:  vec![row(0, 2, amount)],
            },
        ],
    }
}

/// A sink that fails transiently a configurable number of times before
/// succeeding, recording every attempt.
#[derive(Default)]
struct FlakySink {
    failures_left: u32,
    fatal:         bool,
    writes:        u32,
    attempts:      u32,
}

impl GridSink for FlakySink {
    fn clear(&mut self, _region: ClearRegion) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, _updates: &[CellUpdate]) -> Result<(), SinkError> {
        self.attempts += 1;
        if self.fatal {
            return Err(SinkError::Fatal("broken pipe".into()));
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SinkError::Transient("503 service unavailable".into()));
        }
        self.writes += 1;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Amount-tracking grids lay out three columns per cohort (count, ratio,
/// amount); cohort column groups advance by that width.
#[test]
fn amount_grids_use_three_column_groups() {
    let grid = two_cohort_grid(AggregateMode::CountAndAmount);
    let updates = layout_updates(&grid, &export());

    assert_eq!(columns_per_cohort(grid.mode), 3);
    assert_eq!(updates.len(), 3);

    // First cohort at column 2, rows 4 and 5.
    assert_eq!((updates[0].row, updates[0].col), (4, 2));
    assert_eq!((updates[1].row, updates[1].col), (5, 2));
    // Second cohort starts one width over.
    assert_eq!((updates[2].row, updates[2].col), (4, 5));

    assert_eq!(updates[0].values.len(), 3);
    assert_eq!(updates[0].values[0], CellValue::Count(1));
    assert_eq!(updates[0].values[1], CellValue::Ratio(Ratio::Base));
    // Amounts are rounded to whole currency units at the boundary.
    assert_eq!(updates[0].values[2], CellValue::Amount(10.0));
}

/// Headcount grids lay out two columns per cohort and carry no amounts.
#[test]
fn headcount_grids_use_two_column_groups() {
    let grid = two_cohort_grid(AggregateMode::UniqueEntities);
    let updates = layout_updates(&grid, &export());

    assert_eq!(columns_per_cohort(grid.mode), 2);
    assert_eq!((updates[2].row, updates[2].col), (4, 4));
    assert_eq!(updates[0].values.len(), 2);
}

/// The clear region spans every cohort column group and pads past the
/// tallest cohort; an empty grid clears nothing.
#[test]
fn clear_region_covers_written_rectangle() {
    let grid = two_cohort_grid(AggregateMode::CountAndAmount);
    let region = clear_region(&grid, &export(), 5).unwrap();

    assert_eq!(region.first_row, 4);
    assert_eq!(region.first_col, 2);
    // global max offset 1 + pad 5.
    assert_eq!(region.last_row, 4 + 1 + 5);
    // 2 cohorts × width 3, inclusive.
    assert_eq!(region.last_col, 2 + 2 * 3 - 1);

    let empty = RetentionGrid {
        mode:    AggregateMode::CountAndAmount,
        cohorts: Vec::new(),
    };
    assert!(clear_region(&empty, &export(), 5).is_none());
}

/// Transient failures are retried up to the configured attempts; the write
/// eventually lands and earlier failures leave no partial state behind.
#[test]
fn retry_sink_retries_transient_failures() {
    let flaky = FlakySink {
        failures_left: 2,
        ..Default::default()
    };
    let mut sink = RetrySink::new(flaky, &export());

    let updates = layout_updates(&two_cohort_grid(AggregateMode::UniqueEntities), &export());
    sink.write(&updates).unwrap();

    let inner = sink.into_inner();
    assert_eq!(inner.attempts, 3);
    assert_eq!(inner.writes, 1);
}

/// Once attempts are exhausted the transient error propagates.
#[test]
fn retry_sink_gives_up_after_bounded_attempts() {
    let flaky = FlakySink {
        failures_left: 10,
        ..Default::default()
    };
    let mut sink = RetrySink::new(flaky, &export());

    let err = sink.write(&[]).unwrap_err();
    assert!(err.is_transient());
    assert_eq!(sink.into_inner().attempts, 3);
}

/// Fatal errors are not retried.
#[test]
fn retry_sink_does_not_retry_fatal_errors() {
    let flaky = FlakySink {
        fatal: true,
        ..Default::default()
    };
    let mut sink = RetrySink::new(flaky, &export());

    let err = sink.write(&[]).unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(sink.into_inner().attempts, 1);
}

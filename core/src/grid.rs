//! Grid projection — the ragged, ratio-annotated cohort matrix.
//!
//! RULES:
//!   - Cohorts appear in ascending start-period order.
//!   - Each cohort's row extent is its OWN max observed offset. A cohort
//!     two months old never grows rows because an older cohort reached
//!     offset 30.
//!   - Gaps inside a cohort's timeline are zero-filled so its rows stay
//!     contiguous.
//!   - A cohort with a zero offset-zero base cannot report percentages and
//!     is omitted from the projection.

use crate::{
    aggregate::{AggregateMode, CohortAggregate},
    period::Period,
};
use serde::{Deserialize, Serialize};

/// Retention at one offset, relative to the cohort's own base.
///
/// Kept symbolic — the raw value and base, not a precomputed float — so a
/// sink can render a live formula and tests can assert exact equality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ratio {
    /// Offset zero: 100% by definition.
    Base,
    /// Count at this offset over the cohort's count at offset zero.
    OfBase { value: u64, base: u64 },
}

impl Ratio {
    pub fn as_f64(&self) -> f64 {
        match self {
            Ratio::Base => 1.0,
            Ratio::OfBase { value, base } => *value as f64 / *base as f64,
        }
    }
}

/// One projected row: a cohort observed `offset` months after its start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub offset: u32,
    pub count:  u64,
    /// Present only in amount-tracking mode.
    pub amount: Option<f64>,
    pub ratio:  Ratio,
}

/// One cohort's contiguous rows, offset 0 through the cohort's own horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortBlock {
    pub start: Period,
    pub rows:  Vec<GridRow>,
}

impl CohortBlock {
    /// The cohort's own horizon. Rows are never empty: the base row always
    /// exists for a projected cohort.
    pub fn max_offset(&self) -> u32 {
        (self.rows.len() as u32).saturating_sub(1)
    }

    pub fn base(&self) -> &GridRow {
        &self.rows[0]
    }
}

/// The full projection for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionGrid {
    pub mode:    AggregateMode,
    pub cohorts: Vec<CohortBlock>,
}

impl RetentionGrid {
    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    /// Largest offset across all cohorts. Drives how much of an existing
    /// sheet must be cleared before a rewrite.
    pub fn global_max_offset(&self) -> Option<u32> {
        self.cohorts.iter().map(|c| c.max_offset()).max()
    }
}

pub fn project(aggregate: &CohortAggregate, mode: AggregateMode) -> RetentionGrid {
    let mut cohorts = Vec::with_capacity(aggregate.len());

    for (start, cells) in aggregate {
        let base = cells.get(&0).copied().unwrap_or_default();
        if base.count == 0 {
            log::warn!("grid: cohort {start} has no offset-zero base, omitting");
            continue;
        }

        // Last key of the ascending map is the cohort's own horizon.
        let cohort_max = cells.keys().next_back().copied().unwrap_or(0);

        let mut rows = Vec::with_capacity(cohort_max as usize + 1);
        for offset in 0..=cohort_max {
            let cell = cells.get(&offset).copied().unwrap_or_default();
            let ratio = if offset == 0 {
                Ratio::Base
            } else {
                Ratio::OfBase {
                    value: cell.count,
                    base:  base.count,
                }
            };
            rows.push(GridRow {
                offset,
                count: cell.count,
                amount: mode.tracks_amount().then_some(cell.amount),
                ratio,
            });
        }

        cohorts.push(CohortBlock { start: *start, rows });
    }

    RetentionGrid { mode, cohorts }
}

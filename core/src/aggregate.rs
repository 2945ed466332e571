//! Retention aggregation — the sparse (start period, offset) matrix.
//!
//! One pure fold over the assigned payments; the returned aggregate is
//! immutable from the caller's point of view. Two modes:
//!   - CountAndAmount: every payment adds one to the cell count and its
//!     amount to the cell sum.
//!   - UniqueEntities: a cell counts DISTINCT entity keys. An entity paying
//!     twice in one offset-month is one retained entity, not two.

use crate::{cohort::AssignedPayment, period::Period};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMode {
    CountAndAmount,
    UniqueEntities,
}

impl AggregateMode {
    /// Whether projected rows carry a monetary sum.
    pub fn tracks_amount(&self) -> bool {
        matches!(self, AggregateMode::CountAndAmount)
    }
}

/// One (start period, offset) cell. Mutated only by accumulation during the
/// fold, never overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateCell {
    pub count:  u64,
    pub amount: f64,
}

/// Sparse aggregate: start period → offset → cell. BTreeMaps keep both axes
/// ascending, which makes projection order and serialization stable.
pub type CohortAggregate = BTreeMap<Period, BTreeMap<u32, AggregateCell>>;

pub fn aggregate(assigned: &[AssignedPayment], mode: AggregateMode) -> CohortAggregate {
    match mode {
        AggregateMode::CountAndAmount => fold_counts(assigned),
        AggregateMode::UniqueEntities => fold_unique(assigned),
    }
}

fn fold_counts(assigned: &[AssignedPayment]) -> CohortAggregate {
    let mut agg = CohortAggregate::new();
    for a in assigned {
        let cell = agg
            .entry(a.start)
            .or_default()
            .entry(a.offset)
            .or_default();
        cell.count += 1;
        cell.amount += a.amount;
    }
    agg
}

fn fold_unique(assigned: &[AssignedPayment]) -> CohortAggregate {
    let mut seen: BTreeMap<Period, BTreeMap<u32, HashSet<i64>>> = BTreeMap::new();
    for a in assigned {
        seen.entry(a.start)
            .or_default()
            .entry(a.offset)
            .or_default()
            .insert(a.key);
    }
    seen.into_iter()
        .map(|(start, offsets)| {
            let cells = offsets
                .into_iter()
                .map(|(offset, ids)| {
                    (
                        offset,
                        AggregateCell {
                            count:  ids.len() as u64,
                            amount: 0.0,
                        },
                    )
                })
                .collect();
            (start, cells)
        })
        .collect()
}

//! The retention pipeline — normalize, assign, aggregate, project.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Normalize each feed once; both are shared across variants.
//!   2. Per variant: first qualifying period per entity, then offset
//!      assignment.
//!   3. Per variant: pure fold into the sparse aggregate.
//!   4. Per variant: ragged grid projection.
//!
//! RULES:
//!   - The engine owns no state between runs. Every run recomputes the
//!     full history from the feed; durability is the sink's problem.
//!   - Nothing here reads the wall clock. `as_of` is an input, which keeps
//!     runs reproducible.

use crate::{
    aggregate::aggregate,
    cohort::{assign, first_periods},
    config::{FeedScope, RetentionConfig, VariantConfig},
    error::RetentionResult,
    feed::{normalize, DropStats, Payment, RawPayment},
    grid::{project, RetentionGrid},
    period::Period,
    types::RunId,
};
use serde::Serialize;

/// Both slices of the payment feed, as loaded by the store or an import.
#[derive(Debug, Clone, Default)]
pub struct FeedBundle {
    pub recurring: Vec<RawPayment>,
    pub all:       Vec<RawPayment>,
}

/// Per-variant outcome: the grid plus the counts the summary reports.
#[derive(Debug, Clone, Serialize)]
pub struct VariantOutcome {
    pub name:       String,
    /// Rows that landed in a cohort cell.
    pub in_scope:   usize,
    /// Rows excluded because their entity never qualified.
    pub no_cohort:  usize,
    /// Rows excluded for predating their entity's start period.
    pub pre_cohort: usize,
    pub grid:       RetentionGrid,
}

impl VariantOutcome {
    /// True when the variant has nothing to publish — an empty feed or only
    /// degenerate cohorts. Distinct from a grid that retained zero entities
    /// at later offsets.
    pub fn is_no_data(&self) -> bool {
        self.grid.is_empty()
    }
}

/// The result of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub run_id:          RunId,
    pub as_of:           Period,
    pub recurring_rows:  usize,
    pub all_rows:        usize,
    pub recurring_drops: DropStats,
    pub all_drops:       DropStats,
    pub variants:        Vec<VariantOutcome>,
}

pub struct RetentionEngine {
    config: RetentionConfig,
}

impl RetentionEngine {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run the full batch: every configured variant over the given feeds.
    pub fn run(&self, feeds: &FeedBundle, as_of: Period) -> RetentionResult<RetentionReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "run {run_id}: {} recurring rows, {} total rows, as_of {as_of}",
            feeds.recurring.len(),
            feeds.all.len(),
        );

        let (recurring, recurring_drops) = normalize(&feeds.recurring, as_of);
        let (all, all_drops) = normalize(&feeds.all, as_of);

        let mut variants = Vec::with_capacity(self.config.variants.len());
        for variant in &self.config.variants {
            let payments: &[Payment] = match variant.feed {
                FeedScope::Recurring => &recurring,
                FeedScope::All => &all,
            };
            let outcome = run_variant(variant, payments);
            if outcome.is_no_data() {
                log::warn!("run {run_id}: variant '{}' produced no data", outcome.name);
            } else {
                log::info!(
                    "run {run_id}: variant '{}' -> {} cohorts, {} rows in scope",
                    outcome.name,
                    outcome.grid.cohorts.len(),
                    outcome.in_scope,
                );
            }
            variants.push(outcome);
        }

        Ok(RetentionReport {
            run_id,
            as_of,
            recurring_rows: feeds.recurring.len(),
            all_rows: feeds.all.len(),
            recurring_drops,
            all_drops,
            variants,
        })
    }
}

fn run_variant(variant: &VariantConfig, payments: &[Payment]) -> VariantOutcome {
    let starts = first_periods(payments, variant.key_by, &variant.qualifying);
    let assignment = assign(payments, variant.key_by, &starts);
    let agg = aggregate(&assignment.assigned, variant.mode);
    let grid = project(&agg, variant.mode);

    VariantOutcome {
        name:       variant.name.clone(),
        in_scope:   assignment.assigned.len(),
        no_cohort:  assignment.no_cohort,
        pre_cohort: assignment.pre_cohort,
        grid,
    }
}

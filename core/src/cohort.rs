//! Cohort assignment — first qualifying period per entity, an offset per
//! payment.
//!
//! RULES:
//!   - An entity's start period is the minimum period among its QUALIFYING
//!     payments. No qualifying payment, no cohort: the entity's rows are
//!     excluded entirely, never parked in a default cohort.
//!   - Offsets are non-negative. A payment dated before its entity's first
//!     qualifying event is excluded — it means a non-qualifying payment was
//!     recorded before the qualifying one. Policy, not an error.

use crate::{category::CategorySet, feed::Payment, period::Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which identity a variant groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBy {
    Subscription,
    Supporter,
}

impl KeyBy {
    /// Entity key for `payment`, or None when the payment cannot carry one
    /// (a subscription-keyed variant seeing a subscription-less payment).
    pub fn key_of(&self, payment: &Payment) -> Option<i64> {
        match self {
            KeyBy::Subscription => payment.subscription_id,
            KeyBy::Supporter    => Some(payment.supporter_id),
        }
    }
}

/// A payment resolved against its entity's cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedPayment {
    pub key:    i64,
    pub start:  Period,
    pub offset: u32,
    pub amount: f64,
}

/// Outcome of an assignment pass, with excluded-row tallies for the run
/// summary.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub assigned:   Vec<AssignedPayment>,
    /// Payments whose entity never qualified (or carried no key).
    pub no_cohort:  usize,
    /// Payments predating their entity's start period (negative offset).
    pub pre_cohort: usize,
}

/// Minimum qualifying period per entity key.
pub fn first_periods(
    payments: &[Payment],
    key_by: KeyBy,
    qualifying: &CategorySet,
) -> BTreeMap<i64, Period> {
    let mut starts: BTreeMap<i64, Period> = BTreeMap::new();
    for p in payments {
        if !qualifying.contains(p.payment_type) {
            continue;
        }
        let Some(key) = key_by.key_of(p) else { continue };
        starts
            .entry(key)
            .and_modify(|s| {
                if p.period < *s {
                    *s = p.period;
                }
            })
            .or_insert(p.period);
    }
    starts
}

/// Resolve every payment against `starts`. Payments without a start period
/// or with a negative offset are excluded and tallied.
pub fn assign(
    payments: &[Payment],
    key_by: KeyBy,
    starts: &BTreeMap<i64, Period>,
) -> Assignment {
    let mut out = Assignment::default();

    for p in payments {
        let Some(key) = key_by.key_of(p) else {
            out.no_cohort += 1;
            continue;
        };
        let Some(start) = starts.get(&key) else {
            out.no_cohort += 1;
            continue;
        };
        let offset = p.period.months_since(*start);
        if offset < 0 {
            out.pre_cohort += 1;
            continue;
        }
        out.assigned.push(AssignedPayment {
            key,
            start: *start,
            offset: offset as u32,
            amount: p.amount,
        });
    }

    out
}

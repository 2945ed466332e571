//! Payment feed normalization.
//!
//! Raw rows arrive loosely typed: dates as text, amounts nullable. This
//! module:
//!   1. Parses payment dates; rows with unparseable dates are dropped.
//!   2. Coerces missing or invalid amounts to 0.0.
//!   3. Excludes the current (incomplete) month and anything after it.
//!
//! RULE: input inconsistencies are tallied and logged, never fatal.
//! Upstream exports are expected to carry minor defects.

use crate::{
    category::PaymentType,
    period::Period,
    types::{SubscriptionId, SupporterId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A payment row as it leaves the store or a CSV import, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayment {
    pub supporter_id:    SupporterId,
    pub payment_type:    PaymentType,
    pub subscription_id: Option<SubscriptionId>,
    pub payment_date:    String,
    pub amount:          Option<f64>,
}

/// A validated payment with its month period resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub supporter_id:    SupporterId,
    pub payment_type:    PaymentType,
    pub subscription_id: Option<SubscriptionId>,
    pub date:            NaiveDate,
    pub period:          Period,
    pub amount:          f64,
}

/// Rows removed or coerced during normalization, reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    pub bad_dates:       usize,
    pub coerced_amounts: usize,
    pub out_of_window:   usize,
}

/// Dates arrive bare or with a time component, depending on the column type
/// of the upstream export.
fn parse_payment_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Validate and coerce a raw feed into canonical payments.
///
/// `as_of` is the first period NOT yet complete — normally the current
/// month. Payments in or after it are excluded: the month is still
/// collecting payments, and including it would understate every cohort's
/// newest offset.
pub fn normalize(rows: &[RawPayment], as_of: Period) -> (Vec<Payment>, DropStats) {
    let mut stats = DropStats::default();
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(date) = parse_payment_date(&row.payment_date) else {
            stats.bad_dates += 1;
            continue;
        };
        let period = Period::from_date(date);
        if period >= as_of {
            stats.out_of_window += 1;
            continue;
        }
        let amount = match row.amount {
            Some(a) if a.is_finite() && a >= 0.0 => a,
            _ => {
                stats.coerced_amounts += 1;
                0.0
            }
        };
        out.push(Payment {
            supporter_id:    row.supporter_id,
            payment_type:    row.payment_type,
            subscription_id: row.subscription_id,
            date,
            period,
            amount,
        });
    }

    if stats.bad_dates > 0 {
        log::warn!(
            "normalize: dropped {} rows with unparseable payment dates",
            stats.bad_dates
        );
    }
    if stats.coerced_amounts > 0 {
        log::debug!(
            "normalize: coerced {} missing or invalid amounts to 0",
            stats.coerced_amounts
        );
    }

    (out, stats)
}

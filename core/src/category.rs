//! Payment type codes and the category sets that drive cohort eligibility.
//!
//! Codes are opaque integers assigned by the upstream payment platform.
//! Which codes count as recurring, one-time, or acquisition is
//! configuration, not logic — see config.rs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A payment type code as assigned by the upstream payment platform.
pub type PaymentType = i64;

/// An ordered set of payment type codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet(BTreeSet<PaymentType>);

impl CategorySet {
    pub fn new(codes: impl IntoIterator<Item = PaymentType>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn contains(&self, code: PaymentType) -> bool {
        self.0.contains(&code)
    }

    pub fn union(&self, other: &CategorySet) -> CategorySet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = PaymentType> + '_ {
        self.0.iter().copied()
    }

    /// Comma-joined codes for an SQL IN list, e.g. "26,45,53".
    /// Codes are numeric and config-owned, never user input.
    pub fn sql_list(&self) -> String {
        self.0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

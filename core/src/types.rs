//! Shared primitive types used across the retention pipeline.

/// A supporter (donor) identity as issued by the payment platform.
pub type SupporterId = i64;

/// A recurring-subscription identity. Payments made outside a subscription
/// carry none.
pub type SubscriptionId = i64;

/// The canonical identifier for one batch run.
pub type RunId = String;

//! retention-core — cohort-retention matrices over a donation payment feed.
//!
//! Pipeline: feed → normalize → cohort assignment → aggregation → ragged
//! grid projection → sink batches. Every invocation is a full-history batch
//! recomputation; the crate owns no durable state between runs.

pub mod aggregate;
pub mod category;
pub mod cohort;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod grid;
pub mod period;
pub mod sink;
pub mod store;
pub mod types;

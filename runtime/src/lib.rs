//! # Studio Runtime
//!
//! Execution helpers shared by the booking services:
//!
//! - **Retry**: a bounded retry combinator with capped exponential backoff,
//!   used to re-run transactions that lost a write race
//! - **Metrics**: the Prometheus exporter bootstrap and retry counters

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};

//! # Studio Testing
//!
//! Testing utilities for the studio booking platform.
//!
//! This crate provides:
//! - [`InMemoryBookingStore`]: serialized in-memory store with commit-conflict
//!   injection
//! - [`FixedClock`] / [`ManualClock`]: deterministic time
//! - [`MockPaymentGateway`]: scriptable gateway that records payment intents
//! - [`RecordingReconciliation`]: keeps reconciliation entries for assertions
//! - [`fixtures`] and [`properties`]: test data builders and proptest strategies
//!
//! ## Example
//!
//! ```
//! use studio_testing::{InMemoryBookingStore, fixtures};
//! use chrono::Duration;
//!
//! # async fn example() {
//! let store = InMemoryBookingStore::new();
//! let session = fixtures::session(fixtures::t0() + Duration::days(1), 10);
//! store.put_session(session.clone()).await;
//!
//! assert_eq!(store.session(session.id).await.map(|s| s.reserved_count), Some(0));
//! # }
//! ```

pub mod fixtures;
pub mod gateway;
pub mod mocks;
pub mod properties;
pub mod reconciliation;
pub mod store;

// Re-export commonly used items
pub use gateway::MockPaymentGateway;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reconciliation::RecordingReconciliation;
pub use store::{BookingState, InMemoryBookingStore, InMemoryTx};

//! `PostgreSQL` booking store for the studio booking platform.
//!
//! This crate implements the `BookingStore` / `BookingTx` contract from
//! `studio-core` on top of sqlx:
//!
//! - Schema migrations (`migrations/`)
//! - Row-locking, conditional counter updates and per-user advisory locks
//! - Classification of serialization failures, deadlocks and unique
//!   violations as retryable write conflicts
//!
//! # Example
//!
//! ```no_run
//! use studio_postgres::{PostgresBookingStore, PostgresConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresBookingStore::connect(&PostgresConfig::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod store;

pub use store::{PostgresBookingStore, PostgresConfig, PostgresTx};

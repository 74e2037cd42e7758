//! Builders for test data.

use chrono::{DateTime, Utc};
use studio_core::types::{
    ClassSession, ClassType, ClassTypeId, Money, Package, PackageId, Purchase, UserId,
};

/// Class type used by [`session`]
pub const DEFAULT_CLASS_TYPE: &str = "reformer";

/// Reference instant for tests: 2025-01-01T00:00:00Z
#[must_use]
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

/// A package priced at 150.00 per credit
#[must_use]
pub fn package(id: &str, credit_count: u32, valid_days: u32) -> Package {
    Package {
        id: PackageId::new(id),
        name: format!("{credit_count} classes"),
        credit_count,
        valid_days,
        price: Money::from_cents(u64::from(credit_count) * 15_000),
    }
}

/// The default class type
#[must_use]
pub fn class_type() -> ClassType {
    ClassType {
        id: ClassTypeId::new(DEFAULT_CLASS_TYPE),
        name: "Reformer".to_string(),
        level: Some("Beginner".to_string()),
        default_capacity: 8,
    }
}

/// An empty session of the default class type
#[must_use]
pub fn session(starts_at: DateTime<Utc>, capacity: u32) -> ClassSession {
    ClassSession::new(ClassTypeId::new(DEFAULT_CLASS_TYPE), starts_at, capacity)
}

/// A fresh, unpaid purchase of `package` by `user_id`
#[must_use]
pub fn purchase(user_id: UserId, package: &Package, bought_at: DateTime<Utc>) -> Purchase {
    Purchase::from_package(user_id, package, bought_at, None)
}

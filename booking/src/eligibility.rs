//! Package purchase eligibility.
//!
//! One rule decides whether a user may buy another package. It is applied
//! identically by `create_purchase`, `can_purchase` and package checkout.

use crate::config::PurchaseRules;
use chrono::{DateTime, Utc};
use serde::Serialize;
use studio_core::types::{Package, Purchase};

/// Why a purchase is or is not allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    /// The user holds no active package
    NoActivePackage,
    /// Several active packages are allowed
    MultipleActiveAllowed,
    /// The active package is almost used up
    LowCredits,
    /// The active package is about to expire
    NearExpiry,
    /// The user already holds an active package
    ActivePackage,
}

/// Result of the purchase eligibility rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    /// Whether a new package may be bought
    pub eligible: bool,
    /// Which clause decided
    pub reason: EligibilityReason,
    /// The user's current active purchase, if any
    pub active_purchase: Option<Purchase>,
}

/// Decides whether a user holding `active` may buy another package.
///
/// `package` is the catalog entry of the active purchase; without it the
/// low-credits clause cannot be evaluated and is skipped.
///
/// 1. no active purchase: eligible
/// 2. multiple active packages allowed: eligible
/// 3. credits left below the configured percentage: eligible
/// 4. fewer whole days to expiry than configured: eligible
/// 5. otherwise not eligible
#[must_use]
pub fn purchase_eligibility(
    active: Option<Purchase>,
    package: Option<&Package>,
    now: DateTime<Utc>,
    rules: &PurchaseRules,
) -> Eligibility {
    let Some(purchase) = active else {
        return Eligibility {
            eligible: true,
            reason: EligibilityReason::NoActivePackage,
            active_purchase: None,
        };
    };

    let reason = if rules.allow_multiple_active {
        EligibilityReason::MultipleActiveAllowed
    } else if is_low_on_credits(&purchase, package, rules) {
        EligibilityReason::LowCredits
    } else if rules
        .near_expiry_threshold_days
        .is_some_and(|days| purchase.days_until_expiry(now) < i64::from(days))
    {
        EligibilityReason::NearExpiry
    } else {
        EligibilityReason::ActivePackage
    };

    Eligibility {
        eligible: reason != EligibilityReason::ActivePackage,
        reason,
        active_purchase: Some(purchase),
    }
}

fn is_low_on_credits(purchase: &Purchase, package: Option<&Package>, rules: &PurchaseRules) -> bool {
    match (rules.low_credits_threshold_percent, package) {
        (Some(percent), Some(package)) => {
            u64::from(purchase.credits_left) * 100
                < u64::from(percent) * u64::from(package.credit_count)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use studio_core::types::UserId;
    use studio_testing::fixtures;

    fn active_purchase(credits_left: u32, days_left: i64) -> (Purchase, Package) {
        let package = fixtures::package("pkg-10", 10, 30);
        let mut purchase = fixtures::purchase(UserId::new(), &package, fixtures::t0());
        purchase.credits_left = credits_left;
        purchase.expires_at = fixtures::t0() + Duration::days(days_left);
        (purchase, package)
    }

    #[test]
    fn no_active_purchase_is_eligible() {
        let result = purchase_eligibility(None, None, fixtures::t0(), &PurchaseRules::default());
        assert!(result.eligible);
        assert_eq!(result.reason, EligibilityReason::NoActivePackage);
    }

    #[test]
    fn default_rules_block_any_active_purchase() {
        let (purchase, package) = active_purchase(1, 1);
        let result = purchase_eligibility(
            Some(purchase.clone()),
            Some(&package),
            fixtures::t0(),
            &PurchaseRules::default(),
        );

        assert!(!result.eligible);
        assert_eq!(result.reason, EligibilityReason::ActivePackage);
        assert_eq!(result.active_purchase, Some(purchase));
    }

    #[test]
    fn multiple_active_allowed() {
        let (purchase, package) = active_purchase(5, 20);
        let rules = PurchaseRules {
            allow_multiple_active: true,
            ..PurchaseRules::default()
        };

        let result = purchase_eligibility(Some(purchase), Some(&package), fixtures::t0(), &rules);
        assert!(result.eligible);
        assert_eq!(result.reason, EligibilityReason::MultipleActiveAllowed);
    }

    #[test]
    fn low_credits_threshold_is_strict() {
        let rules = PurchaseRules {
            low_credits_threshold_percent: Some(20),
            ..PurchaseRules::default()
        };

        // 1 of 10 is 10%, below 20%
        let (purchase, package) = active_purchase(1, 20);
        let result = purchase_eligibility(Some(purchase), Some(&package), fixtures::t0(), &rules);
        assert_eq!(result.reason, EligibilityReason::LowCredits);

        // 2 of 10 is exactly 20%
        let (purchase, package) = active_purchase(2, 20);
        let result = purchase_eligibility(Some(purchase), Some(&package), fixtures::t0(), &rules);
        assert!(!result.eligible);
    }

    #[test]
    fn low_credits_needs_the_package() {
        let rules = PurchaseRules {
            low_credits_threshold_percent: Some(50),
            ..PurchaseRules::default()
        };
        let (purchase, _) = active_purchase(1, 20);

        let result = purchase_eligibility(Some(purchase), None, fixtures::t0(), &rules);
        assert!(!result.eligible);
    }

    #[test]
    fn near_expiry_threshold() {
        let rules = PurchaseRules {
            near_expiry_threshold_days: Some(7),
            ..PurchaseRules::default()
        };

        let (purchase, package) = active_purchase(5, 6);
        let result = purchase_eligibility(Some(purchase), Some(&package), fixtures::t0(), &rules);
        assert_eq!(result.reason, EligibilityReason::NearExpiry);

        let (purchase, package) = active_purchase(5, 7);
        let result = purchase_eligibility(Some(purchase), Some(&package), fixtures::t0(), &rules);
        assert!(!result.eligible);
    }
}

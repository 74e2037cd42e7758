//! Purchase engine: package purchases and the one-active-package rule.

use crate::config::PurchaseRules;
use crate::eligibility::{Eligibility, purchase_eligibility};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use studio_core::environment::Clock;
use studio_core::error::{BookingError, ErrorKind};
use studio_core::store::{BookingStore, BookingTx};
use studio_core::types::{
    Caller, ExternalPaymentId, Package, PackageId, Purchase, PurchaseId, UserId,
};
use studio_runtime::{RetryPolicy, retry_with_predicate};

/// Per-call overrides of the purchase rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurchaseOptions {
    /// Allow a second active package for this purchase only
    pub allow_multiple_active: bool,
    /// Do not look at the user's active packages at all
    pub skip_active_check: bool,
}

/// Result of [`PurchaseEngine::create_purchase`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseOutcome {
    /// The purchase, new or pre-existing
    pub purchase: Purchase,
    /// The payment had already produced this purchase; nothing was written
    pub already_processed: bool,
}

/// Creates and expires package purchases.
pub struct PurchaseEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    rules: PurchaseRules,
    retry: RetryPolicy,
}

impl<S: BookingStore> PurchaseEngine<S> {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        rules: PurchaseRules,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            rules,
            retry,
        }
    }

    /// Rules this engine applies
    #[must_use]
    pub const fn rules(&self) -> &PurchaseRules {
        &self.rules
    }

    /// Creates a purchase of `package_id` for `user_id`.
    ///
    /// A payment id that already paid for a purchase returns that purchase
    /// with `already_processed` set. The active-package check and the insert
    /// run in one transaction that holds the user's lock, so two concurrent
    /// calls cannot both pass the check.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AlreadyActivePackage`] when the eligibility rule
    ///   refuses the purchase
    /// - [`BookingError::PackageNotFound`] for an unknown package
    /// - transient store errors once the retry budget is used up
    #[tracing::instrument(skip_all, fields(user_id = %user_id, package_id = %package_id))]
    pub async fn create_purchase(
        &self,
        user_id: UserId,
        package_id: &PackageId,
        payment_id: Option<&ExternalPaymentId>,
        options: PurchaseOptions,
    ) -> Result<PurchaseOutcome, BookingError> {
        let result = retry_with_predicate(
            &self.retry,
            "create_purchase",
            || self.try_create_purchase(user_id, package_id, payment_id, options),
            BookingError::is_transient,
        )
        .await;

        match &result {
            Ok(outcome) if outcome.already_processed => {
                metrics::record_purchase("already_processed");
            }
            Ok(outcome) => {
                metrics::record_purchase("created");
                tracing::info!(
                    purchase_id = %outcome.purchase.id,
                    credits = outcome.purchase.credits_left,
                    expires_at = %outcome.purchase.expires_at,
                    "Purchase created"
                );
            }
            Err(err) if err.kind() == ErrorKind::Conflict => metrics::record_purchase("rejected"),
            Err(_) => {}
        }

        result
    }

    async fn try_create_purchase(
        &self,
        user_id: UserId,
        package_id: &PackageId,
        payment_id: Option<&ExternalPaymentId>,
        options: PurchaseOptions,
    ) -> Result<PurchaseOutcome, BookingError> {
        let mut tx = self.store.begin().await?;
        let outcome = create_purchase_in(
            &mut tx,
            &self.rules,
            self.clock.now(),
            user_id,
            package_id,
            payment_id,
            options,
        )
        .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Whether `user_id` may buy a package now.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn can_purchase(&self, user_id: UserId) -> Result<Eligibility, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let active = tx.active_purchase(user_id, now).await?;
        let package = match &active {
            Some(purchase) => tx.package(&purchase.package_id).await?,
            None => None,
        };
        Ok(purchase_eligibility(active, package.as_ref(), now, &self.rules))
    }

    /// Catalog lookup.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn package(&self, package_id: &PackageId) -> Result<Option<Package>, BookingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.package(package_id).await?)
    }

    /// The user's current active purchase, if any.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn active_purchase(&self, user_id: UserId) -> Result<Option<Purchase>, BookingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.active_purchase(user_id, self.clock.now()).await?)
    }

    /// Ends a purchase's validity now. Admin only.
    ///
    /// Expiring an already expired purchase changes nothing.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Forbidden`] unless `caller` is an admin
    /// - [`BookingError::PurchaseNotFound`] for an unknown purchase
    #[tracing::instrument(skip_all, fields(purchase_id = %purchase_id, caller = %caller.user_id))]
    pub async fn expire_purchase(
        &self,
        purchase_id: PurchaseId,
        caller: &Caller,
    ) -> Result<Purchase, BookingError> {
        if !caller.is_admin() {
            return Err(BookingError::Forbidden(
                "only administrators can expire purchases".to_string(),
            ));
        }

        retry_with_predicate(
            &self.retry,
            "expire_purchase",
            || self.try_expire_purchase(purchase_id),
            BookingError::is_transient,
        )
        .await
    }

    async fn try_expire_purchase(&self, purchase_id: PurchaseId) -> Result<Purchase, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut purchase = tx
            .purchase_for_update(purchase_id)
            .await?
            .ok_or(BookingError::PurchaseNotFound(purchase_id))?;

        if purchase.is_expired(now) {
            return Ok(purchase);
        }

        tx.set_purchase_expiry(purchase_id, now).await?;
        tx.commit().await?;

        purchase.expires_at = now;
        metrics::record_purchase("expired");
        tracing::info!("Purchase expired");
        Ok(purchase)
    }
}

/// The purchase check-then-insert sequence, inside a caller-owned transaction.
///
/// Shared by [`PurchaseEngine::create_purchase`] and payment confirmation,
/// which must run its own idempotency check in the same transaction.
pub(crate) async fn create_purchase_in<T: BookingTx>(
    tx: &mut T,
    rules: &PurchaseRules,
    now: DateTime<Utc>,
    user_id: UserId,
    package_id: &PackageId,
    payment_id: Option<&ExternalPaymentId>,
    options: PurchaseOptions,
) -> Result<PurchaseOutcome, BookingError> {
    tx.lock_user(user_id).await?;

    if let Some(payment_id) = payment_id {
        if let Some(existing) = tx.purchase_by_payment(payment_id).await? {
            tracing::debug!(%payment_id, purchase_id = %existing.id, "Payment already processed");
            return Ok(PurchaseOutcome {
                purchase: existing,
                already_processed: true,
            });
        }
    }

    if !options.skip_active_check {
        let rules = PurchaseRules {
            allow_multiple_active: rules.allow_multiple_active || options.allow_multiple_active,
            ..*rules
        };
        if !rules.allow_multiple_active {
            let active = tx.active_purchase(user_id, now).await?;
            let active_package = match &active {
                Some(purchase) => tx.package(&purchase.package_id).await?,
                None => None,
            };
            let eligibility = purchase_eligibility(active, active_package.as_ref(), now, &rules);
            if let (false, Some(purchase)) = (eligibility.eligible, eligibility.active_purchase) {
                return Err(BookingError::AlreadyActivePackage(Box::new(purchase)));
            }
        }
    }

    let package = tx
        .package(package_id)
        .await?
        .ok_or_else(|| BookingError::PackageNotFound(package_id.clone()))?;

    let purchase = Purchase::from_package(user_id, &package, now, payment_id.cloned());
    tx.insert_purchase(&purchase).await?;
    if let Some(payment_id) = payment_id {
        tx.record_applied_payment(payment_id, now).await?;
    }

    Ok(PurchaseOutcome {
        purchase,
        already_processed: false,
    })
}

//! Checkout: turning a purchase or a paid class into a gateway payment intent.
//!
//! Nothing is written here. The external reference carries everything the
//! confirmation protocol needs once the gateway reports the payment.

use crate::config::GatewayConfig;
use crate::metrics;
use crate::purchase::PurchaseEngine;
use std::sync::Arc;
use studio_core::error::BookingError;
use studio_core::gateway::{
    CheckoutItem, CheckoutSession, PaymentGateway, PaymentIntentRequest, ReturnUrls,
};
use studio_core::reference::PaymentReference;
use studio_core::store::BookingStore;
use studio_core::types::{Caller, PackageId, PaymentIntent};

/// Creates gateway payment intents.
pub struct Checkout<S> {
    purchases: Arc<PurchaseEngine<S>>,
    gateway: Arc<dyn PaymentGateway>,
    return_urls: ReturnUrls,
    notification_url: Option<String>,
    statement_descriptor: String,
    currency: String,
}

impl<S: BookingStore> Checkout<S> {
    /// Create a checkout over the purchase engine's eligibility rule.
    #[must_use]
    pub fn new(
        purchases: Arc<PurchaseEngine<S>>,
        gateway: Arc<dyn PaymentGateway>,
        settings: &GatewayConfig,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            purchases,
            gateway,
            return_urls: ReturnUrls {
                success: settings.success_url.clone(),
                failure: settings.failure_url.clone(),
                pending: settings.pending_url.clone(),
            },
            notification_url: settings.notification_url.clone(),
            statement_descriptor: settings.statement_descriptor.clone(),
            currency: currency.into(),
        }
    }

    /// Starts paying for a package.
    ///
    /// # Errors
    ///
    /// - [`BookingError::PackageNotFound`] for an unknown package
    /// - [`BookingError::AlreadyActivePackage`] when the caller may not buy
    ///   another package
    /// - [`BookingError::Gateway`] when the gateway refuses or is unreachable
    #[tracing::instrument(skip_all, fields(user_id = %caller.user_id, package_id = %package_id))]
    pub async fn start_package_checkout(
        &self,
        caller: &Caller,
        package_id: &PackageId,
    ) -> Result<CheckoutSession, BookingError> {
        let package = self
            .purchases
            .package(package_id)
            .await?
            .ok_or_else(|| BookingError::PackageNotFound(package_id.clone()))?;

        let eligibility = self.purchases.can_purchase(caller.user_id).await?;
        if !eligibility.eligible {
            if let Some(active) = eligibility.active_purchase {
                return Err(BookingError::AlreadyActivePackage(Box::new(active)));
            }
        }

        let reference = PaymentReference::Package {
            user_id: caller.user_id,
            package_id: package.id.clone(),
        };
        let item = CheckoutItem {
            id: package.id.to_string(),
            title: package.name,
            quantity: 1,
            unit_price: package.price,
            currency: self.currency.clone(),
        };
        self.create(&reference, item).await
    }

    /// Starts paying for one class.
    ///
    /// `intent` is what `create_reservation` returned for a single-class
    /// booking; the seat is taken when the payment is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Gateway`] when the gateway refuses or is
    /// unreachable.
    #[tracing::instrument(skip_all, fields(user_id = %intent.user_id, session_id = %intent.session_id))]
    pub async fn start_single_class_checkout(
        &self,
        intent: &PaymentIntent,
    ) -> Result<CheckoutSession, BookingError> {
        let reference = PaymentReference::SingleClass {
            user_id: intent.user_id,
            session_id: intent.session_id,
            single_class_price: intent.price,
            class_session_name: Some(intent.session_label.clone()),
        };
        let item = CheckoutItem {
            id: format!("class-{}", intent.session_id),
            title: intent.session_label.clone(),
            quantity: 1,
            unit_price: intent.price,
            currency: self.currency.clone(),
        };
        self.create(&reference, item).await
    }

    async fn create(
        &self,
        reference: &PaymentReference,
        item: CheckoutItem,
    ) -> Result<CheckoutSession, BookingError> {
        let external_reference = reference
            .encode()
            .map_err(|e| BookingError::Internal(e.to_string()))?;

        let request = PaymentIntentRequest {
            items: vec![item],
            return_urls: self.return_urls.clone(),
            notification_url: self.notification_url.clone(),
            external_reference,
            statement_descriptor: Some(self.statement_descriptor.clone()),
        };

        let session = self.gateway.create_payment_intent(request).await.map_err(|err| {
            tracing::error!(error = %err, "Gateway refused payment intent");
            BookingError::from(err)
        })?;

        metrics::record_checkout(reference.kind());
        tracing::info!(checkout_id = %session.id, kind = reference.kind(), "Checkout created");
        Ok(session)
    }
}

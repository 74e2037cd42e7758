//! Scriptable payment gateway.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use studio_core::gateway::{
    CheckoutSession, GatewayError, GatewayFuture, GatewayPayment, GatewayPaymentStatus,
    PaymentGateway, PaymentIntentRequest,
};
use studio_core::reference::PaymentReference;
use studio_core::types::ExternalPaymentId;

#[derive(Debug, Default)]
struct Inner {
    payments: HashMap<ExternalPaymentId, GatewayPayment>,
    intents: Vec<PaymentIntentRequest>,
    failure: Option<GatewayError>,
}

/// In-memory [`PaymentGateway`].
///
/// Payments are registered up front with [`MockPaymentGateway::approve`] and
/// friends; unknown payment ids answer with a 404 [`GatewayError::Api`].
/// Every created payment intent is kept for assertions.
///
/// # Example
///
/// ```
/// use studio_testing::MockPaymentGateway;
/// use studio_core::gateway::PaymentGateway;
/// use studio_core::reference::PaymentReference;
/// use studio_core::types::{ExternalPaymentId, PackageId, UserId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = MockPaymentGateway::new();
/// let reference = PaymentReference::Package {
///     user_id: UserId::new(),
///     package_id: PackageId::new("pkg-10"),
/// };
/// gateway.approve("pay-1", &reference);
///
/// let payment = gateway.get_payment(&ExternalPaymentId::new("pay-1")).await?;
/// assert!(payment.status.is_approved());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<Inner>>,
    lookups: Arc<AtomicUsize>,
}

impl MockPaymentGateway {
    /// Create a gateway that knows no payments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an approved payment carrying `reference`
    pub fn approve(&self, payment_id: &str, reference: &PaymentReference) {
        self.set_payment(
            payment_id,
            GatewayPaymentStatus::Approved,
            reference.encode().ok(),
        );
    }

    /// Register a rejected payment carrying `reference`
    pub fn reject(&self, payment_id: &str, reference: &PaymentReference) {
        self.set_payment(
            payment_id,
            GatewayPaymentStatus::Rejected,
            reference.encode().ok(),
        );
    }

    /// Register a payment with an arbitrary status and raw reference
    pub fn set_payment(
        &self,
        payment_id: &str,
        status: GatewayPaymentStatus,
        external_reference: Option<String>,
    ) {
        let id = ExternalPaymentId::new(payment_id);
        self.inner.lock().unwrap().payments.insert(
            id.clone(),
            GatewayPayment {
                id,
                status,
                external_reference,
            },
        );
    }

    /// Make every subsequent call fail with `error` until [`Self::recover`]
    pub fn fail_with(&self, error: GatewayError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    /// Stop failing
    pub fn recover(&self) {
        self.inner.lock().unwrap().failure = None;
    }

    /// Payment intents created so far
    #[must_use]
    pub fn created_intents(&self) -> Vec<PaymentIntentRequest> {
        self.inner.lock().unwrap().intents.clone()
    }

    /// Number of `get_payment` calls so far
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> GatewayFuture<'_, CheckoutSession> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            match inner.failure.clone() {
                Some(error) => Err(error),
                None => {
                    inner.intents.push(request);
                    let id = format!("pref-{}", inner.intents.len());
                    Ok(CheckoutSession {
                        redirect_url: format!("https://gateway.test/checkout/{id}"),
                        id,
                    })
                }
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn get_payment<'a>(&'a self, id: &'a ExternalPaymentId) -> GatewayFuture<'a, GatewayPayment> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let result = {
            let inner = self.inner.lock().unwrap();
            match inner.failure.clone() {
                Some(error) => Err(error),
                None => inner.payments.get(id).cloned().ok_or_else(|| GatewayError::Api {
                    status: 404,
                    body: format!("payment {id} not found"),
                }),
            }
        };
        Box::pin(std::future::ready(result))
    }
}

//! Application state for the booking HTTP server.

use crate::checkout::Checkout;
use crate::config::{Config, FrontendConfig};
use crate::confirmation::PaymentConfirmation;
use crate::purchase::PurchaseEngine;
use crate::reservation::ReservationEngine;
use std::sync::Arc;
use studio_core::environment::Clock;
use studio_core::gateway::PaymentGateway;
use studio_core::reconciliation::ReconciliationLog;
use studio_core::store::BookingStore;

/// Application state shared across all HTTP handlers.
///
/// Every engine works over the same store; cloning the state only clones
/// `Arc`s.
pub struct AppState<S> {
    /// Package purchases and eligibility
    pub purchases: Arc<PurchaseEngine<S>>,

    /// Bookings and cancellations
    pub reservations: Arc<ReservationEngine<S>>,

    /// Gateway payment intents
    pub checkout: Arc<Checkout<S>>,

    /// Redirect and webhook handling
    pub confirmation: Arc<PaymentConfirmation<S>>,

    /// Pages the payer lands on after checkout
    pub frontend: Arc<FrontendConfig>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            purchases: Arc::clone(&self.purchases),
            reservations: Arc::clone(&self.reservations),
            checkout: Arc::clone(&self.checkout),
            confirmation: Arc::clone(&self.confirmation),
            frontend: Arc::clone(&self.frontend),
        }
    }
}

impl<S: BookingStore> AppState<S> {
    /// Wire every engine from configuration.
    ///
    /// # Arguments
    ///
    /// - `store`: transactional storage shared by all engines
    /// - `gateway`: payment gateway client
    /// - `reconciliation`: where unapplied captured payments are recorded
    /// - `clock`: time source
    /// - `config`: loaded configuration
    #[must_use]
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        reconciliation: Arc<dyn ReconciliationLog>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let rules = config.rules.clone();

        let purchases = Arc::new(PurchaseEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            rules.purchase,
            rules.retry.clone(),
        ));
        let reservations = Arc::new(ReservationEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            rules.reservation,
            rules.retry.clone(),
        ));
        let checkout = Arc::new(Checkout::new(
            Arc::clone(&purchases),
            Arc::clone(&gateway),
            &config.gateway,
            rules.payment.currency.clone(),
        ));
        let confirmation = Arc::new(PaymentConfirmation::new(
            store,
            gateway,
            reconciliation,
            clock,
            rules,
        ));

        Self {
            purchases,
            reservations,
            checkout,
            confirmation,
            frontend: Arc::new(config.frontend.clone()),
        }
    }
}

//! Shared harness for the booking integration tests.
//!
//! Everything runs against the in-memory store, the scripted gateway and a
//! clock frozen at `fixtures::t0()`.

#![allow(dead_code)] // Not every test file uses every helper
#![allow(clippy::expect_used)]

use chrono::Duration;
use std::sync::Arc;
use studio_booking::confirmation::{RedirectReturn, WebhookData, WebhookNotification};
use studio_booking::{
    AppState, BusinessRules, Checkout, Config, PaymentConfirmation, PurchaseEngine,
    ReservationEngine,
};
use studio_core::environment::Clock;
use studio_core::gateway::PaymentGateway;
use studio_core::reconciliation::ReconciliationLog;
use studio_core::reference::PaymentReference;
use studio_core::types::{ClassSession, Package, Purchase, UserId};
use studio_runtime::RetryPolicy;
use studio_testing::{
    InMemoryBookingStore, MockPaymentGateway, RecordingReconciliation, fixtures, test_clock,
};

pub type Store = InMemoryBookingStore;

pub struct Harness {
    pub store: Arc<Store>,
    pub gateway: Arc<MockPaymentGateway>,
    pub reconciliation: Arc<RecordingReconciliation>,
    pub state: AppState<Store>,
    pub config: Config,
    pub package: Package,
}

impl Harness {
    pub fn purchases(&self) -> &PurchaseEngine<Store> {
        &self.state.purchases
    }

    pub fn reservations(&self) -> &ReservationEngine<Store> {
        &self.state.reservations
    }

    pub fn confirmation(&self) -> &PaymentConfirmation<Store> {
        &self.state.confirmation
    }

    pub fn checkout(&self) -> &Checkout<Store> {
        &self.state.checkout
    }

    /// A session a week after t0 of the default class type.
    pub async fn add_session(&self, capacity: u32) -> ClassSession {
        let session = fixtures::session(fixtures::t0() + Duration::days(7), capacity);
        self.store.put_session(session.clone()).await;
        session
    }

    /// A fresh purchase of the default package for `user`, bought yesterday.
    pub async fn add_purchase(&self, user: UserId) -> Purchase {
        let purchase = fixtures::purchase(user, &self.package, fixtures::t0() - Duration::days(1));
        self.store.put_purchase(purchase.clone()).await;
        purchase
    }
}

/// Business rules with backoff delays removed.
pub fn rules() -> BusinessRules {
    BusinessRules {
        retry: RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(std::time::Duration::ZERO)
            .max_delay(std::time::Duration::ZERO)
            .build(),
        ..BusinessRules::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(rules()).await
}

pub async fn harness_with(rules: BusinessRules) -> Harness {
    let store = Arc::new(InMemoryBookingStore::new());
    let package = fixtures::package("pkg-10", 10, 30);
    store.put_package(package.clone()).await;
    store.put_class_type(fixtures::class_type()).await;

    let gateway = Arc::new(MockPaymentGateway::new());
    let reconciliation = Arc::new(RecordingReconciliation::new());
    let clock: Arc<dyn Clock> = Arc::new(test_clock());

    let mut config = Config::from_lookup(|_| None);
    config.rules = rules;

    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
        Arc::clone(&reconciliation) as Arc<dyn ReconciliationLog>,
        clock,
        &config,
    );

    Harness {
        store,
        gateway,
        reconciliation,
        state,
        config,
        package,
    }
}

/// Webhook body for a payment event.
pub fn payment_event(payment_id: &str) -> WebhookNotification {
    WebhookNotification {
        id: Some(format!("evt-{payment_id}")),
        kind: Some("payment".to_string()),
        action: Some("payment.updated".to_string()),
        data: Some(WebhookData {
            id: Some(payment_id.to_string()),
        }),
    }
}

/// Query of an approved redirect return.
pub fn approved_return(payment_id: &str, reference: &PaymentReference) -> RedirectReturn {
    RedirectReturn {
        payment_id: Some(payment_id.to_string()),
        status: Some("approved".to_string()),
        external_reference: Some(reference.encode().expect("encodable reference")),
        ..RedirectReturn::default()
    }
}

pub fn single_class_reference(user: UserId, session: &ClassSession) -> PaymentReference {
    PaymentReference::SingleClass {
        user_id: user,
        session_id: session.id,
        single_class_price: studio_booking::config::ReservationRules::default().single_class_price,
        class_session_name: Some("Reformer".to_string()),
    }
}

pub fn package_reference(user: UserId, package: &Package) -> PaymentReference {
    PaymentReference::Package {
        user_id: user,
        package_id: package.id.clone(),
    }
}

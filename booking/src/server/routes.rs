//! Router configuration for the booking service.

use super::state::AppState;
use crate::api::{payments, purchases, reservations};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use studio_core::store::BookingStore;
use studio_web::correlation_id_layer;
use studio_web::handlers::health_check;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Identity comes from the `X-User-Id` / `X-User-Role` headers set by the
/// authenticating proxy in front of this service; the payment return and
/// webhook endpoints take none.
pub fn build_router<S: BookingStore + 'static>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        // Purchases
        .route("/purchases", post(purchases::create_purchase::<S>))
        .route("/purchases/eligibility", get(purchases::eligibility::<S>))
        .route("/purchases/active", get(purchases::active_purchase::<S>))
        .route("/purchases/:id/expire", put(purchases::expire_purchase::<S>))
        // Reservations
        .route("/reservations", post(reservations::create_reservation::<S>))
        .route("/reservations/:id", delete(reservations::cancel_reservation::<S>))
        // Checkout
        .route("/payments/checkout/package", post(payments::package_checkout::<S>))
        .route(
            "/payments/checkout/single-class",
            post(payments::single_class_checkout::<S>),
        )
        // Gateway callbacks
        .route("/payments/success", get(payments::redirect_success::<S>))
        .route("/payments/failure", get(payments::redirect_failure::<S>))
        .route("/payments/pending", get(payments::redirect_pending::<S>))
        .route("/payments/webhook", post(payments::webhook::<S>));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

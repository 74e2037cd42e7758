//! Payment endpoints.
//!
//! - `POST /api/payments/checkout/package`: start paying for a package
//! - `POST /api/payments/checkout/single-class`: start paying for one class
//! - `GET /api/payments/{success,failure,pending}`: payer returns from checkout
//! - `POST /api/payments/webhook`: gateway notifications
//!
//! # Payment Flow
//!
//! 1. **Checkout**: the client gets a redirect URL for the gateway
//! 2. **Redirect return**: the payer's browser comes back; an approved
//!    payment is applied and the browser is sent to a frontend page
//! 3. **Webhook**: the gateway reports the payment (again); applying it a
//!    second time is a no-op

use crate::config::FrontendConfig;
use crate::confirmation::{
    RedirectOutcome, RedirectReturn, WebhookAck, WebhookData, WebhookNotification,
};
use crate::metrics;
use crate::reservation::ReservationOutcome;
use crate::server::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use studio_core::gateway::CheckoutSession;
use studio_core::reconciliation::{NotificationChannel, ReconciliationReason};
use studio_core::store::BookingStore;
use studio_core::types::{PackageId, PaymentIntent, PaymentMethod, SessionId};
use studio_web::{AppError, CallerIdentity, WebResult};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to pay for a package.
#[derive(Debug, Deserialize)]
pub struct PackageCheckoutRequest {
    /// Catalog package
    pub package_id: PackageId,
}

/// Request to pay for one class.
#[derive(Debug, Deserialize)]
pub struct SingleClassCheckoutRequest {
    /// Session to book once paid
    pub session_id: SessionId,
}

/// Checkout for one class, with what will be booked.
#[derive(Debug, Serialize)]
pub struct SingleClassCheckoutResponse {
    /// Where to send the payer
    pub checkout: CheckoutSession,
    /// What the payment will book
    pub intent: PaymentIntent,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true
    pub received: bool,
    /// How the notification was handled
    pub outcome: &'static str,
}

// ============================================================================
// Checkout
// ============================================================================

/// Start paying for a package.
///
/// # Errors
///
/// 404 for unknown packages, 409 when the caller may not buy another
/// package, 502 when the gateway fails.
pub async fn package_checkout<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Json(request): Json<PackageCheckoutRequest>,
) -> WebResult<Json<CheckoutSession>> {
    let session = state
        .checkout
        .start_package_checkout(&caller, &request.package_id)
        .await?;
    Ok(Json(session))
}

/// Start paying for one class.
///
/// The booking is validated now (session exists, has seats, has not started,
/// caller not already booked); the seat is taken once the payment arrives.
///
/// # Errors
///
/// 404/409 as for `POST /api/reservations`, 502 when the gateway fails.
pub async fn single_class_checkout<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Json(request): Json<SingleClassCheckoutRequest>,
) -> WebResult<Json<SingleClassCheckoutResponse>> {
    let outcome = state
        .reservations
        .create_reservation(
            caller.user_id,
            request.session_id,
            PaymentMethod::SingleClass,
            None,
        )
        .await?;

    let ReservationOutcome::AwaitingPayment { intent } = outcome else {
        return Err(AppError::internal("Single class booking did not await payment"));
    };

    let checkout = state.checkout.start_single_class_checkout(&intent).await?;
    Ok(Json(SingleClassCheckoutResponse { checkout, intent }))
}

// ============================================================================
// Gateway callbacks
// ============================================================================

/// Payer returns after an approved (or apparently approved) payment.
///
/// Always redirects. Captured money that could not be applied because of an
/// internal failure still lands on the success page; the entry is in the
/// reconciliation log.
pub async fn redirect_success<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    query: Option<Query<RedirectReturn>>,
) -> Redirect {
    let ret = query.map(|Query(ret)| ret).unwrap_or_default();
    let outcome = state.confirmation.on_redirect_return(&ret).await;
    Redirect::to(&redirect_target(&state.frontend, &outcome))
}

/// Payer returns after a failed payment. Nothing changes.
pub async fn redirect_failure<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    query: Option<Query<RedirectReturn>>,
) -> Redirect {
    let ret = query.map(|Query(ret)| ret).unwrap_or_default();
    tracing::info!(payment_id = ?ret.payment_id(), status = ?ret.status, "Payment failed");
    metrics::record_notification(NotificationChannel::Redirect, "failure");
    Redirect::to(&state.frontend.failure_page)
}

/// Payer returns with a payment still in process. Nothing changes.
pub async fn redirect_pending<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    query: Option<Query<RedirectReturn>>,
) -> Redirect {
    let ret = query.map(|Query(ret)| ret).unwrap_or_default();
    tracing::info!(payment_id = ?ret.payment_id(), "Payment pending");
    metrics::record_notification(NotificationChannel::Redirect, "pending");
    Redirect::to(&state.frontend.pending_page)
}

/// Gateway notification. Always 200 so the gateway stops redelivering.
///
/// Accepts the JSON body of webhook notifications and falls back to the
/// query parameters of the older IPN format (`topic`/`type`, `id`/`data.id`).
pub async fn webhook<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    query: Option<Query<HashMap<String, String>>>,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    let params = query.map(|Query(params)| params).unwrap_or_default();
    let notification = notification_from(&body, &params);

    let ack = state.confirmation.on_webhook_notification(&notification).await;
    if let WebhookAck::Ignored(reason) = &ack {
        tracing::debug!(reason, "Webhook ignored");
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            received: true,
            outcome: ack.label(),
        }),
    )
}

fn notification_from(body: &[u8], params: &HashMap<String, String>) -> WebhookNotification {
    let mut notification = if body.is_empty() {
        WebhookNotification::default()
    } else {
        serde_json::from_slice(body).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Unparseable webhook body");
            WebhookNotification::default()
        })
    };

    if notification.kind.is_none() {
        notification.kind = params.get("type").or_else(|| params.get("topic")).cloned();
    }
    let has_payment_id = notification
        .data
        .as_ref()
        .is_some_and(|data| data.id.is_some());
    if !has_payment_id {
        if let Some(id) = params.get("data.id").or_else(|| params.get("id")) {
            notification.data = Some(WebhookData {
                id: Some(id.clone()),
            });
        }
    }
    notification
}

fn redirect_target(frontend: &FrontendConfig, outcome: &RedirectOutcome) -> String {
    match outcome {
        RedirectOutcome::Confirmed(_)
        | RedirectOutcome::Reconciliation(ReconciliationReason::ProcessingError) => {
            frontend.success_page.clone()
        }
        RedirectOutcome::NotApproved => frontend.failure_page.clone(),
        RedirectOutcome::Pending => frontend.pending_page.clone(),
        RedirectOutcome::Reconciliation(reason) => {
            let separator = if frontend.error_page.contains('?') { '&' } else { '?' };
            format!("{}{separator}reason={}", frontend.error_page, reason.as_str())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::confirmation::Confirmation;

    fn frontend() -> FrontendConfig {
        FrontendConfig {
            success_page: "https://studio.test/success.html".to_string(),
            failure_page: "https://studio.test/failure.html".to_string(),
            pending_page: "https://studio.test/pending.html".to_string(),
            error_page: "https://studio.test/error.html".to_string(),
        }
    }

    #[test]
    fn captured_money_never_lands_on_failure() {
        let frontend = frontend();

        assert_eq!(
            redirect_target(&frontend, &RedirectOutcome::Confirmed(Confirmation::AlreadyProcessed)),
            frontend.success_page
        );
        assert_eq!(
            redirect_target(
                &frontend,
                &RedirectOutcome::Reconciliation(ReconciliationReason::ProcessingError)
            ),
            frontend.success_page
        );
        assert_eq!(
            redirect_target(
                &frontend,
                &RedirectOutcome::Reconciliation(ReconciliationReason::SessionFull)
            ),
            "https://studio.test/error.html?reason=session_full"
        );
        assert_eq!(
            redirect_target(&frontend, &RedirectOutcome::NotApproved),
            frontend.failure_page
        );
    }

    #[test]
    fn ipn_query_parameters_fill_in_the_notification() {
        let params = HashMap::from([
            ("topic".to_string(), "payment".to_string()),
            ("id".to_string(), "555".to_string()),
        ]);

        let notification = notification_from(b"", &params);

        assert_eq!(notification.kind.as_deref(), Some("payment"));
        assert_eq!(notification.data.unwrap().id.as_deref(), Some("555"));
    }

    #[test]
    fn body_wins_over_query() {
        let params = HashMap::from([("data.id".to_string(), "1".to_string())]);
        let notification =
            notification_from(br#"{"type":"payment","data":{"id":"2"}}"#, &params);

        assert_eq!(notification.data.unwrap().id.as_deref(), Some("2"));
    }
}

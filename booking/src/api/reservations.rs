//! Reservation endpoints.
//!
//! - `POST /api/reservations`: book a session
//! - `DELETE /api/reservations/:id`: cancel a reservation

use crate::reservation::{CancelOutcome, ReservationOutcome};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use studio_core::store::BookingStore;
use studio_core::types::{PaymentMethod, PurchaseId, ReservationId, SessionId};
use studio_web::{CallerIdentity, WebResult};
use uuid::Uuid;

/// Request to book a session.
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Session to book
    pub session_id: SessionId,
    /// `package` or `single_class`
    pub payment_method: String,
    /// Purchase to take the credit from (package bookings)
    #[serde(default)]
    pub purchase_id: Option<PurchaseId>,
}

/// Book a session for the caller.
///
/// Package bookings answer 201 with the completed reservation. Single-class
/// bookings answer 200 with the payment intent to hand to checkout.
///
/// # Errors
///
/// 422 for an unknown payment method or a package booking without a
/// purchase, 404 for unknown sessions or purchases, 409 for business-rule
/// violations (full, started, duplicate, no credits, expired).
pub async fn create_reservation<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Json(request): Json<CreateReservationRequest>,
) -> WebResult<(StatusCode, Json<ReservationOutcome>)> {
    let method: PaymentMethod = request.payment_method.parse()?;

    let outcome = state
        .reservations
        .create_reservation(caller.user_id, request.session_id, method, request.purchase_id)
        .await?;

    let status = match outcome {
        ReservationOutcome::Confirmed { .. } => StatusCode::CREATED,
        ReservationOutcome::AwaitingPayment { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Cancel a reservation. Owners and admins only.
///
/// # Errors
///
/// 404 for unknown reservations, 403 for other users' reservations, 409 once
/// the session has started.
pub async fn cancel_reservation<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> WebResult<Json<CancelOutcome>> {
    let outcome = state
        .reservations
        .cancel_reservation(ReservationId::from_uuid(id), &caller)
        .await?;
    Ok(Json(outcome))
}
